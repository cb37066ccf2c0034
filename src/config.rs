use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Vision-language model settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hugging Face repository holding the moondream weights and tokenizer.
    pub model_id: String,
    /// Pinned revision of `model_id`.
    pub revision: String,
    /// Question asked about every uploaded image.
    pub question: String,
    /// Upper bound on generated tokens per description.
    pub max_new_tokens: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: "vikhyatk/moondream2".into(),
            revision: "30c7cdf3fa6914f50bee192983b5e9ea38ad8e85".into(),
            question: "describe this image in detail".into(),
            max_new_tokens: 512,
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Command line to run instead of the platform default (`say`,
    /// `espeak-ng`, ...). The text is fed on its stdin.
    pub command: Option<String>,
    /// Speaking rate in words per minute.
    pub rate: Option<u32>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub speech: SpeechConfig,
    /// Longest side of the displayed thumbnail, in pixels.
    pub thumbnail_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            speech: SpeechConfig::default(),
            thumbnail_size: 400,
        }
    }
}

impl Config {
    /// Directory: ~/.config/pixel-to-prose/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("pixel-to-prose");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    pub fn load() -> Self {
        let path = Self::path();
        match fs::read_to_string(&path) {
            Ok(data) => Self::from_json(&data),
            Err(_) => Self::default(),
        }
    }

    fn from_json(data: &str) -> Self {
        match serde_json::from_str(data) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring invalid config: {e}");
                Self::default()
            }
        }
    }
}
