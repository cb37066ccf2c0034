use std::path::PathBuf;

/// Failure to turn a selected file into a [`crate::picture::SelectedImage`].
#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("unsupported file type {}: expected .jpg, .jpeg or .png", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl ImageLoadError {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageLoadError::UnsupportedFormat(_) => "Unsupported image",
            ImageLoadError::Io { .. } => "Read error",
            ImageLoadError::Decode { .. } => "Decode error",
        }
    }
}

/// Failure while loading the vision-language model or running inference.
#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("model download failed: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("tokenizer error: {0}")]
    Tokenizer(tokenizers::Error),
    #[error("tokenizer has no {0} token")]
    MissingToken(&'static str),
    #[error("model lock poisoned by an earlier task")]
    Poisoned,
}

impl From<tokenizers::Error> for DescribeError {
    fn from(e: tokenizers::Error) -> Self {
        DescribeError::Tokenizer(e)
    }
}

impl DescribeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DescribeError::Hub(_) => "Model download error",
            DescribeError::Candle(_) | DescribeError::Poisoned => "Inference error",
            DescribeError::Tokenizer(_) | DescribeError::MissingToken(_) => "Tokenizer error",
        }
    }
}

/// Failure of the text-to-speech engine.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("no text-to-speech program found (tried {0})")]
    NoEngine(String),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("speech wait failed: {0}")]
    Wait(#[from] std::io::Error),
}

impl SpeechError {
    pub fn kind(&self) -> &'static str {
        "Speech error"
    }
}
