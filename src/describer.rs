use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::moondream;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::imageops::FilterType;
use image::RgbImage;
use tokenizers::Tokenizer;

use crate::config::ModelConfig;
use crate::error::DescribeError;

/// Side length of the square image moondream's vision encoder expects.
const INPUT_SIZE: u32 = 378;
const END_OF_TEXT: &str = "<|endoftext|>";
/// Marker moondream emits when it considers the answer complete.
const END_MARKER: &str = "<END>";
const SEED: u64 = 299792458;

/// A vision-language model that can answer questions about an image.
pub trait VisionLanguageModel {
    type Embedding;

    /// Encode `image` into the model's embedding space.
    fn encode_image(&self, image: &RgbImage) -> Result<Self::Embedding, DescribeError>;

    /// Generate an answer to `question`, handing each decoded text fragment
    /// to `streamer` as soon as it is available. The fragments, concatenated,
    /// are the whole answer.
    fn answer_question(
        &mut self,
        embedding: &Self::Embedding,
        question: &str,
        streamer: &mut dyn FnMut(&str),
    ) -> Result<(), DescribeError>;
}

/// Describe `image` by asking `question`. Blocking and CPU-heavy: call from
/// `spawn_blocking`.
pub fn describe_image<M: VisionLanguageModel>(
    model: &mut M,
    image: &RgbImage,
    question: &str,
) -> Result<String, DescribeError> {
    let embedding = model.encode_image(image)?;

    let mut answer = String::new();
    model.answer_question(&embedding, question, &mut |fragment| {
        log::debug!("token: {fragment:?}");
        answer.push_str(fragment);
    })?;

    Ok(clean_answer(&answer))
}

/// Strip the trailing end-of-answer sentinels and surrounding whitespace.
pub fn clean_answer(raw: &str) -> String {
    let mut text = raw.trim_end();
    for sentinel in [END_MARKER, "END", "<"] {
        if let Some(stripped) = text.strip_suffix(sentinel) {
            text = stripped.trim_end();
        }
    }
    text.trim().to_string()
}

/// Moondream running on candle, with weights fetched from the Hugging Face hub.
pub struct Moondream {
    model: moondream::Model,
    tokenizer: Tokenizer,
    device: Device,
    eos_token: u32,
    end_marker: Vec<u32>,
    max_new_tokens: usize,
}

impl Moondream {
    /// Download (or reuse the cached) weights and build the model. Slow; call
    /// from a blocking context.
    pub fn load(config: &ModelConfig) -> Result<Self, DescribeError> {
        log::info!("Fetching {}@{}", config.model_id, config.revision);
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            config.model_id.clone(),
            RepoType::Model,
            config.revision.clone(),
        ));
        let weights = repo.get("model.safetensors")?;
        let tokenizer = Tokenizer::from_file(repo.get("tokenizer.json")?)?;

        let device = Device::Cpu;
        // SAFETY: the safetensors file is owned by the hub cache and not
        // modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = moondream::Model::new(&moondream::Config::v2(), vb)?;

        let eos_token = tokenizer
            .token_to_id(END_OF_TEXT)
            .ok_or(DescribeError::MissingToken(END_OF_TEXT))?;
        let end_marker = tokenizer.encode(END_MARKER, false)?.get_ids().to_vec();

        log::info!("Moondream loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token,
            end_marker,
            max_new_tokens: config.max_new_tokens,
        })
    }

    /// Resize to the encoder's input size and normalize to [-1, 1], CHW.
    fn image_tensor(&self, image: &RgbImage) -> Result<Tensor, DescribeError> {
        let side = INPUT_SIZE as usize;
        let resized = image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let data = Tensor::from_vec(resized.into_raw(), (side, side, 3), &self.device)?
            .permute((2, 0, 1))?;
        let mean = Tensor::new(&[0.5f32, 0.5, 0.5], &self.device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&[0.5f32, 0.5, 0.5], &self.device)?.reshape((3, 1, 1))?;
        let tensor = (data.to_dtype(DType::F32)? / 255.)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;
        Ok(tensor)
    }
}

impl VisionLanguageModel for Moondream {
    type Embedding = Tensor;

    fn encode_image(&self, image: &RgbImage) -> Result<Tensor, DescribeError> {
        let input = self.image_tensor(image)?.unsqueeze(0)?;
        Ok(self.model.vision_encoder().forward(&input)?)
    }

    fn answer_question(
        &mut self,
        embedding: &Tensor,
        question: &str,
        streamer: &mut dyn FnMut(&str),
    ) -> Result<(), DescribeError> {
        self.model.text_model.clear_kv_cache();

        let prompt = format!("\n\nQuestion: {question}\n\nAnswer:");
        let mut tokens = self.tokenizer.encode(prompt, true)?.get_ids().to_vec();
        let prompt_len = tokens.len();
        let bos = Tensor::new(&[self.eos_token], &self.device)?.unsqueeze(0)?;
        let mut logits_processor = LogitsProcessor::from_sampling(SEED, Sampling::ArgMax);
        let mut stream = TokenStream::new(&self.tokenizer);

        for index in 0..self.max_new_tokens {
            let context = if index > 0 {
                &tokens[tokens.len() - 1..]
            } else {
                &tokens[..]
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = if index > 0 {
                self.model.text_model.forward(&input)?
            } else {
                self.model.text_model.forward_with_img(&bos, &input, embedding)?
            };
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let next = logits_processor.sample(&logits)?;
            tokens.push(next);

            if next == self.eos_token || tokens[prompt_len..].ends_with(&self.end_marker) {
                break;
            }
            if let Some(text) = stream.next_token(next)? {
                streamer(&text);
            }
        }
        if let Some(rest) = stream.decode_rest()? {
            streamer(&rest);
        }

        log::info!("Generated {} tokens", tokens.len() - prompt_len);
        Ok(())
    }
}

/// Incremental detokenizer: turns generated token ids into text fragments,
/// holding back tokens that only decode to part of a character.
struct TokenStream<'a> {
    tokenizer: &'a Tokenizer,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl<'a> TokenStream<'a> {
    fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, DescribeError> {
        Ok(self.tokenizer.decode(tokens, true)?)
    }

    fn next_token(&mut self, token: u32) -> Result<Option<String>, DescribeError> {
        let prev_text = self.decode(&self.tokens[self.prev_index..self.current_index])?;
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() && !text.ends_with('\u{FFFD}') {
            let fragment = text[prev_text.len()..].to_string();
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(fragment))
        } else {
            Ok(None)
        }
    }

    fn decode_rest(&self) -> Result<Option<String>, DescribeError> {
        let prev_text = self.decode(&self.tokens[self.prev_index..self.current_index])?;
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() {
            Ok(Some(text[prev_text.len()..].to_string()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Replays a canned token stream and records what it was asked.
    pub(crate) struct ScriptedModel {
        pub fragments: Vec<&'static str>,
        pub questions: Vec<String>,
        pub encoded_sizes: Vec<(u32, u32)>,
        pub fail_encode: bool,
    }

    impl ScriptedModel {
        pub(crate) fn new(fragments: Vec<&'static str>) -> Self {
            Self {
                fragments,
                questions: Vec::new(),
                encoded_sizes: Vec::new(),
                fail_encode: false,
            }
        }
    }

    impl VisionLanguageModel for ScriptedModel {
        type Embedding = (u32, u32);

        fn encode_image(&self, image: &RgbImage) -> Result<(u32, u32), DescribeError> {
            if self.fail_encode {
                return Err(DescribeError::MissingToken(END_OF_TEXT));
            }
            Ok(image.dimensions())
        }

        fn answer_question(
            &mut self,
            embedding: &(u32, u32),
            question: &str,
            streamer: &mut dyn FnMut(&str),
        ) -> Result<(), DescribeError> {
            self.encoded_sizes.push(*embedding);
            self.questions.push(question.to_string());
            for fragment in &self.fragments {
                streamer(fragment);
            }
            Ok(())
        }
    }

    #[test]
    fn assembles_streamed_fragments_into_one_answer() {
        let mut model = ScriptedModel::new(vec!["A cat ", "sitting on ", "a windowsill.", "<", "END"]);
        let image = RgbImage::new(512, 384);

        let text = describe_image(&mut model, &image, "describe this image in detail").unwrap();

        assert_eq!(text, "A cat sitting on a windowsill.");
        assert_eq!(model.questions, vec!["describe this image in detail"]);
        assert_eq!(model.encoded_sizes, vec![(512, 384)]);
    }

    #[test]
    fn encode_failure_propagates() {
        let mut model = ScriptedModel::new(vec!["unused"]);
        model.fail_encode = true;

        let err = describe_image(&mut model, &RgbImage::new(4, 4), "q").unwrap_err();
        assert_eq!(err.kind(), "Tokenizer error");
        assert!(model.questions.is_empty());
    }

    #[test]
    fn strips_trailing_sentinels() {
        assert_eq!(clean_answer("  A dog.<END>"), "A dog.");
        assert_eq!(clean_answer("A dog. <END"), "A dog.");
        assert_eq!(clean_answer("A dog.<"), "A dog.");
        assert_eq!(clean_answer("A dog.\n"), "A dog.");
        assert_eq!(clean_answer("A <b> dog"), "A <b> dog");
        assert_eq!(clean_answer(""), "");
    }
}
