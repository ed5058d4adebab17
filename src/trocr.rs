use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array2, ArrayD, Axis};
use ort::{
    session::Session,
    value::{Tensor, TensorRef},
};
use parking_lot::Mutex;
use tokenizers::Tokenizer;
use tracing::instrument;

use crate::{
    util::{load_session, subtract_mean_normalize},
    Error, ExecutionProvider, Recognizer, Result,
};

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

#[derive(Debug, Clone, Copy)]
pub struct TrOcrOptions {
    pub input_size: u32,
    pub max_new_tokens: usize,
    pub decoder_start_token: u32,
    pub end_token: u32,
}

impl Default for TrOcrOptions {
    fn default() -> Self {
        Self {
            input_size: 384,
            max_new_tokens: 64,
            decoder_start_token: 2,
            end_token: 2,
        }
    }
}

/// TrOCR text line recognizer, split into an encoder and a decoder session.
pub struct TrOcrNet {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    options: TrOcrOptions,
}

impl TrOcrNet {
    #[instrument(level = "debug", skip(execution_providers))]
    pub fn init(
        encoder_path: &Path,
        decoder_path: &Path,
        tokenizer_path: &Path,
        num_threads: usize,
        options: TrOcrOptions,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<&Path>,
    ) -> Result<Self> {
        let encoder = load_session(encoder_path, num_threads, execution_providers, cache_path)?;
        let decoder = load_session(decoder_path, num_threads, execution_providers, cache_path)?;
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| Error::Tokenizer {
            path: tokenizer_path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::debug!(
            "Tokenizer vocabulary size: {}",
            tokenizer.get_vocab_size(true)
        );

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            options,
        })
    }

    #[instrument(level = "trace", skip(self, image))]
    pub fn get_text_line(&self, image: &RgbImage) -> Result<String> {
        let size = self.options.input_size;
        let image = image::imageops::resize(image, size, size, FilterType::Triangle);
        let pixel_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));

        let hidden_states = self.encode(pixel_values.view().into_dyn())?;
        let tokens = self.generate(&hidden_states)?;
        log::trace!("Generated {} tokens", tokens.len());

        self.tokenizer
            .decode(&tokens, true)
            .map_err(|e| Error::TokenDecode(e.to_string()))
    }

    fn encode(&self, pixel_values: ndarray::ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let mut encoder = self.encoder.lock();
        let outputs = encoder.run(ort::inputs![
            "pixel_values" => TensorRef::from_array_view(pixel_values)?
        ])?;
        let hidden_states = outputs[0].try_extract_array::<f32>()?.to_owned();
        Ok(hidden_states)
    }

    /// Greedy decoding from the start token until the end token or the cap.
    fn generate(&self, hidden_states: &ArrayD<f32>) -> Result<Vec<u32>> {
        let mut decoder = self.decoder.lock();
        let mut ids = vec![self.options.decoder_start_token as i64];

        for _ in 0..self.options.max_new_tokens {
            let input_ids = Array2::from_shape_vec((1, ids.len()), ids.clone())
                .map_err(|e| Error::ModelOutput(e.to_string()))?;
            let outputs = decoder.run(ort::inputs![
                "input_ids" => Tensor::from_array(input_ids)?,
                "encoder_hidden_states" => TensorRef::from_array_view(hidden_states.view())?
            ])?;
            let logits = outputs[0].try_extract_array::<f32>()?;
            let shape = logits.shape().to_vec();
            if shape.len() != 3 || shape[1] == 0 {
                return Err(Error::ModelOutput(format!(
                    "expected decoder logits of shape [1, tokens, vocab], got {shape:?}"
                )));
            }
            let last = logits
                .index_axis(Axis(0), 0)
                .index_axis(Axis(0), shape[1] - 1)
                .to_owned();
            let next = argmax(last.iter().copied())
                .ok_or_else(|| Error::ModelOutput("decoder returned empty logits".into()))?;

            if next as u32 == self.options.end_token {
                break;
            }
            ids.push(next as i64);
        }

        Ok(ids.into_iter().skip(1).map(|id| id as u32).collect())
    }
}

impl Recognizer for TrOcrNet {
    fn recognize(&self, crop: &RgbImage) -> Result<String> {
        self.get_text_line(crop)
    }
}

fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    values
        .enumerate()
        .max_by_key(|(_, value)| FloatOrd(*value))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_highest_logit() {
        assert_eq!(argmax([0.1, 3.0, -2.0, 2.9].into_iter()), Some(1));
        assert_eq!(argmax(std::iter::empty()), None);
    }

    #[test]
    fn defaults_match_trocr_generation_config() {
        let options = TrOcrOptions::default();
        assert_eq!(options.input_size, 384);
        assert_eq!(options.decoder_start_token, options.end_token);
    }
}
