// Encoder/decoder text recognizer for cropped Japanese text regions
// Greedy autoregressive decoding over a WordPiece vocabulary

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::core::config::Config;
use crate::core::errors::{OcrError, OcrResult};
use crate::services::ocr::tokenizer::{Tokenizer, EOS_TOKEN_ID, START_TOKEN_ID};
use crate::services::onnx_builder::build_session;

/// Square encoder input side
pub const IMAGE_SIZE: u32 = 224;
/// Upper bound on decoding steps
pub const MAX_LENGTH: usize = 300;

/// Grayscale (BT.601) replicated over 3 planes, resized to 224², scaled to [-1, 1]
pub fn preprocess(img: &DynamicImage) -> Array4<f32> {
    let resized = img
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom)
        .to_rgb8();

    let side = IMAGE_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
        let gray = 0.299 * r + 0.587 * g + 0.114 * b;
        let normalized = gray / 127.5 - 1.0;
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = normalized;
        tensor[[0, 1, y, x]] = normalized;
        tensor[[0, 2, y, x]] = normalized;
    }
    tensor
}

/// Arg-max over one position's logits and the log softmax probability of the pick
pub fn greedy_step(logits: &[f32]) -> (usize, f32) {
    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &val) in logits.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best_idx = i;
        }
    }

    let sum_exp: f32 = logits.iter().map(|&v| (v - best_val).exp()).sum();
    (best_idx, -sum_exp.ln())
}

/// Geometric mean of per-step probabilities; 0 when no step ran
pub fn sequence_confidence(total_log_prob: f32, steps: usize) -> f32 {
    if steps == 0 {
        0.0
    } else {
        (total_log_prob / steps as f32).exp()
    }
}

pub struct TextRecognizer {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl TextRecognizer {
    pub fn new(config: &Config) -> OcrResult<Self> {
        let tokenizer = Tokenizer::from_file(&config.vocab_path())?;
        let (encoder_device, encoder) = build_session(&config.encoder_model_path(), &config.models)?;
        let (decoder_device, decoder) = build_session(&config.decoder_model_path(), &config.models)?;

        info!(
            "✓ Text recognizer ready: encoder on {}, decoder on {}, vocab_size={}",
            encoder_device,
            decoder_device,
            tokenizer.len()
        );

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
        })
    }

    /// Recognize a cropped region, returning (text, confidence)
    pub fn recognize(&self, img: &DynamicImage) -> OcrResult<(String, f32)> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(OcrError::InvalidImage(format!("empty crop {}x{}", w, h)));
        }

        let start = Instant::now();
        let side = IMAGE_SIZE as usize;
        let (pixels, _offset) = preprocess(img).into_raw_vec_and_offset();
        let pixel_values = Value::from_array(([1usize, 3, side, side], pixels))?;

        let (hidden_shape, hidden_states) = {
            let mut encoder = self.encoder.lock();
            let outputs = encoder.run(ort::inputs!["pixel_values" => pixel_values])?;
            let hidden = outputs
                .get("last_hidden_state")
                .ok_or_else(|| OcrError::InferenceError("encoder returned no output".into()))?;
            let (shape, data) = hidden.try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            let dims: [usize; 3] = dims.try_into().map_err(|d| {
                OcrError::InferenceError(format!("unexpected encoder output shape {:?}", d))
            })?;
            (dims, data.to_vec())
        };

        // Shared by every decoding step, passed by reference below
        let encoder_states = Value::from_array((hidden_shape, hidden_states))?;

        let mut token_ids: Vec<usize> = vec![START_TOKEN_ID];
        let mut total_log_prob = 0.0f32;
        let mut steps = 0usize;

        for _ in 0..MAX_LENGTH {
            let ids: Vec<i64> = token_ids.iter().map(|&id| id as i64).collect();
            let input_ids = Value::from_array(([1usize, ids.len()], ids))?;

            let (next_token, log_prob) = {
                let mut decoder = self.decoder.lock();
                let outputs = decoder.run(ort::inputs![
                    "input_ids" => input_ids,
                    "encoder_hidden_states" => &encoder_states
                ])?;
                let logits = outputs
                    .get("logits")
                    .ok_or_else(|| OcrError::InferenceError("decoder returned no logits".into()))?;
                let (shape, data) = logits.try_extract_tensor::<f32>()?;

                let vocab_size = shape
                    .last()
                    .map(|&v| v as usize)
                    .filter(|&v| v > 0)
                    .ok_or_else(|| {
                        OcrError::InferenceError(format!("malformed logits shape {:?}", shape))
                    })?;
                let offset = (token_ids.len() - 1) * vocab_size;
                let last = data.get(offset..offset + vocab_size).ok_or_else(|| {
                    OcrError::InferenceError(format!(
                        "logits too short for sequence length {}",
                        token_ids.len()
                    ))
                })?;
                greedy_step(last)
            };

            total_log_prob += log_prob;
            steps += 1;

            if next_token == EOS_TOKEN_ID {
                break;
            }
            token_ids.push(next_token);
        }

        let text = self.tokenizer.decode(&token_ids);
        let confidence = sequence_confidence(total_log_prob, steps);

        trace!("Decoded token ids: {:?}", token_ids);
        debug!(
            "Recognized '{}' (confidence: {:.2}, {} steps) in {:.2}ms",
            text,
            confidence,
            steps,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok((text, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greedy_step_picks_argmax() {
        let (idx, log_prob) = greedy_step(&[0.1, 2.0, -1.0, 2.0]);
        // ties keep the first maximum
        assert_eq!(idx, 1);
        assert!(log_prob < 0.0);
    }

    #[test]
    fn test_greedy_step_uniform_logits() {
        let (_, log_prob) = greedy_step(&[1.0; 4]);
        assert!((log_prob.exp() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_sequence_confidence() {
        assert_eq!(sequence_confidence(0.0, 0), 0.0);
        let c = sequence_confidence(0.5f32.ln() + 0.125f32.ln(), 2);
        assert!((c - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_preprocess_grayscale_range() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(50, 20, |x, _| {
            if x < 25 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        }));
        let tensor = preprocess(&img);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert!((tensor[[0, 0, 100, 5]] - 1.0).abs() < 1e-3);
        assert!((tensor[[0, 2, 100, 220]] + 1.0).abs() < 1e-3);
        assert_eq!(tensor[[0, 0, 7, 7]], tensor[[0, 1, 7, 7]]);
    }
}
