use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use candle_core::{Device, Tensor, D};
use candle_transformers::models::blip::VisionConfig;
use candle_transformers::models::{blip, blip_text, quantized_blip};
use tokenizers::Tokenizer;

/// Returned whenever decoding produces an empty or whitespace-only string.
pub const EMPTY_CAPTION: &str = "No caption generated";

/// Decoding constants. Fixed configuration, not request-tunable.
const NUM_BEAMS: usize = 4;
const MAX_CAPTION_TOKENS: usize = 16;

/// BLIP decoder start token ([DEC]) and separator/end token ([SEP]).
const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;

const IMAGE_SIZE: u32 = 384;

#[derive(Debug, Clone)]
pub struct CaptionConfig {
    /// Quantized BLIP weights (GGUF).
    pub model_path: PathBuf,
    /// HuggingFace tokenizer.json for the text decoder.
    pub tokenizer_path: PathBuf,
}

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: 384,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

/// The captioning model and its auxiliary artifacts. Loaded once, then
/// shared by all requests. The text decoder keeps a kv cache, so decoding
/// needs exclusive access; the mutex serializes generation only, not the
/// surrounding image work.
pub struct CaptionModel {
    tokenizer: Tokenizer,
    model: std::sync::Mutex<quantized_blip::BlipForConditionalGeneration>,
    device: Device,
}

impl CaptionModel {
    pub fn load(config: &CaptionConfig) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;

        // CPU for portability.
        let device = Device::Cpu;

        let vb = quantized_blip::VarBuilder::from_gguf(&config.model_path, &device)
            .with_context(|| format!("failed to read {}", config.model_path.display()))?;
        let model = quantized_blip::BlipForConditionalGeneration::new(&blip_base_config(), vb)?;

        Ok(Self {
            tokenizer,
            model: std::sync::Mutex::new(model),
            device,
        })
    }

    /// Produce a caption for the image at `path`.
    ///
    /// Any decodable image format is accepted and normalized to RGB. Errors
    /// from decoding, tensor extraction, or generation propagate to the
    /// caller as pipeline failures.
    pub fn caption(&self, path: impl AsRef<Path>) -> anyhow::Result<String> {
        let image = self.load_image(path.as_ref())?.to_device(&self.device)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("caption model lock poisoned"))?;

        let image_embeds = image.unsqueeze(0)?.apply(model.vision_model())?;
        let token_ids = self.beam_search(&mut model, &image_embeds)?;

        let raw = self
            .tokenizer
            .decode(&token_ids, true)
            .map_err(|e| anyhow!("failed to decode caption tokens: {e}"))?;

        Ok(finalize_caption(&raw))
    }

    /// Bounded-width beam search over the text decoder.
    ///
    /// The decoder kv cache cannot be shared between hypotheses, so each
    /// step re-runs the full prefix with a fresh cache. Sequences are at
    /// most MAX_CAPTION_TOKENS long, which keeps that affordable.
    fn beam_search(
        &self,
        model: &mut quantized_blip::BlipForConditionalGeneration,
        image_embeds: &Tensor,
    ) -> anyhow::Result<Vec<u32>> {
        struct Beam {
            tokens: Vec<u32>,
            score: f32,
            finished: bool,
        }

        let mut beams = vec![Beam {
            tokens: vec![BOS_TOKEN_ID],
            score: 0.0,
            finished: false,
        }];

        for _ in 0..MAX_CAPTION_TOKENS {
            if beams.iter().all(|b| b.finished) {
                break;
            }

            let mut candidates: Vec<Beam> = Vec::with_capacity(beams.len() * NUM_BEAMS);
            for beam in &beams {
                if beam.finished {
                    candidates.push(Beam {
                        tokens: beam.tokens.clone(),
                        score: beam.score,
                        finished: true,
                    });
                    continue;
                }

                model.text_decoder().reset_kv_cache();
                let input_ids =
                    Tensor::new(beam.tokens.as_slice(), &self.device)?.unsqueeze(0)?;
                let logits = model.text_decoder().forward(&input_ids, image_embeds)?;
                let logits = logits.squeeze(0)?;
                let last = logits.get(logits.dim(0)? - 1)?;
                let log_probs = candle_nn::ops::log_softmax(&last, D::Minus1)?.to_vec1::<f32>()?;

                for (token, log_prob) in top_k(&log_probs, NUM_BEAMS) {
                    let mut tokens = beam.tokens.clone();
                    let finished = token == SEP_TOKEN_ID;
                    if !finished {
                        tokens.push(token);
                    }
                    candidates.push(Beam {
                        tokens,
                        score: beam.score + log_prob,
                        finished,
                    });
                }
            }

            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
            candidates.truncate(NUM_BEAMS);
            beams = candidates;
        }

        let best = beams
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or_else(|| anyhow!("beam search produced no hypotheses"))?;
        Ok(best.tokens)
    }

    /// Decode, resize and normalize an image to the fixed tensor shape the
    /// vision encoder expects.
    fn load_image(&self, path: &Path) -> anyhow::Result<Tensor> {
        let img = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .resize_to_fill(IMAGE_SIZE, IMAGE_SIZE, image::imageops::FilterType::Triangle);
        let data = img.to_rgb8().into_raw();

        let data = Tensor::from_vec(
            data,
            (IMAGE_SIZE as usize, IMAGE_SIZE as usize, 3),
            &Device::Cpu,
        )?
        .permute((2, 0, 1))?;
        let mean = Tensor::new(&[0.48145466f32, 0.4578275, 0.40821073], &Device::Cpu)?
            .reshape((3, 1, 1))?;
        let std = Tensor::new(&[0.26862954f32, 0.261_302_6, 0.275_777_1], &Device::Cpu)?
            .reshape((3, 1, 1))?;
        let normalized = (data.to_dtype(candle_core::DType::F32)? / 255.)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;
        Ok(normalized)
    }
}

/// Substitute the fixed placeholder for empty or whitespace-only output.
fn finalize_caption(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        EMPTY_CAPTION.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Indices and values of the `k` largest entries, best first.
fn top_k(log_probs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = log_probs
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as u32, v))
        .collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_becomes_placeholder() {
        assert_eq!(finalize_caption(""), EMPTY_CAPTION);
        assert_eq!(finalize_caption("   \n\t "), EMPTY_CAPTION);
    }

    #[test]
    fn non_empty_output_is_trimmed_and_kept() {
        assert_eq!(finalize_caption(" a dog on a couch "), "a dog on a couch");
    }

    #[test]
    fn top_k_orders_best_first() {
        let scores = [0.1f32, -2.0, 3.5, 0.0, 3.4];
        let top = top_k(&scores, 3);
        assert_eq!(top[0].0, 2);
        assert_eq!(top[1].0, 4);
        assert_eq!(top[2].0, 0);
    }

    #[test]
    fn top_k_handles_short_input() {
        let scores = [1.0f32, 2.0];
        assert_eq!(top_k(&scores, 4).len(), 2);
    }
}
