//! Embedder (C6): text to fixed-dimension vectors, offline-first.
//!
//! Grounded on the reference server's declared `server/Cargo.toml` semantic
//! stack (`fastembed` + `ort`), not on `semantic.rs`'s candle-based source,
//! which the repo's own manifest no longer lists as a dependency — see
//! DESIGN.md for that drift note. The batching/model-resolution shape
//! (named presets, explicit dimension, offline-then-network load order) is
//! carried over from `semantic.rs::resolve_model`/`load_model`.

use crate::error::{Error, Result};

#[cfg(feature = "semantic")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub tag: &'static str,
    pub dim: usize,
}

pub fn resolve_model(tag: &str) -> ModelConfig {
    match tag {
        "fast" => ModelConfig { tag: "fast", dim: 384 },
        "balanced" => ModelConfig { tag: "balanced", dim: 768 },
        "accurate" => ModelConfig { tag: "accurate", dim: 768 },
        "multilingual" => ModelConfig { tag: "multilingual", dim: 768 },
        _ => ModelConfig { tag: "fast", dim: 384 },
    }
}

#[cfg(feature = "semantic")]
fn fastembed_model(tag: &str) -> EmbeddingModel {
    match tag {
        "balanced" => EmbeddingModel::BGEBaseENV15,
        "accurate" => EmbeddingModel::BGELargeENV15,
        "multilingual" => EmbeddingModel::MultilingualE5Base,
        _ => EmbeddingModel::AllMiniLML6V2,
    }
}

pub struct Embedder {
    config: ModelConfig,
    #[cfg(feature = "semantic")]
    model: TextEmbedding,
}

impl Embedder {
    /// Attempts an offline load from the fastembed/hf cache directory first;
    /// if that fails and `network_enabled`, lets fastembed fetch the model.
    /// Any failure yields `ModelUnavailable` — semantic search is then
    /// reported unavailable while regex search remains usable (§4.6).
    #[cfg(feature = "semantic")]
    pub fn load(tag: &str, cache_dir: &std::path::Path, network_enabled: bool) -> Result<Self> {
        let config = resolve_model(tag);
        let model_name = fastembed_model(tag);
        let init = InitOptions::new(model_name)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);

        if !network_enabled && !cache_dir.join("model.onnx").exists() {
            return Err(Error::ModelUnavailable(format!(
                "{tag}: no cached model at {} and network access is disabled",
                cache_dir.display()
            )));
        }

        let model = TextEmbedding::try_new(init)
            .map_err(|e| Error::ModelUnavailable(format!("{tag}: {e}")))?;
        Ok(Self { config, model })
    }

    #[cfg(not(feature = "semantic"))]
    pub fn load(_tag: &str, _cache_dir: &std::path::Path, _network_enabled: bool) -> Result<Self> {
        Err(Error::ModelUnavailable("crate built without the `semantic` feature".into()))
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Order-preserving batch embed, L2-normalized so downstream dot products
    /// equal cosine similarity (matches `semantic.rs::encode_batch`'s final
    /// normalization step).
    #[cfg(feature = "semantic")]
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::ModelUnavailable(e.to_string()))?;
        Ok(embeddings.into_iter().map(normalize).collect())
    }

    #[cfg(not(feature = "semantic"))]
    pub fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::ModelUnavailable("crate built without the `semantic` feature".into()))
    }
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}
