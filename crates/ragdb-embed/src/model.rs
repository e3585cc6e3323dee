use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use ragdb_core::config::{expand_path, EmbedderConfig};
use ragdb_core::error::Error;
use ragdb_core::traits::EmbeddingProvider;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

/// BGE-M3 sentence embeddings from local XLM-RoBERTa weights.
///
/// The model directory must hold `tokenizer.json`, `config.json` and
/// `pytorch_model.bin`.
pub struct BgeM3Embedder {
    runtime: Arc<ModelRuntime>,
    id: String,
}

struct ModelRuntime {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BgeM3Embedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(config.model_dir.as_deref())?;
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let model_config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))?;
        let dim = usize::try_from(dim)?;

        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&model_config, vb)?;
        tracing::info!(dim, "BGE-M3 model loaded");

        let runtime = ModelRuntime { model, tokenizer, device, dim, max_len: config.max_len };
        Ok(Self { runtime: Arc::new(runtime), id: format!("bge-m3:d{dim}") })
    }

    /// Blocking forward pass; async callers go through `embed`, which moves
    /// this onto tokio's blocking pool.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        self.runtime.embed(text)
    }
}

impl ModelRuntime {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim {
            return Err(anyhow!("model produced {} values, expected {}", emb.len(), self.dim));
        }
        if start.elapsed().as_millis() > 100 {
            tracing::debug!(elapsed_ms = start.elapsed().as_millis(), "slow embedding");
        }
        Ok(emb)
    }
}

#[async_trait]
impl EmbeddingProvider for BgeM3Embedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.runtime.dim
    }

    async fn embed(&self, text: &str) -> ragdb_core::Result<Vec<f32>> {
        let runtime = Arc::clone(&self.runtime);
        let text = text.to_owned();
        off_executor(move || runtime.embed(&text)).await
    }
}

/// Run CPU-bound work on tokio's blocking pool so inference never stalls
/// the async workers. Task panics and work errors both surface as
/// `Error::Provider`.
pub(crate) async fn off_executor<T, F>(work: F) -> ragdb_core::Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::provider(format!("embedding task failed: {e}")))?
        .map_err(|e| Error::provider(format!("{e:#}")))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() {
            return Ok(p);
        }
        return Err(anyhow!("configured model_dir {} does not exist", p.display()));
    }
    for var in ["RAGDB_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(dir);
            if p.exists() {
                return Ok(p);
            }
        }
    }
    let local = Path::new("models/bge-m3");
    if local.exists() {
        return Ok(local.to_path_buf());
    }
    Err(anyhow!("Could not locate BGE-M3 model directory (set embedder.model_dir or RAGDB_MODEL_DIR)"))
}
