//! Configuration loader, typed engine settings and path helpers.
//!
//! Uses Figment to merge `ragdb.toml` + `ragdb.<env>.toml` + `RAGDB_*` env
//! vars (`__` separates nested keys, e.g. `RAGDB_RETRIEVAL__ALPHA=0.7`).
//! Every section has defaults, so an empty environment yields a usable
//! configuration. Values are validated where they are consumed.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::Metric;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RAGDB_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("ragdb.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("ragdb.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("ragdb.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("ragdb.test.toml")),
            other => tracing::warn!(env = other, "unknown RAGDB_ENV, loading base config only"),
        }
        figment = figment.merge(Env::prefixed("RAGDB_").split("__"));
        Ok(Self { figment })
    }

    /// Build from an inline TOML document; used by tests and embedders of the engine.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::invalid_config(format!("Failed to get '{key}': {e}")))
    }

    /// Extract and validate the full engine configuration.
    pub fn rag(&self) -> Result<RagConfig> {
        let config: RagConfig = self
            .figment
            .extract()
            .map_err(|e| Error::invalid_config(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub bm25: Bm25Config,
    pub vector: VectorConfig,
    pub embedder: EmbedderConfig,
}

impl RagConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.bm25.validate()?;
        self.embedder.validate()?;
        Ok(())
    }
}

/// Query-time knobs. Callers may override them per request; the
/// coordinator validates whatever it is handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// 1.0 = pure vector, 0.0 = pure lexical.
    pub alpha: f32,
    /// Floor on the fused score; results below it are dropped.
    pub similarity_threshold: f32,
    /// Each sub-index is asked for `top_k * candidate_multiplier` hits.
    pub candidate_multiplier: usize,
    pub query_timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4, alpha: 0.5, similarity_threshold: 0.0, candidate_multiplier: 3, query_timeout_ms: None }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::invalid_config("top_k must be greater than 0"));
        }
        validate_alpha(self.alpha)?;
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::invalid_config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::invalid_config("candidate_multiplier must be greater than 0"));
        }
        Ok(())
    }
}

pub fn validate_alpha(alpha: f32) -> Result<()> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(Error::invalid_config(format!("alpha must be within [0, 1], got {alpha}")))
    }
}

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Length normalization.
    pub b: f32,
    /// Drop common English function words during analysis.
    pub stop_words: bool,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, stop_words: false }
    }
}

impl Bm25Config {
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(Error::invalid_config(format!("bm25.k1 must be a non-negative number, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(Error::invalid_config(format!("bm25.b must be within [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackendKind {
    /// Exact brute-force search held in memory.
    #[default]
    Flat,
    /// LanceDB table on a local URI.
    Lance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackendKind,
    pub metric: Metric,
    /// Database URI for the `lance` backend; `~` and `${VAR}` are expanded.
    pub uri: String,
    pub table: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackendKind::Flat,
            metric: Metric::Cosine,
            uri: "~/.local/share/ragdb/lancedb".to_string(),
            table: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Deterministic feature hashing, no model files required.
    #[default]
    Hashing,
    /// Local BGE-M3 (XLM-RoBERTa) weights run through candle.
    BgeM3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Output dimension of the hashing embedder; the model decides for `bge_m3`.
    pub dim: usize,
    /// Maximum tokens fed to the model per text.
    pub max_len: usize,
    pub model_dir: Option<String>,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self { kind: EmbedderKind::Hashing, dim: 384, max_len: 256, model_dir: None }
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == EmbedderKind::Hashing && self.dim == 0 {
            return Err(Error::invalid_config("embedder.dim must be greater than 0"));
        }
        if self.max_len == 0 {
            return Err(Error::invalid_config("embedder.max_len must be greater than 0"));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
