//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/hitherto.sqlite"
//!
//! [retrieval]
//! default_k = 5
//! max_k = 20
//! min_score = 0.25
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use hitherto_core::context::{RetrievalParams, DEFAULT_K, HARD_MAX_K};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            max_k: HARD_MAX_K,
            min_score: None,
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            default_k: self.default_k,
            max_k: self.max_k,
            min_score: self.min_score,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}
fn default_max_k() -> usize {
    HARD_MAX_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let retrieval = &config.retrieval;
    if retrieval.default_k == 0 {
        bail!("retrieval.default_k must be >= 1");
    }
    if retrieval.max_k == 0 {
        bail!("retrieval.max_k must be >= 1");
    }
    if retrieval.max_k > HARD_MAX_K {
        bail!(
            "retrieval.max_k ({}) must not exceed {}",
            retrieval.max_k,
            HARD_MAX_K
        );
    }
    if retrieval.default_k > retrieval.max_k {
        bail!(
            "retrieval.default_k ({}) must not exceed retrieval.max_k ({})",
            retrieval.default_k,
            retrieval.max_k
        );
    }
    if let Some(min) = retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }

    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
[db]
path = "./data/hitherto.sqlite"
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.retrieval.max_k, 20);
        assert!(config.retrieval.min_score.is_none());
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_retrieval_params_roundtrip() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[retrieval]
default_k = 3
max_k = 10
min_score = 0.3
"#,
        )
        .unwrap();
        let params = config.retrieval.params();
        assert_eq!(params.default_k, 3);
        assert_eq!(params.max_k, 10);
        assert_eq!(params.min_score, Some(0.3));
    }

    #[test]
    fn test_default_k_above_max_rejected() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"

[retrieval]
default_k = 30
max_k = 20
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_max_k_above_hard_limit_rejected() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"

[retrieval]
max_k = 500
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("retrieval.max_k (500) must not exceed 20"));
    }

    #[test]
    fn test_remote_provider_requires_model_and_dims() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "openai"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "faiss"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
