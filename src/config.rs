//! Tunables, loadable from a partial JSON file.
//!
//! Every struct implements `Default` and uses `#[serde(default)]`, so a file
//! only needs the fields it overrides:
//!
//! ```json
//! { "strategy": { "kind": "linear" }, "pipeline": { "top_k": 5 } }
//! ```

use crate::backend::NnStrategy;
use crate::index::LazyRebuildConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stage queue sizing and result length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bound of each stage's inbound queue.
    pub queue_capacity: usize,

    /// Maximum signature candidates per request.
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            top_k: 1,
        }
    }
}

/// RPC transport limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Largest accepted frame payload.
    pub max_frame_bytes: usize,

    pub connect_timeout_ms: u64,

    /// Per-call deadline, covering both request and reply.
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
            connect_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl RpcConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Everything a node needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub strategy: NnStrategy,
    pub rebuild: LazyRebuildConfig,
    pub pipeline: PipelineConfig,
    pub rpc: RpcConfig,
}

impl NodeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            NodeConfig::from_json(r#"{ "strategy": { "kind": "linear" }, "pipeline": { "top_k": 5 } }"#)
                .unwrap();
        assert_eq!(config.strategy, NnStrategy::Linear);
        assert_eq!(config.pipeline.top_k, 5);
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert_eq!(config.rpc, RpcConfig::default());
        assert!(config.rebuild.auto_rebuild);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(NodeConfig::from_json("{}").unwrap(), NodeConfig::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            NodeConfig::from_json("{ top_k: }"),
            Err(ConfigError::Json(_))
        ));
    }
}
