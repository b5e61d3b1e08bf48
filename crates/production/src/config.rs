//! File-based configuration.

use hybrid_classifier::RoutingRules;
use hybrid_core::BusinessExecutor;
use hybrid_pbft::{AdmissionRules, PbftConfig};
use hybrid_router::{RouterBuilder, RouterConfig};
use hybrid_simulation::NetworkConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Errors loading or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    /// `network.replicas` is zero.
    #[error("network.replicas must be at least 1")]
    NoReplicas,

    /// `network.local_replica` does not name a replica.
    #[error("network.local_replica {local} is outside 0..{replicas}")]
    LocalReplicaOutOfRange {
        /// Configured local replica.
        local: u64,
        /// Configured replica count.
        replicas: usize,
    },

    /// `pbft.checkpoint_interval` is zero.
    #[error("pbft.checkpoint_interval must be at least 1")]
    ZeroCheckpointInterval,

    /// `router.consensus_timeout_ms` is zero.
    #[error("router.consensus_timeout_ms must be at least 1")]
    ZeroConsensusTimeout,
}

/// Complete configuration of one router process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Upstream classification rules.
    pub classifier: RoutingRules,
    /// Engine-side admission rules.
    pub admission: AdmissionRules,
    /// Agreement protocol tuning.
    pub pbft: PbftConfig,
    /// Router behavior.
    pub router: RouterConfig,
    /// Cluster shape.
    pub network: NetworkConfig,
}

impl HybridConfig {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            replicas = config.network.replicas,
            checkpoint_interval = config.pbft.checkpoint_interval,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate TOML text. Missing sections take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.replicas == 0 {
            return Err(ConfigError::NoReplicas);
        }
        if self.network.local_replica >= self.network.replicas as u64 {
            return Err(ConfigError::LocalReplicaOutOfRange {
                local: self.network.local_replica,
                replicas: self.network.replicas,
            });
        }
        if self.pbft.checkpoint_interval == 0 {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        if self.router.consensus_timeout_ms == 0 {
            return Err(ConfigError::ZeroConsensusTimeout);
        }
        Ok(())
    }

    /// A router builder carrying every section of this configuration.
    pub fn router_builder(&self, executor: Arc<dyn BusinessExecutor>) -> RouterBuilder {
        RouterBuilder::new(executor)
            .with_rules(self.classifier.clone())
            .with_admission(self.admission.clone())
            .with_pbft(self.pbft.clone())
            .with_config(self.router.clone())
            .with_network(self.network.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_core::AcknowledgingExecutor;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_default() {
        let config = HybridConfig::from_toml_str("").unwrap();
        assert_eq!(config, HybridConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = HybridConfig::from_toml_str(
            r#"
            [network]
            replicas = 7
            shuffle_seed = 3

            [pbft]
            checkpoint_interval = 10

            [classifier]
            value_threshold = 250.0
            "#,
        )
        .unwrap();
        assert_eq!(config.network.replicas, 7);
        assert_eq!(config.network.local_replica, 0);
        assert_eq!(config.network.shuffle_seed, Some(3));
        assert_eq!(config.pbft.checkpoint_interval, 10);
        assert_eq!(config.classifier.value_threshold, 250.0);
        assert!(config.classifier.is_critical("registerFarmer"));
        assert_eq!(config.router, RouterConfig::default());
    }

    #[test]
    fn test_rejects_invalid_shapes() {
        assert!(matches!(
            HybridConfig::from_toml_str("[network]\nreplicas = 0"),
            Err(ConfigError::NoReplicas)
        ));
        assert!(matches!(
            HybridConfig::from_toml_str("[network]\nreplicas = 4\nlocal_replica = 4"),
            Err(ConfigError::LocalReplicaOutOfRange { local: 4, replicas: 4 })
        ));
        assert!(matches!(
            HybridConfig::from_toml_str("[pbft]\ncheckpoint_interval = 0"),
            Err(ConfigError::ZeroCheckpointInterval)
        ));
        assert!(matches!(
            HybridConfig::from_toml_str("[router]\nconsensus_timeout_ms = 0"),
            Err(ConfigError::ZeroConsensusTimeout)
        ));
        assert!(matches!(
            HybridConfig::from_toml_str("[network]\nreplicas = \"four\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_defaults_render_and_parse_back() {
        let text = HybridConfig::default().to_toml_string().unwrap();
        assert!(text.contains("[pbft]"));
        assert!(text.contains("[network]"));
        assert_eq!(
            HybridConfig::from_toml_str(&text).unwrap(),
            HybridConfig::default()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nreplicas = 1").unwrap();
        let config = HybridConfig::load(file.path()).unwrap();
        assert_eq!(config.network.replicas, 1);

        let missing = HybridConfig::load("/nonexistent/hybrid.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[tokio::test]
    async fn test_builder_uses_every_section() {
        let config = HybridConfig::from_toml_str("[network]\nreplicas = 7").unwrap();
        let router = config
            .router_builder(Arc::new(AcknowledgingExecutor))
            .build()
            .unwrap();
        let status = router.network_status().await.unwrap();
        assert_eq!(status.replicas, 7);
        assert_eq!(status.fault_tolerance.max_faulty, 2);
    }
}
