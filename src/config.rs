//! Configuration management for the fraud scoring service

use crate::features::encoder::EncodingStrategy;
use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable pointing at an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "SCORER_CONFIG";

/// Prefix of `SCORER__SECTION__KEY` override variables
pub const ENV_PREFIX: &str = "SCORER";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub artifacts: ArtifactsConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for single-record scoring requests
    pub score_subject: String,
    /// Subject for batch scoring requests
    pub batch_subject: String,
    /// Subject for health/info requests
    pub health_subject: String,
}

/// Where the model artifacts live and how they are encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory with separate artifact files
    pub model_dir: String,
    /// Single-file bundle; when set it takes precedence over `model_dir`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    /// Categorical encoding strategy for separate-artifacts mode
    #[serde(default)]
    pub encoding: EncodingStrategy,
    /// Classifier file inside `model_dir` (`.onnx` or `.json`)
    pub classifier_file: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// How artifacts are laid out on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// One file per artifact inside a directory
    Directory(PathBuf),
    /// Every artifact in a single bundle file
    Bundle(PathBuf),
}

impl ArtifactsConfig {
    pub fn source(&self) -> ArtifactSource {
        match self.bundle.as_deref().map(str::trim) {
            Some(bundle) if !bundle.is_empty() => ArtifactSource::Bundle(PathBuf::from(bundle)),
            _ => ArtifactSource::Directory(PathBuf::from(&self.model_dir)),
        }
    }
}

/// Decision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Threshold used when neither the artifacts nor an override provide one
    pub default_threshold: f64,
    /// Runtime override; always wins when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_override: Option<f64>,
}

/// Request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summary reports; 0 disables reporting
    pub report_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from `SCORER_CONFIG` or the default path, then the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration: built-in defaults, then the file (if present), then
    /// `SCORER__SECTION__KEY` environment variables.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_layers(path.as_ref(), None)
    }

    /// `env` replaces the process environment when set.
    fn load_layers(path: &Path, env: Option<Map<String, String>>) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                score_subject: "fraud.score".to_string(),
                batch_subject: "fraud.score.batch".to_string(),
                health_subject: "fraud.health".to_string(),
            },
            artifacts: ArtifactsConfig {
                model_dir: "model".to_string(),
                bundle: None,
                encoding: EncodingStrategy::Fitted,
                classifier_file: "fraud_model.onnx".to_string(),
                onnx_threads: 1,
            },
            detection: DetectionConfig {
                default_threshold: 0.5,
                threshold_override: None,
            },
            pipeline: PipelineConfig { workers: 8 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.detection.default_threshold, 0.5);
        assert_eq!(config.detection.threshold_override, None);
        assert_eq!(config.artifacts.encoding, EncodingStrategy::Fitted);
        assert_eq!(
            config.artifacts.source(),
            ArtifactSource::Directory(PathBuf::from("model"))
        );
    }

    #[test]
    fn test_bundle_takes_precedence() {
        let mut artifacts = AppConfig::default().artifacts;
        artifacts.bundle = Some("model/bundle.json".to_string());
        assert_eq!(
            artifacts.source(),
            ArtifactSource::Bundle(PathBuf::from("model/bundle.json"))
        );

        artifacts.bundle = Some("  ".to_string());
        assert!(matches!(artifacts.source(), ArtifactSource::Directory(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.nats.score_subject, "fraud.score");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[artifacts]
model_dir = "/srv/model"
encoding = "lookup"
classifier_file = "classifier.json"

[detection]
default_threshold = 0.5
threshold_override = 0.35
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.artifacts.model_dir, "/srv/model");
        assert_eq!(config.artifacts.encoding, EncodingStrategy::Lookup);
        assert_eq!(config.detection.threshold_override, Some(0.35));
        // Untouched sections keep their defaults
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[detection]\ndefault_threshold = 0.5\nthreshold_override = 0.35\n\n[pipeline]\nworkers = 2\n",
        )
        .unwrap();

        let env: Map<String, String> = [
            ("SCORER__DETECTION__THRESHOLD_OVERRIDE", "0.7"),
            ("SCORER__ARTIFACTS__ENCODING", "lookup"),
            ("OTHER__PIPELINE__WORKERS", "64"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = AppConfig::load_layers(&path, Some(env)).unwrap();
        assert_eq!(config.detection.threshold_override, Some(0.7));
        assert_eq!(config.artifacts.encoding, EncodingStrategy::Lookup);
        // Unprefixed variables are ignored; the file value stays
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.detection.default_threshold, 0.5);
    }

    #[test]
    fn test_empty_environment_keeps_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\ndefault_threshold = 0.5\nthreshold_override = 0.35\n").unwrap();

        let config = AppConfig::load_layers(&path, Some(Map::new())).unwrap();
        assert_eq!(config.detection.threshold_override, Some(0.35));
    }
}
