//! Artifact loading.
//!
//! Everything the pipeline needs is read once at startup, either from a model
//! directory with one file per artifact or from a single JSON bundle. Any
//! missing or invalid required artifact is fatal.

use crate::config::{ArtifactSource, ArtifactsConfig};
use crate::error::ArtifactError;
use crate::features::encoder::{EncoderSpec, EncodingStrategy, LookupSpec};
use crate::features::{Encoder, FeatureSchema, Scaler, ScalerSpec, TrainedOrder};
use crate::models::{Classifier, ClassifierSpec, LogisticClassifier, OnnxClassifier};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SCHEMA_FILE: &str = "schema.json";
pub const FEATURE_ORDER_FILE: &str = "feature_order.json";
pub const ENCODER_FILE: &str = "encoder.json";
pub const LOOKUP_TABLE_FILE: &str = "lookup_table.json";
pub const SCALER_FILE: &str = "scaler.json";

/// Immutable, fully loaded model artifacts
pub struct Artifacts {
    pub schema: FeatureSchema,
    pub order: TrainedOrder,
    pub encoder: Encoder,
    pub scaler: Scaler,
    pub classifier: Box<dyn Classifier>,
    /// Threshold shipped with the classifier, if any
    pub bundled_threshold: Option<f64>,
}

/// Single-file artifact bundle
#[derive(Debug, Deserialize)]
pub struct ArtifactBundle {
    #[serde(default)]
    pub schema: Option<FeatureSchema>,
    pub feature_order: Vec<String>,
    pub encoder: EncoderSpec,
    #[serde(default)]
    pub scaler: Option<ScalerSpec>,
    pub classifier: ClassifierSpec,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Loads artifacts as described by the configuration
pub struct ArtifactLoader<'a> {
    config: &'a ArtifactsConfig,
}

impl<'a> ArtifactLoader<'a> {
    pub fn new(config: &'a ArtifactsConfig) -> Self {
        Self { config }
    }

    pub fn load(&self) -> Result<Artifacts, ArtifactError> {
        let artifacts = match self.config.source() {
            ArtifactSource::Bundle(path) => self.load_bundle(&path)?,
            ArtifactSource::Directory(dir) => self.load_directory(&dir)?,
        };

        if let Some(width) = artifacts.classifier.input_width() {
            if width != artifacts.order.len() {
                return Err(ArtifactError::Inconsistent(format!(
                    "classifier `{}` expects {} inputs but the trained order has {} columns",
                    artifacts.classifier.name(),
                    width,
                    artifacts.order.len()
                )));
            }
        }

        info!(
            strategy = ?artifacts.encoder.strategy(),
            scaler = artifacts.scaler.kind(),
            classifier = artifacts.classifier.name(),
            raw_features = artifacts.schema.raw_feature_count(),
            trained_columns = artifacts.order.len(),
            "Artifacts loaded"
        );

        Ok(artifacts)
    }

    /// Load every artifact from one bundle file
    pub fn load_bundle(&self, path: &Path) -> Result<Artifacts, ArtifactError> {
        info!(path = %path.display(), "Loading artifact bundle");

        let bundle: ArtifactBundle = read_json(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let schema = bundle.schema.unwrap_or_default();
        schema.validate()?;
        let order = TrainedOrder::new(bundle.feature_order)?;
        let encoder = Encoder::from_spec(bundle.encoder, &schema)?;
        let scaler = match bundle.scaler {
            Some(spec) => Scaler::from_spec(spec, &schema)?,
            None => Scaler::identity(&schema),
        };
        let classifier = build_classifier(bundle.classifier, base_dir, self.config.onnx_threads)?;

        Ok(Artifacts {
            schema,
            order,
            encoder,
            scaler,
            classifier,
            bundled_threshold: bundle.threshold,
        })
    }

    /// Load artifacts stored as separate files in a directory
    pub fn load_directory(&self, dir: &Path) -> Result<Artifacts, ArtifactError> {
        info!(dir = %dir.display(), encoding = ?self.config.encoding, "Loading artifacts");

        if !dir.is_dir() {
            return Err(ArtifactError::Missing(dir.to_path_buf()));
        }

        let schema: FeatureSchema = read_optional_json(&dir.join(SCHEMA_FILE))?.unwrap_or_default();
        schema.validate()?;

        let (encoder, order, scaler) = match self.config.encoding {
            EncodingStrategy::Fitted => {
                let spec: EncoderSpec = read_json(&dir.join(ENCODER_FILE))?;
                if !matches!(spec, EncoderSpec::OneHot(_)) {
                    return Err(ArtifactError::Inconsistent(format!(
                        "{} is not a fitted encoder but encoding is `fitted`",
                        ENCODER_FILE
                    )));
                }
                let encoder = Encoder::from_spec(spec, &schema)?;
                let order = TrainedOrder::new(read_json(&dir.join(FEATURE_ORDER_FILE))?)?;
                let scaler = Scaler::from_spec(read_json(&dir.join(SCALER_FILE))?, &schema)?;
                (encoder, order, scaler)
            }
            EncodingStrategy::Lookup => {
                let tables: LookupSpec = match read_optional_json(&dir.join(LOOKUP_TABLE_FILE))? {
                    Some(tables) => tables,
                    None => {
                        info!("No lookup table artifact, using built-in transaction tables");
                        LookupSpec::transaction()
                    }
                };
                let encoder = Encoder::from_spec(EncoderSpec::Lookup(tables), &schema)?;
                let order = match read_optional_json(&dir.join(FEATURE_ORDER_FILE))? {
                    Some(columns) => TrainedOrder::new(columns)?,
                    None => TrainedOrder::transaction_label_encoded(),
                };
                let scaler = match read_optional_json(&dir.join(SCALER_FILE))? {
                    Some(spec) => Scaler::from_spec(spec, &schema)?,
                    None => Scaler::identity(&schema),
                };
                (encoder, order, scaler)
            }
        };

        let classifier_path = dir.join(&self.config.classifier_file);
        let classifier_spec = match classifier_path.extension().and_then(|e| e.to_str()) {
            Some("onnx") => ClassifierSpec::Onnx {
                path: classifier_path,
                name: None,
            },
            _ => read_json(&classifier_path)?,
        };
        let classifier = build_classifier(classifier_spec, dir, self.config.onnx_threads)?;

        Ok(Artifacts {
            schema,
            order,
            encoder,
            scaler,
            classifier,
            bundled_threshold: None,
        })
    }
}

fn build_classifier(
    spec: ClassifierSpec,
    base_dir: &Path,
    onnx_threads: usize,
) -> Result<Box<dyn Classifier>, ArtifactError> {
    match spec {
        ClassifierSpec::Onnx { path, name } => {
            let path = resolve(base_dir, path);
            if !path.is_file() {
                return Err(ArtifactError::Missing(path));
            }
            let name = name.unwrap_or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("onnx")
                    .to_string()
            });
            let classifier = OnnxClassifier::load(&path, &name, onnx_threads)
                .map_err(|e| ArtifactError::Classifier(format!("{:#}", e)))?;
            Ok(Box::new(classifier))
        }
        ClassifierSpec::Logistic(spec) => {
            let classifier = LogisticClassifier::new(spec)
                .map_err(|e| ArtifactError::Classifier(format!("{:#}", e)))?;
            Ok(Box::new(classifier))
        }
    }
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    read_optional_json(path)?.ok_or_else(|| ArtifactError::Missing(path.to_path_buf()))
}

fn read_optional_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ArtifactError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ArtifactError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| ArtifactError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use std::fs;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        fs::write(dir.join(name), serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    }

    fn config_for(dir: &Path, encoding: EncodingStrategy) -> ArtifactsConfig {
        let mut config = AppConfig::default().artifacts;
        config.model_dir = dir.to_string_lossy().into_owned();
        config.encoding = encoding;
        config.classifier_file = "classifier.json".to_string();
        config
    }

    fn write_small_schema(dir: &Path) {
        write(
            dir,
            SCHEMA_FILE,
            json!({
                "categorical": ["Card_Type"],
                "numeric": ["Transaction_Amount"],
                "boolean": ["Is_Weekend"]
            }),
        );
    }

    #[test]
    fn test_load_fitted_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_small_schema(dir.path());
        write(
            dir.path(),
            ENCODER_FILE,
            json!({
                "strategy": "one_hot",
                "features": [{"feature": "Card_Type", "categories": ["Amex", "Visa"]}]
            }),
        );
        write(
            dir.path(),
            FEATURE_ORDER_FILE,
            json!(["Transaction_Amount", "Is_Weekend", "Card_Type_Amex", "Card_Type_Visa"]),
        );
        write(
            dir.path(),
            SCALER_FILE,
            json!({"kind": "standard", "columns": ["Transaction_Amount"], "mean": [100.0], "scale": [10.0]}),
        );
        write(
            dir.path(),
            "classifier.json",
            json!({"kind": "logistic", "coefficients": [1.0, 0.5, 0.0, 2.0], "intercept": -1.0}),
        );

        let config = config_for(dir.path(), EncodingStrategy::Fitted);
        let artifacts = ArtifactLoader::new(&config).load().unwrap();

        assert_eq!(artifacts.order.len(), 4);
        assert_eq!(artifacts.encoder.strategy(), EncodingStrategy::Fitted);
        assert_eq!(artifacts.encoder.columns(), ["Card_Type_Amex", "Card_Type_Visa"]);
        assert_eq!(artifacts.scaler.kind(), "standard");
        assert_eq!(artifacts.classifier.input_width(), Some(4));
        assert_eq!(artifacts.bundled_threshold, None);
    }

    #[test]
    fn test_fitted_directory_requires_encoder() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), FEATURE_ORDER_FILE, json!(["Transaction_Amount"]));

        let config = config_for(dir.path(), EncodingStrategy::Fitted);
        let result = ArtifactLoader::new(&config).load();

        match result {
            Err(ArtifactError::Missing(path)) => assert!(path.ends_with(ENCODER_FILE)),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("loading should fail without an encoder"),
        }
    }

    #[test]
    fn test_lookup_directory_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "classifier.json",
            json!({"kind": "logistic", "coefficients": vec![0.0; 19], "intercept": 0.0}),
        );

        let config = config_for(dir.path(), EncodingStrategy::Lookup);
        let artifacts = ArtifactLoader::new(&config).load().unwrap();

        assert_eq!(artifacts.schema, FeatureSchema::transaction());
        assert_eq!(artifacts.order, TrainedOrder::transaction_label_encoded());
        assert_eq!(artifacts.encoder.strategy(), EncodingStrategy::Lookup);
        assert_eq!(artifacts.scaler.kind(), "identity");
    }

    #[test]
    fn test_classifier_width_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "classifier.json",
            json!({"kind": "logistic", "coefficients": [1.0, 2.0], "intercept": 0.0}),
        );

        let config = config_for(dir.path(), EncodingStrategy::Lookup);
        let result = ArtifactLoader::new(&config).load();
        assert!(matches!(result, Err(ArtifactError::Inconsistent(_))));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir.path().join("nope"), EncodingStrategy::Lookup);
        assert!(matches!(
            ArtifactLoader::new(&config).load(),
            Err(ArtifactError::Missing(_))
        ));
    }

    #[test]
    fn test_malformed_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SCHEMA_FILE), b"{not json").unwrap();

        let config = config_for(dir.path(), EncodingStrategy::Lookup);
        assert!(matches!(
            ArtifactLoader::new(&config).load(),
            Err(ArtifactError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("bundle.json");
        write(
            dir.path(),
            "bundle.json",
            json!({
                "schema": {"categorical": ["Card_Type"], "numeric": ["Transaction_Amount"], "boolean": []},
                "feature_order": ["Transaction_Amount", "Card_Type"],
                "encoder": {"strategy": "lookup", "tables": {"Card_Type": {"Visa": 0, "Amex": 1}}},
                "classifier": {"kind": "logistic", "coefficients": [0.1, 0.2], "intercept": 0.0},
                "threshold": 0.42
            }),
        );

        let mut config = AppConfig::default().artifacts;
        config.bundle = Some(bundle_path.to_string_lossy().into_owned());
        let artifacts = ArtifactLoader::new(&config).load().unwrap();

        assert_eq!(artifacts.bundled_threshold, Some(0.42));
        assert_eq!(artifacts.encoder.strategy(), EncodingStrategy::Lookup);
        assert_eq!(artifacts.scaler.kind(), "identity");
        assert_eq!(artifacts.order.len(), 2);
    }

    #[test]
    fn test_bundle_with_missing_onnx_model() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "bundle.json",
            json!({
                "feature_order": ["Transaction_Amount"],
                "encoder": {"strategy": "lookup", "tables": {}},
                "classifier": {"kind": "onnx", "path": "missing.onnx"}
            }),
        );

        let mut config = AppConfig::default().artifacts;
        config.bundle = Some(dir.path().join("bundle.json").to_string_lossy().into_owned());

        match ArtifactLoader::new(&config).load() {
            Err(ArtifactError::Missing(path)) => assert!(path.ends_with("missing.onnx")),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("loading should fail without the model file"),
        }
    }
}
