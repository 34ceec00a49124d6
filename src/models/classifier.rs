//! Classifier capability and the artifacts that describe one

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A trained binary classifier over the aligned feature row.
///
/// Implementations are deterministic and safe to share across threads.
pub trait Classifier: Send + Sync {
    /// Human-readable model name
    fn name(&self) -> &str;

    /// Probability of the positive (fraud) class for one aligned row.
    fn score(&self, features: &[f64]) -> Result<f64>;

    /// Number of input columns the model expects, when it can tell.
    fn input_width(&self) -> Option<usize> {
        None
    }
}

/// Classifier artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClassifierSpec {
    /// ONNX model file. Relative paths resolve against the artifact's directory.
    Onnx {
        path: PathBuf,
        #[serde(default)]
        name: Option<String>,
    },
    /// Logistic regression coefficients
    Logistic(LogisticSpec),
}

/// Logistic regression exported as plain coefficients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticSpec {
    #[serde(default = "default_logistic_name")]
    pub name: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

fn default_logistic_name() -> String {
    "logistic".to_string()
}

/// `sigmoid(w . x + b)`
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    name: String,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticClassifier {
    pub fn new(spec: LogisticSpec) -> Result<Self> {
        if spec.coefficients.is_empty() {
            bail!("logistic classifier `{}` has no coefficients", spec.name);
        }
        if spec
            .coefficients
            .iter()
            .chain(std::iter::once(&spec.intercept))
            .any(|c| !c.is_finite())
        {
            bail!("logistic classifier `{}` has non-finite coefficients", spec.name);
        }
        Ok(Self {
            name: spec.name,
            coefficients: spec.coefficients,
            intercept: spec.intercept,
        })
    }
}

impl Classifier for LogisticClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            bail!(
                "expected {} features, got {}",
                self.coefficients.len(),
                features.len()
            );
        }
        let z: f64 = self
            .coefficients
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        Ok(1.0 / (1.0 + (-z).exp()))
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }
}
