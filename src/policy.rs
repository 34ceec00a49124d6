//! Decision policy: probability to binary label.

use crate::error::ArtifactError;
use crate::types::decision::Decision;
use serde::Serialize;
use std::fmt;

/// Label for a probability. Ties go to the positive (fraud) class.
pub fn decide(probability: f64, threshold: f64) -> u8 {
    u8::from(probability >= threshold)
}

/// Where the resolved threshold came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdSource {
    /// Stored default from configuration
    Default,
    /// Shipped with the classifier artifact
    Bundled,
    /// Explicit runtime override
    Override,
}

impl fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdSource::Default => "default",
            ThresholdSource::Bundled => "bundled",
            ThresholdSource::Override => "override",
        };
        f.write_str(name)
    }
}

/// Threshold rule, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    threshold: f64,
    source: ThresholdSource,
}

impl DecisionPolicy {
    pub fn new(threshold: f64) -> Result<Self, ArtifactError> {
        Self::with_source(threshold, ThresholdSource::Default)
    }

    fn with_source(threshold: f64, source: ThresholdSource) -> Result<Self, ArtifactError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ArtifactError::Invalid(format!(
                "{} threshold {} is outside [0, 1]",
                source, threshold
            )));
        }
        Ok(Self { threshold, source })
    }

    /// Resolve the threshold: the override wins over the bundled value, which
    /// wins over the stored default.
    pub fn resolve(
        default: f64,
        bundled: Option<f64>,
        runtime_override: Option<f64>,
    ) -> Result<Self, ArtifactError> {
        match (runtime_override, bundled) {
            (Some(threshold), _) => Self::with_source(threshold, ThresholdSource::Override),
            (None, Some(threshold)) => Self::with_source(threshold, ThresholdSource::Bundled),
            (None, None) => Self::with_source(default, ThresholdSource::Default),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn source(&self) -> ThresholdSource {
        self.source
    }

    pub fn decide(&self, probability: f64) -> Decision {
        Decision {
            probability,
            label: decide(probability, self.threshold),
            threshold: self.threshold,
        }
    }
}
