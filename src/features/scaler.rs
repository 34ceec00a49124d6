//! Numeric feature scaling

use crate::error::ArtifactError;
use crate::features::schema::FeatureSchema;
use crate::types::record::RawRecord;
use serde::{Deserialize, Serialize};

/// Scaler artifact, one entry per numeric feature in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerSpec {
    /// `(x - mean) / scale`
    Standard {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    /// `x * scale + min`
    MinMax {
        columns: Vec<String>,
        min: Vec<f64>,
        scale: Vec<f64>,
    },
    /// Values pass through unchanged
    Identity { columns: Vec<String> },
}

#[derive(Debug)]
enum Params {
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    MinMax { min: Vec<f64>, scale: Vec<f64> },
    Identity,
}

/// Fitted linear scaler over the schema's numeric features.
///
/// Arithmetic follows the fitted transform exactly (`(x - mean) / scale`,
/// `x * scale + min`) so scaled values match the training matrix bit for bit.
#[derive(Debug)]
pub struct Scaler {
    columns: Vec<String>,
    params: Params,
}

impl Scaler {
    /// Build from an artifact, checking its columns are the schema's numeric features.
    pub fn from_spec(spec: ScalerSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        let (columns, params) = match spec {
            ScalerSpec::Standard {
                columns,
                mean,
                scale,
            } => {
                check_len("mean", &columns, &mean)?;
                check_len("scale", &columns, &scale)?;
                check_finite(mean.iter().chain(&scale))?;
                // Zero-variance columns keep a unit scale
                let scale = scale
                    .into_iter()
                    .map(|s| if s == 0.0 { 1.0 } else { s })
                    .collect();
                (columns, Params::Standard { mean, scale })
            }
            ScalerSpec::MinMax {
                columns,
                min,
                scale,
            } => {
                check_len("min", &columns, &min)?;
                check_len("scale", &columns, &scale)?;
                check_finite(min.iter().chain(&scale))?;
                (columns, Params::MinMax { min, scale })
            }
            ScalerSpec::Identity { columns } => (columns, Params::Identity),
        };

        if columns != schema.numeric {
            return Err(ArtifactError::Inconsistent(format!(
                "scaler was fitted on {:?} but the schema's numeric features are {:?}",
                columns, schema.numeric
            )));
        }

        Ok(Self { columns, params })
    }

    /// Pass-through scaler for deployments trained on unscaled values.
    pub fn identity(schema: &FeatureSchema) -> Self {
        Self {
            columns: schema.numeric.clone(),
            params: Params::Identity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.params {
            Params::Standard { .. } => "standard",
            Params::MinMax { .. } => "min_max",
            Params::Identity => "identity",
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Read the numeric subset of a record, coercing non-numeric and missing
    /// values to 0.
    pub fn numeric_subset(&self, record: &RawRecord) -> Vec<f64> {
        self.columns
            .iter()
            .map(|name| record.get(name).to_number_or_zero())
            .collect()
    }

    /// Scale a numeric subset. Output has the same names, count and order.
    pub fn scale<'a>(&'a self, raw: &[f64]) -> Vec<(&'a str, f64)> {
        debug_assert_eq!(raw.len(), self.columns.len());
        let names = self.columns.iter().map(String::as_str);
        match &self.params {
            Params::Standard { mean, scale } => names
                .zip(raw)
                .zip(mean.iter().zip(scale))
                .map(|((name, x), (m, s))| (name, (x - m) / s))
                .collect(),
            Params::MinMax { min, scale } => names
                .zip(raw)
                .zip(min.iter().zip(scale))
                .map(|((name, x), (m, s))| (name, x * s + m))
                .collect(),
            Params::Identity => names.zip(raw.iter().copied()).collect(),
        }
    }
}

fn check_finite<'a>(mut values: impl Iterator<Item = &'a f64>) -> Result<(), ArtifactError> {
    if values.any(|v| !v.is_finite()) {
        return Err(ArtifactError::Invalid(
            "scaler parameters must be finite".to_string(),
        ));
    }
    Ok(())
}

fn check_len(what: &str, columns: &[String], values: &[f64]) -> Result<(), ArtifactError> {
    if columns.len() != values.len() {
        return Err(ArtifactError::Invalid(format!(
            "scaler has {} columns but {} {} values",
            columns.len(),
            values.len(),
            what
        )));
    }
    Ok(())
}
