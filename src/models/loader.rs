//! ONNX session loading

use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::ValueType;
use std::path::Path;
use tracing::info;

/// ONNX session plus the input/output it is driven through
pub struct LoadedModel {
    pub name: String,
    pub session: Session,
    /// Feature row input
    pub input_name: String,
    /// Declared feature count, when the input shape fixes it
    pub input_width: Option<usize>,
    /// Class probability output
    pub output_name: String,
}

/// Builds ONNX Runtime sessions with a fixed thread budget
pub struct ModelLoader {
    onnx_threads: usize,
}

impl ModelLoader {
    /// Initialize ONNX Runtime and create a loader
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self {
            onnx_threads: onnx_threads.max(1),
        })
    }

    /// Load a single-input classifier from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX classifier");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let inputs: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let input_name = match inputs.as_slice() {
            [single] => single.to_string(),
            [] => return Err(anyhow!("model `{}` declares no inputs", name)),
            many => {
                return Err(anyhow!(
                    "model `{}` declares {} inputs ({:?}); expected one feature row input",
                    name,
                    many.len(),
                    many
                ))
            }
        };

        let input_width = match &session.inputs[0].input_type {
            ValueType::Tensor { shape, .. } => declared_width(shape),
            _ => None,
        };

        let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = select_probability_output(&outputs)
            .ok_or_else(|| anyhow!("model `{}` declares no outputs", name))?
            .to_string();

        info!(
            model = %name,
            input = %input_name,
            input_width = ?input_width,
            output = %output_name,
            "Classifier loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            input_width,
            output_name,
        })
    }
}

/// Pick the probability output: a `prob*` output first, then any output that
/// is not the predicted label, then the last output.
fn select_probability_output<'a>(outputs: &[&'a str]) -> Option<&'a str> {
    outputs
        .iter()
        .find(|name| name.contains("prob"))
        .or_else(|| outputs.iter().find(|name| !name.contains("label")))
        .or_else(|| outputs.last())
        .copied()
}

/// Feature count of a `[batch, features]` input. Dynamic (negative) or
/// missing dimensions leave it undetermined.
fn declared_width(dims: &[i64]) -> Option<usize> {
    match dims {
        [_, width] | [width] if *width > 0 => Some(*width as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_selection() {
        // sklearn/skl2onnx classifiers
        assert_eq!(
            select_probability_output(&["output_label", "output_probability"]),
            Some("output_probability")
        );
        // Single-output calibrated models
        assert_eq!(select_probability_output(&["variable"]), Some("variable"));
        assert_eq!(
            select_probability_output(&["label", "scores"]),
            Some("scores")
        );
        assert_eq!(select_probability_output(&["label"]), Some("label"));
        assert_eq!(select_probability_output(&[]), None);
    }

    #[test]
    fn test_declared_width() {
        assert_eq!(declared_width(&[1, 19]), Some(19));
        assert_eq!(declared_width(&[-1, 19]), Some(19));
        // Dynamic feature dimension
        assert_eq!(declared_width(&[-1, -1]), None);
        assert_eq!(declared_width(&[19]), Some(19));
        assert_eq!(declared_width(&[]), None);
        assert_eq!(declared_width(&[1, 3, 19]), None);
    }
}
