//! ONNX Runtime classifier

use crate::models::classifier::Classifier;
use crate::models::loader::{LoadedModel, ModelLoader};
use anyhow::{anyhow, Context, Result};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Classifier backed by an ONNX Runtime session.
///
/// Running a session needs exclusive access, so the session sits behind a
/// mutex. The model itself is never mutated.
pub struct OnnxClassifier {
    name: String,
    input_width: Option<usize>,
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    /// Load an ONNX classifier from file
    pub fn load<P: AsRef<Path>>(path: P, name: &str, onnx_threads: usize) -> Result<Self> {
        let loader = ModelLoader::with_threads(onnx_threads)?;
        let model = loader.load_model(path, name)?;
        Ok(Self {
            name: name.to_string(),
            input_width: model.input_width,
            model: Mutex::new(model),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, features: &[f64]) -> Result<f64> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        run_single_model(&mut model, features)
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }
}

/// Run the model on one row
fn run_single_model(model: &mut LoadedModel, features: &[f64]) -> Result<f64> {
    // Shape [1, num_features]
    let shape = vec![1_i64, features.len() as i64];
    let data: Vec<f32> = features.iter().map(|&x| x as f32).collect();
    let input_tensor =
        Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

    let model_name = model.name.clone();

    let outputs = model
        .session
        .run(ort::inputs![&model.input_name => input_tensor])?;

    extract_probability(&outputs, &model.output_name, &model_name)
}

/// Read the positive-class probability from the session outputs: the
/// selected output first, then any other non-label output.
fn extract_probability(
    outputs: &ort::session::SessionOutputs,
    output_name: &str,
    model_name: &str,
) -> Result<f64> {
    let mut last_error = None;

    if let Some(output) = outputs.get(output_name) {
        match probability_from_value(output) {
            Ok(prob) => {
                debug!(model = %model_name, output = %output_name, prob = prob, "Extracted probability");
                return Ok(prob);
            }
            Err(e) => last_error = Some(e),
        }
    }

    // Fallback: any other non-label output
    for (name, output) in outputs.iter() {
        if name == output_name || name.contains("label") {
            continue;
        }
        match probability_from_value(&output) {
            Ok(prob) => {
                debug!(model = %model_name, output = %name, prob = prob, "Extracted probability (fallback)");
                return Ok(prob);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => e.context(format!("model `{}` produced no usable probability", model_name)),
        None => anyhow!("model `{}` produced no probability output", model_name),
    })
}

/// Dense `[batch, classes]` tensors (calibrated sklearn, XGBoost) or
/// `seq(map(int64, float))` (zipmap, LightGBM, CatBoost).
fn probability_from_value(output: &ort::value::DynValue) -> Result<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        return extract_fraud_prob_from_tensor(&shape, data);
    }
    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return extract_from_sequence_map(output);
    }
    Err(anyhow!("unsupported output type {:?}", output.dtype()))
}

/// Extract probability from seq(map(int64, float)) format
fn extract_from_sequence_map(output: &ort::value::DynValue) -> Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    // Batch size is always 1
    let map_value = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;
    let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

    if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
        return Ok(*prob as f64);
    }
    if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
        return Ok(1.0 - *prob as f64);
    }

    Err(anyhow!("No probability found in map"))
}

/// Extract fraud probability from tensor data
fn extract_fraud_prob_from_tensor(shape: &ort::tensor::Shape, data: &[f32]) -> Result<f64> {
    let dims: Vec<i64> = shape.iter().copied().collect();
    let num_classes = match dims.as_slice() {
        [_, classes] | [classes] => *classes as usize,
        _ => data.len(),
    };

    let prob = match num_classes {
        // [batch, classes] or [classes]: positive class at index 1
        n if n >= 2 => data.get(1),
        // single probability column
        1 => data.first(),
        _ => None,
    };

    prob.map(|&p| p as f64)
        .ok_or_else(|| anyhow!("unexpected probability tensor shape {:?}", dims))
}
