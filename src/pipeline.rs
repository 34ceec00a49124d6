//! Scoring pipeline: raw record to decision.
//!
//! [`ScoringPipeline`] owns every loaded artifact and is built once at startup.
//! It holds no mutable state, so one instance is shared across all requests.

use crate::artifacts::Artifacts;
use crate::error::{ArtifactError, PredictError};
use crate::features::aligner::{self, AlignedVector, AlignmentReport};
use crate::features::{Encoder, EncodingStrategy, FeatureSchema, Scaler, TrainedOrder};
use crate::models::Classifier;
use crate::policy::{DecisionPolicy, ThresholdSource};
use crate::types::decision::Decision;
use crate::types::record::{json_type_name, RawRecord};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Health/info summary of the loaded pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub status: &'static str,
    pub model_loaded: bool,
    pub classifier: String,
    pub encoding: EncodingStrategy,
    pub scaler: &'static str,
    pub raw_features: usize,
    pub trained_columns: usize,
    pub usable_columns: usize,
    pub threshold: f64,
    pub threshold_source: ThresholdSource,
}

/// Immutable scoring context
pub struct ScoringPipeline {
    schema: FeatureSchema,
    order: TrainedOrder,
    encoder: Encoder,
    scaler: Scaler,
    classifier: Box<dyn Classifier>,
    policy: DecisionPolicy,
    report: AlignmentReport,
}

impl ScoringPipeline {
    /// Assemble the pipeline, resolving the threshold and checking that the
    /// transforms produce at least one column the classifier uses.
    pub fn new(
        artifacts: Artifacts,
        default_threshold: f64,
        threshold_override: Option<f64>,
    ) -> Result<Self, ArtifactError> {
        let policy = DecisionPolicy::resolve(
            default_threshold,
            artifacts.bundled_threshold,
            threshold_override,
        )?;

        let produced = artifacts
            .scaler
            .columns()
            .iter()
            .chain(&artifacts.schema.boolean)
            .chain(artifacts.encoder.columns())
            .map(String::as_str);
        let report = AlignmentReport::new(&artifacts.order, produced);

        if !report.is_usable() {
            return Err(ArtifactError::Inconsistent(format!(
                "none of the {} trained columns can be produced from the feature schema",
                artifacts.order.len()
            )));
        }
        if !report.unproduced.is_empty() {
            warn!(
                count = report.unproduced.len(),
                columns = ?report.unproduced,
                "Trained columns with no producing feature will always be neutral-filled"
            );
        }
        if !report.dropped.is_empty() {
            debug!(
                count = report.dropped.len(),
                columns = ?report.dropped,
                "Produced columns not used by the classifier"
            );
        }

        info!(
            threshold = policy.threshold(),
            source = %policy.source(),
            usable_columns = report.usable,
            trained_columns = artifacts.order.len(),
            "Scoring pipeline ready"
        );

        Ok(Self {
            schema: artifacts.schema,
            order: artifacts.order,
            encoder: artifacts.encoder,
            scaler: artifacts.scaler,
            classifier: artifacts.classifier,
            policy,
            report,
        })
    }

    /// Score one JSON record.
    pub fn predict(&self, payload: &Value) -> Result<Decision, PredictError> {
        let record = RawRecord::from_json(payload)?;
        self.predict_record(record)
    }

    /// Score an already-parsed record.
    pub fn predict_record(&self, record: RawRecord) -> Result<Decision, PredictError> {
        let aligned = self.align_record(record);
        let probability = self
            .classifier
            .score(aligned.values())
            .map_err(|e| PredictError::Scoring(format!("{:#}", e)))?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(PredictError::Scoring(format!(
                "classifier `{}` returned probability {} outside [0, 1]",
                self.classifier.name(),
                probability
            )));
        }

        Ok(self.policy.decide(probability))
    }

    /// Score a JSON array of records. Each element succeeds or fails on its own.
    pub fn predict_batch(&self, payload: &Value) -> Result<Vec<Result<Decision, PredictError>>, PredictError> {
        let items = payload.as_array().ok_or_else(|| {
            PredictError::InvalidInput(format!(
                "expected a JSON array for a batch prediction, got {}",
                json_type_name(payload)
            ))
        })?;
        Ok(items.iter().map(|item| self.predict(item)).collect())
    }

    /// The aligned feature row for a JSON record, without scoring it.
    pub fn transform(&self, payload: &Value) -> Result<AlignedVector<'_>, PredictError> {
        let record = RawRecord::from_json(payload)?;
        Ok(self.align_record(record))
    }

    fn align_record(&self, mut record: RawRecord) -> AlignedVector<'_> {
        let filled = self.schema.fill_missing(&mut record);
        if filled > 0 {
            debug!(filled = filled, "Filled missing raw features");
        }

        let encoded = self.encoder.encode(&record);
        let scaled = self.scaler.scale(&self.scaler.numeric_subset(&record));
        let boolean = aligner::boolean_subset(&self.schema.boolean, &record);

        aligner::align(&scaled, &boolean, &encoded, &self.order)
    }

    pub fn threshold(&self) -> f64 {
        self.policy.threshold()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn trained_order(&self) -> &TrainedOrder {
        &self.order
    }

    pub fn alignment(&self) -> &AlignmentReport {
        &self.report
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            status: "healthy",
            model_loaded: true,
            classifier: self.classifier.name().to_string(),
            encoding: self.encoder.strategy(),
            scaler: self.scaler.kind(),
            raw_features: self.schema.raw_feature_count(),
            trained_columns: self.order.len(),
            usable_columns: self.report.usable,
            threshold: self.policy.threshold(),
            threshold_source: self.policy.source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::encoder::{LookupSpec, OneHotSpec, CategorySpec, UnknownPolicy};
    use crate::features::{EncoderSpec, ScalerSpec};
    use crate::models::{LogisticClassifier, LogisticSpec};
    use anyhow::{anyhow, Result};
    use serde_json::json;

    /// Classifier that returns a fixed probability.
    struct Fixed(f64);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _features: &[f64]) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn score(&self, _features: &[f64]) -> Result<f64> {
            Err(anyhow!("session closed"))
        }
    }

    fn categories(feature: &str, values: &[Value]) -> CategorySpec {
        CategorySpec {
            feature: feature.to_string(),
            categories: values.to_vec(),
        }
    }

    /// One-hot transaction deployment: numeric, boolean, then encoded columns.
    fn fitted_artifacts(classifier: Box<dyn Classifier>) -> Artifacts {
        let schema = FeatureSchema::transaction();
        let spec = OneHotSpec {
            features: vec![
                categories("Transaction_Type", &[json!("Credit"), json!("Debit"), json!("POS")]),
                categories("Device_Type", &[json!("Mobile"), json!("Web")]),
                categories("Location", &[json!("Nigeria"), json!("UK"), json!("USA")]),
                categories("Merchant_Category", &[json!("Electronics"), json!("Travel")]),
                categories("Card_Type", &[json!("Amex"), json!("Visa")]),
                categories("Authentication_Method", &[json!("OTP"), json!("PIN")]),
                categories("Hour", &[json!(0), json!(11), json!(23)]),
                categories("Month", &[json!(1), json!(8)]),
                categories("Year", &[json!(2024), json!(2025)]),
            ],
            handle_unknown: UnknownPolicy::Ignore,
        };
        let encoder = Encoder::from_spec(EncoderSpec::OneHot(spec), &schema).unwrap();

        let mut columns: Vec<String> = schema.numeric.clone();
        columns.extend(schema.boolean.iter().cloned());
        columns.extend(encoder.columns().iter().cloned());
        // Training order differs from concatenation order
        columns.reverse();
        let order = TrainedOrder::new(columns).unwrap();

        let n = schema.numeric.len();
        let scaler = Scaler::from_spec(
            ScalerSpec::Standard {
                columns: schema.numeric.clone(),
                mean: vec![100.0; n],
                scale: vec![50.0; n],
            },
            &schema,
        )
        .unwrap();

        Artifacts {
            schema,
            order,
            encoder,
            scaler,
            classifier,
            bundled_threshold: None,
        }
    }

    fn lookup_artifacts(classifier: Box<dyn Classifier>) -> Artifacts {
        let schema = FeatureSchema::transaction();
        let encoder = Encoder::from_spec(EncoderSpec::Lookup(LookupSpec::transaction()), &schema).unwrap();
        let scaler = Scaler::identity(&schema);
        Artifacts {
            schema,
            order: TrainedOrder::transaction_label_encoded(),
            encoder,
            scaler,
            classifier,
            bundled_threshold: Some(0.6),
        }
    }

    fn logistic(width: usize) -> Box<dyn Classifier> {
        let coefficients = (0..width).map(|i| 0.01 * (i as f64 + 1.0)).collect();
        Box::new(
            LogisticClassifier::new(LogisticSpec {
                name: "logistic".to_string(),
                coefficients,
                intercept: -0.5,
            })
            .unwrap(),
        )
    }

    fn full_record() -> Value {
        json!({
            "Transaction_Amount": 900000.0,
            "Transaction_Type": 0.0,
            "Account_Balance": 5200.0,
            "Device_Type": 2.0,
            "Location": 123456.0,
            "Merchant_Category": 0.0,
            "IP_Address_Flag": 0.0,
            "Previous_Fraudulent_Activity": 0.0,
            "Daily_Transaction_Count": 1.0,
            "Avg_Transaction_Amount_7d": 125.50,
            "Failed_Transaction_Count_7d": 0.0,
            "Card_Type": 0.0,
            "Card_Age": 365.0,
            "Transaction_Distance": 0.0,
            "Authentication_Method": 1.0,
            "Is_Weekend": 1.0,
            "Hour": 11.0,
            "Month": 8.0,
            "Year": 2025.0
        })
    }

    fn fitted_pipeline() -> ScoringPipeline {
        let artifacts = fitted_artifacts(Box::new(Fixed(0.3)));
        ScoringPipeline::new(artifacts, 0.5, None).unwrap()
    }

    #[test]
    fn test_full_record_scenario() {
        let pipeline = fitted_pipeline();
        let aligned = pipeline.transform(&full_record()).unwrap();

        assert_eq!(aligned.len(), pipeline.trained_order().len());
        assert_eq!(aligned.columns(), pipeline.trained_order().columns());
        // Numeric code 11.0 matches the fitted category 11
        assert_eq!(aligned.get("Hour_11"), Some(1.0));
        assert_eq!(aligned.get("Is_Weekend"), Some(1.0));
        assert_eq!(aligned.get("Card_Age"), Some((365.0 - 100.0) / 50.0));

        let decision = pipeline.predict(&full_record()).unwrap();
        assert_eq!(decision.threshold, 0.5);
        assert_eq!(decision.probability, 0.3);
        assert_eq!(decision.label, 0);
    }

    #[test]
    fn test_alignment_is_deterministic() {
        let pipeline = fitted_pipeline();
        let first = pipeline.transform(&full_record()).unwrap();
        for _ in 0..10 {
            assert_eq!(pipeline.transform(&full_record()).unwrap(), first);
        }
    }

    #[test]
    fn test_partial_record_scenario() {
        let pipeline = fitted_pipeline();
        let payload = json!({
            "Transaction_Amount": 500.0,
            "Transaction_Type": "Credit",
            "Device_Type": "Mobile",
            "Location": "USA"
        });

        let aligned = pipeline.transform(&payload).unwrap();
        assert_eq!(aligned.len(), pipeline.trained_order().len());
        assert_eq!(aligned.get("Location_USA"), Some(1.0));
        assert_eq!(aligned.get("Is_Weekend"), Some(0.0));
        // Missing numeric fields read as 0 before scaling
        assert_eq!(aligned.get("Card_Age"), Some((0.0 - 100.0) / 50.0));
        assert!(aligned.values().iter().all(|v| v.is_finite()));

        assert!(pipeline.predict(&payload).is_ok());
    }

    #[test]
    fn test_missing_field_equals_neutral_default() {
        let pipeline = fitted_pipeline();
        let mut explicit = full_record();
        let mut missing = full_record();

        for field in ["Location", "Card_Age", "Is_Weekend"] {
            explicit[field] = Value::Null;
            missing.as_object_mut().unwrap().remove(field);
        }

        assert_eq!(
            pipeline.transform(&missing).unwrap(),
            pipeline.transform(&explicit).unwrap()
        );
    }

    #[test]
    fn test_native_booleans_match_numeric_flags() {
        let pipeline = fitted_pipeline();
        let mut native = full_record();
        native["IP_Address_Flag"] = json!(false);
        native["Is_Weekend"] = json!(true);
        native["Previous_Fraudulent_Activity"] = json!(true);

        let mut numeric = full_record();
        numeric["IP_Address_Flag"] = json!(0);
        numeric["Is_Weekend"] = json!(1);
        numeric["Previous_Fraudulent_Activity"] = json!(1);

        assert_eq!(
            pipeline.transform(&native).unwrap(),
            pipeline.transform(&numeric).unwrap()
        );
    }

    #[test]
    fn test_unknown_category_scenario() {
        let pipeline = fitted_pipeline();
        let mut payload = full_record();
        payload["Location"] = json!("Atlantis");

        let aligned = pipeline.transform(&payload).unwrap();
        for column in ["Location_Nigeria", "Location_UK", "Location_USA"] {
            assert_eq!(aligned.get(column), Some(0.0));
        }
        assert!(pipeline.predict(&payload).is_ok());
    }

    #[test]
    fn test_list_payload_scenario() {
        let pipeline = fitted_pipeline();
        let err = pipeline.predict(&json!([full_record()])).unwrap_err();
        assert!(matches!(err, PredictError::InvalidInput(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_lookup_strategy_scenarios() {
        let pipeline = ScoringPipeline::new(lookup_artifacts(logistic(19)), 0.5, None).unwrap();
        assert_eq!(pipeline.threshold(), 0.6);

        let text = json!({
            "Transaction_Amount": 900000.0,
            "Transaction_Type": "Debit",
            "Device_Type": "Web",
            "Location": "Nigeria",
            "Card_Type": "Visa",
            "Authentication_Method": "OTP",
            "Is_Weekend": true,
            "Hour": 11
        });
        let aligned = pipeline.transform(&text).unwrap();
        assert_eq!(aligned.len(), 19);
        assert_eq!(aligned.get("Device_Type"), Some(2.0));
        assert_eq!(aligned.get("Location"), Some(123456.0));
        assert_eq!(aligned.get("Authentication_Method"), Some(1.0));
        assert_eq!(aligned.get("Is_Weekend"), Some(1.0));
        assert_eq!(aligned.get("Hour"), Some(11.0));
        assert_eq!(aligned.get("Year"), Some(0.0));

        // Text and pre-encoded numeric codes align identically
        let codes = json!({
            "Transaction_Amount": 900000.0,
            "Transaction_Type": 0,
            "Device_Type": 2,
            "Location": 123456,
            "Card_Type": 0,
            "Authentication_Method": 1,
            "Is_Weekend": 1,
            "Hour": 11
        });
        assert_eq!(pipeline.transform(&codes).unwrap(), aligned);

        let mut unknown = text.clone();
        unknown["Location"] = json!("Atlantis");
        assert_eq!(pipeline.transform(&unknown).unwrap().get("Location"), Some(0.0));

        let decision = pipeline.predict(&text).unwrap();
        assert!((0.0..=1.0).contains(&decision.probability));
        assert_eq!(decision.threshold, 0.6);
    }

    #[test]
    fn test_threshold_override_wins() {
        let pipeline =
            ScoringPipeline::new(lookup_artifacts(Box::new(Fixed(0.65))), 0.5, Some(0.65)).unwrap();
        assert_eq!(pipeline.summary().threshold_source, ThresholdSource::Override);

        let decision = pipeline.predict(&json!({})).unwrap();
        assert_eq!(decision.threshold, 0.65);
        // Tie goes to fraud
        assert_eq!(decision.label, 1);
    }

    #[test]
    fn test_scoring_failure_preserves_message() {
        let pipeline = ScoringPipeline::new(fitted_artifacts(Box::new(Broken)), 0.5, None).unwrap();
        let err = pipeline.predict(&full_record()).unwrap_err();

        assert!(matches!(err, PredictError::Scoring(_)));
        assert!(err.to_string().contains("session closed"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_out_of_range_probability_is_scoring_error() {
        let pipeline = ScoringPipeline::new(fitted_artifacts(Box::new(Fixed(1.5))), 0.5, None).unwrap();
        assert!(matches!(
            pipeline.predict(&full_record()),
            Err(PredictError::Scoring(_))
        ));

        let pipeline =
            ScoringPipeline::new(fitted_artifacts(Box::new(Fixed(f64::NAN))), 0.5, None).unwrap();
        assert!(pipeline.predict(&full_record()).is_err());
    }

    #[test]
    fn test_unusable_order_is_fatal() {
        let mut artifacts = fitted_artifacts(Box::new(Fixed(0.1)));
        artifacts.order = TrainedOrder::new(vec!["embedding_0".to_string()]).unwrap();

        let result = ScoringPipeline::new(artifacts, 0.5, None);
        assert!(matches!(result, Err(ArtifactError::Inconsistent(_))));
    }

    #[test]
    fn test_batch_prediction() {
        let pipeline = fitted_pipeline();
        let results = pipeline
            .predict_batch(&json!([full_record(), "not a record", {}]))
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PredictError::InvalidInput(_))));
        assert!(results[2].is_ok());

        assert!(pipeline.predict_batch(&full_record()).is_err());
    }

    #[test]
    fn test_summary() {
        let pipeline = fitted_pipeline();
        let summary = pipeline.summary();

        assert_eq!(summary.classifier, "fixed");
        assert_eq!(summary.encoding, EncodingStrategy::Fitted);
        assert_eq!(summary.raw_features, 19);
        assert_eq!(summary.usable_columns, summary.trained_columns);
        assert_eq!(summary.threshold_source, ThresholdSource::Default);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["threshold_source"], "default");
        assert_eq!(json["encoding"], "fitted");
    }

    #[test]
    fn test_pipeline_is_shareable_across_threads() {
        let pipeline = std::sync::Arc::new(fitted_pipeline());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || pipeline.predict(&full_record()).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().probability, 0.3);
        }
    }
}
