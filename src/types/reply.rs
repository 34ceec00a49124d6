//! Wire replies sent back to callers of the scoring service

use crate::error::PredictError;
use crate::types::decision::Decision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reply to a successful single-record request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReply {
    /// Unique request identifier
    pub request_id: String,

    /// Binary decision (1 = fraud)
    pub prediction: u8,

    /// Fraud probability rounded to 4 decimals
    pub fraud_probability: f64,

    /// Threshold the decision was made with
    pub threshold_used: f64,

    /// Scoring timestamp
    pub scored_at: DateTime<Utc>,
}

impl ScoreReply {
    pub fn new(request_id: String, decision: &Decision) -> Self {
        Self {
            request_id,
            prediction: decision.label,
            fraud_probability: round4(decision.probability),
            threshold_used: decision.threshold,
            scored_at: Utc::now(),
        }
    }
}

/// Reply to a failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub request_id: String,
    pub error: String,
    pub kind: String,
}

impl ErrorReply {
    pub fn new(request_id: String, error: &PredictError) -> Self {
        Self {
            request_id,
            error: error.to_string(),
            kind: error.kind().to_string(),
        }
    }
}

/// One entry of a batch reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Scored {
        index: usize,
        prediction: u8,
        fraud_probability: f64,
    },
    Failed {
        index: usize,
        error: String,
        kind: String,
    },
}

/// Reply to a batch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReply {
    pub request_id: String,
    pub threshold_used: f64,
    pub results: Vec<BatchItem>,
}

impl BatchReply {
    pub fn new(
        request_id: String,
        threshold_used: f64,
        results: &[Result<Decision, PredictError>],
    ) -> Self {
        let results = results
            .iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(decision) => BatchItem::Scored {
                    index,
                    prediction: decision.label,
                    fraud_probability: round4(decision.probability),
                },
                Err(e) => BatchItem::Failed {
                    index,
                    error: e.to_string(),
                    kind: e.kind().to_string(),
                },
            })
            .collect();

        Self {
            request_id,
            threshold_used,
            results,
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
