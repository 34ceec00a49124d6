//! Scoring decision

use serde::{Deserialize, Serialize};

/// Outcome of scoring one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Probability of the positive (fraud) class, in [0, 1]
    pub probability: f64,
    /// 1 = fraud, 0 = legitimate
    pub label: u8,
    /// Threshold the label was decided with
    pub threshold: f64,
}

impl Decision {
    pub fn is_fraud(&self) -> bool {
        self.label == 1
    }
}
