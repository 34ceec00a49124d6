//! Feature schema and trained column order.
//!
//! The schema names the raw fields the pipeline understands and splits them
//! into categorical, numeric and boolean groups. The trained column order is
//! the exact post-encoding column sequence the classifier was fit against.

use crate::error::ArtifactError;
use crate::types::record::{FieldValue, RawRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw feature groups, in the order the transforms consume them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub categorical: Vec<String>,
    pub numeric: Vec<String>,
    pub boolean: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting a field that appears in more than one group.
    pub fn new(
        categorical: Vec<String>,
        numeric: Vec<String>,
        boolean: Vec<String>,
    ) -> Result<Self, ArtifactError> {
        let schema = Self {
            categorical,
            numeric,
            boolean,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// The 19-field card transaction schema.
    pub fn transaction() -> Self {
        Self {
            categorical: to_strings(&[
                "Transaction_Type",
                "Device_Type",
                "Location",
                "Merchant_Category",
                "Card_Type",
                "Authentication_Method",
                "Hour",
                "Month",
                "Year",
            ]),
            numeric: to_strings(&[
                "Transaction_Amount",
                "Account_Balance",
                "Daily_Transaction_Count",
                "Avg_Transaction_Amount_7d",
                "Failed_Transaction_Count_7d",
                "Card_Age",
                "Transaction_Distance",
            ]),
            boolean: to_strings(&["IP_Address_Flag", "Is_Weekend", "Previous_Fraudulent_Activity"]),
        }
    }

    /// Check that the three groups are disjoint and free of duplicates.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let mut seen = HashSet::new();
        for name in self.raw_features() {
            if !seen.insert(name) {
                return Err(ArtifactError::Invalid(format!(
                    "feature `{}` is listed more than once in the schema",
                    name
                )));
            }
        }
        if seen.is_empty() {
            return Err(ArtifactError::Invalid("feature schema is empty".to_string()));
        }
        Ok(())
    }

    /// Categorical, then numeric, then boolean feature names.
    pub fn raw_features(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .chain(&self.numeric)
            .chain(&self.boolean)
            .map(String::as_str)
    }

    pub fn raw_feature_count(&self) -> usize {
        self.categorical.len() + self.numeric.len() + self.boolean.len()
    }

    /// Insert a null placeholder for every recognized field the record lacks.
    ///
    /// Returns the number of fields filled.
    pub fn fill_missing(&self, record: &mut RawRecord) -> usize {
        let mut filled = 0;
        for name in self.raw_features() {
            if !record.contains(name) {
                record.insert(name, FieldValue::Null);
                filled += 1;
            }
        }
        filled
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::transaction()
    }
}

/// Final column sequence expected by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct TrainedOrder(Vec<String>);

impl TryFrom<Vec<String>> for TrainedOrder {
    type Error = ArtifactError;

    fn try_from(columns: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl TrainedOrder {
    pub fn new(columns: Vec<String>) -> Result<Self, ArtifactError> {
        if columns.is_empty() {
            return Err(ArtifactError::Invalid(
                "trained column order is empty".to_string(),
            ));
        }
        Ok(Self(columns))
    }

    /// Column order of classifiers trained on label-encoded transactions,
    /// one column per raw field.
    pub fn transaction_label_encoded() -> Self {
        Self(to_strings(&[
            "Transaction_Amount",
            "Transaction_Type",
            "Account_Balance",
            "Device_Type",
            "Location",
            "Merchant_Category",
            "IP_Address_Flag",
            "Previous_Fraudulent_Activity",
            "Daily_Transaction_Count",
            "Avg_Transaction_Amount_7d",
            "Failed_Transaction_Count_7d",
            "Card_Type",
            "Card_Age",
            "Transaction_Distance",
            "Authentication_Method",
            "Is_Weekend",
            "Hour",
            "Month",
            "Year",
        ]))
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
