//! Categorical encoding into the trained numeric space.
//!
//! Two strategies are supported, chosen once per deployment:
//!
//! * [`OneHotEncoder`]: a fitted one-hot encoder. Each categorical feature
//!   expands into one column per known category, named `{feature}_{category}`.
//!   Unknown and missing values never fail; they follow the encoder's unknown
//!   policy.
//! * [`LookupTableEncoder`]: static per-feature lookup tables producing a single
//!   integer code per feature. Unknown text maps to code 0.

use crate::error::ArtifactError;
use crate::features::schema::FeatureSchema;
use crate::types::record::{FieldValue, RawRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Code assigned to text the lookup tables do not know.
pub const DEFAULT_CODE: i64 = 0;

/// Encoding strategy of a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingStrategy {
    /// Fitted one-hot encoder artifact
    #[default]
    Fitted,
    /// Static lookup tables
    Lookup,
}

/// What the one-hot encoder does with a category it was not fitted on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// All-zero block for the feature
    #[default]
    Ignore,
    /// Encode as the named fallback category when the feature knows it
    Bucket(String),
}

/// Known categories of one feature, as stored in the artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub feature: String,
    pub categories: Vec<Value>,
}

/// Fitted one-hot encoder artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotSpec {
    pub features: Vec<CategorySpec>,
    #[serde(default)]
    pub handle_unknown: UnknownPolicy,
}

/// Lookup table artifact: feature -> text value -> code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupSpec {
    pub tables: BTreeMap<String, BTreeMap<String, i64>>,
}

impl LookupSpec {
    /// Tables used by label-encoded transaction classifiers.
    pub fn transaction() -> Self {
        let table = |entries: &[(&str, i64)]| {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };

        let mut tables = BTreeMap::new();
        tables.insert(
            "Transaction_Type".to_string(),
            table(&[
                ("Debit", 0),
                ("Credit", 1),
                ("POS", 2),
                ("ATM Withdrawal", 3),
                ("Bank Transfer", 4),
            ]),
        );
        tables.insert(
            "Device_Type".to_string(),
            table(&[("Mobile", 0), ("Tablet", 1), ("Web", 2), ("Laptop", 3)]),
        );
        tables.insert(
            "Merchant_Category".to_string(),
            table(&[
                ("Electronics", 0),
                ("Travel", 1),
                ("Clothing", 2),
                ("Restaurants", 3),
                ("Grocery", 4),
                ("Gas Station", 5),
            ]),
        );
        tables.insert(
            "Card_Type".to_string(),
            table(&[("Visa", 0), ("MasterCard", 1), ("Amex", 2), ("Discover", 3)]),
        );
        tables.insert(
            "Authentication_Method".to_string(),
            table(&[
                ("PIN", 0),
                ("OTP", 1),
                ("Password", 2),
                ("Biometric", 3),
                ("None", 4),
            ]),
        );
        tables.insert(
            "Location".to_string(),
            table(&[
                ("Nigeria", 123456),
                ("USA", 234567),
                ("UK", 345678),
                ("France", 456789),
                ("Germany", 567890),
                ("Canada", 678901),
                ("Unknown", 0),
            ]),
        );

        Self { tables }
    }
}

/// Encoder artifact of either strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum EncoderSpec {
    OneHot(OneHotSpec),
    Lookup(LookupSpec),
}

/// Encoded categorical columns for one record, borrowing names from the encoder.
pub type EncodedColumns<'a> = Vec<(&'a str, f64)>;

/// One feature's slice of the one-hot output
#[derive(Debug)]
struct FeatureBlock {
    feature: String,
    index: HashMap<String, usize>,
    fallback: Option<usize>,
}

/// Fitted one-hot encoder
#[derive(Debug)]
pub struct OneHotEncoder {
    blocks: Vec<FeatureBlock>,
    columns: Vec<String>,
    policy: UnknownPolicy,
}

impl OneHotEncoder {
    /// Build the encoder, checking it was fitted on the schema's categorical features.
    pub fn from_spec(spec: OneHotSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        let fitted: Vec<&str> = spec.features.iter().map(|f| f.feature.as_str()).collect();
        if fitted != schema.categorical.iter().map(String::as_str).collect::<Vec<_>>() {
            return Err(ArtifactError::Inconsistent(format!(
                "encoder was fitted on {:?} but the schema's categorical features are {:?}",
                fitted, schema.categorical
            )));
        }

        let mut blocks = Vec::with_capacity(spec.features.len());
        let mut columns = Vec::new();

        for feature in spec.features {
            let mut index = HashMap::with_capacity(feature.categories.len());
            let offset = columns.len();

            for (i, category) in feature.categories.iter().enumerate() {
                let key = category_key_of(&feature.feature, category)?;
                if index.insert(key.clone(), offset + i).is_some() {
                    return Err(ArtifactError::Invalid(format!(
                        "category `{}` listed twice for feature `{}`",
                        key, feature.feature
                    )));
                }
                columns.push(format!("{}_{}", feature.feature, category_label(category, &key)));
            }

            let fallback = match &spec.handle_unknown {
                UnknownPolicy::Ignore => None,
                UnknownPolicy::Bucket(bucket) => {
                    let slot = index.get(bucket).copied();
                    if slot.is_none() {
                        warn!(
                            feature = %feature.feature,
                            bucket = %bucket,
                            "Unknown bucket is not a fitted category, unknown values encode as zeros"
                        );
                    }
                    slot
                }
            };

            blocks.push(FeatureBlock {
                feature: feature.feature,
                index,
                fallback,
            });
        }

        Ok(Self {
            blocks,
            columns,
            policy: spec.handle_unknown,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn policy(&self) -> &UnknownPolicy {
        &self.policy
    }

    /// One-hot encode the record's categorical fields.
    pub fn encode(&self, record: &RawRecord) -> EncodedColumns<'_> {
        let mut values = vec![0.0; self.columns.len()];

        for block in &self.blocks {
            let slot = record
                .get(&block.feature)
                .category_key()
                .and_then(|key| block.index.get(&*key).copied())
                .or(block.fallback);

            if let Some(slot) = slot {
                values[slot] = 1.0;
            }
        }

        self.columns
            .iter()
            .map(String::as_str)
            .zip(values)
            .collect()
    }

    /// Number of output columns produced for a feature.
    pub fn width_of(&self, feature: &str) -> usize {
        self.blocks
            .iter()
            .find(|b| b.feature == feature)
            .map_or(0, |b| b.index.len())
    }
}

/// Static lookup-table encoder
#[derive(Debug)]
pub struct LookupTableEncoder {
    features: Vec<String>,
    tables: HashMap<String, HashMap<String, i64>>,
}

impl LookupTableEncoder {
    pub fn from_spec(spec: LookupSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        for feature in spec.tables.keys() {
            if !schema.categorical.contains(feature) {
                return Err(ArtifactError::Inconsistent(format!(
                    "lookup table for `{}` which is not a categorical feature",
                    feature
                )));
            }
        }

        let tables = spec
            .tables
            .into_iter()
            .map(|(feature, table)| (feature, table.into_iter().collect()))
            .collect();

        Ok(Self {
            features: schema.categorical.clone(),
            tables,
        })
    }

    /// Output column names: one per categorical feature.
    pub fn columns(&self) -> &[String] {
        &self.features
    }

    pub fn encode(&self, record: &RawRecord) -> EncodedColumns<'_> {
        self.features
            .iter()
            .map(|feature| (feature.as_str(), self.code(feature, record.get(feature))))
            .collect()
    }

    /// Code for a single value.
    ///
    /// Text is looked up (unknown text is [`DEFAULT_CODE`]); numbers are taken as
    /// already-encoded codes. Features without a table are read numerically.
    pub fn code(&self, feature: &str, value: &FieldValue) -> f64 {
        match (self.tables.get(feature), value) {
            (Some(table), FieldValue::Text(text)) => {
                table.get(text).copied().unwrap_or(DEFAULT_CODE) as f64
            }
            (Some(_), FieldValue::Null) => DEFAULT_CODE as f64,
            (_, other) => other.to_number_or_zero(),
        }
    }
}

/// Categorical encoder fixed for the lifetime of the process
#[derive(Debug)]
pub enum Encoder {
    OneHot(OneHotEncoder),
    Lookup(LookupTableEncoder),
}

impl Encoder {
    pub fn from_spec(spec: EncoderSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        match spec {
            EncoderSpec::OneHot(spec) => Ok(Encoder::OneHot(OneHotEncoder::from_spec(spec, schema)?)),
            EncoderSpec::Lookup(spec) => Ok(Encoder::Lookup(LookupTableEncoder::from_spec(
                spec, schema,
            )?)),
        }
    }

    pub fn strategy(&self) -> EncodingStrategy {
        match self {
            Encoder::OneHot(_) => EncodingStrategy::Fitted,
            Encoder::Lookup(_) => EncodingStrategy::Lookup,
        }
    }

    /// Every column the encoder can produce, in output order.
    pub fn columns(&self) -> &[String] {
        match self {
            Encoder::OneHot(encoder) => encoder.columns(),
            Encoder::Lookup(encoder) => encoder.columns(),
        }
    }

    pub fn encode(&self, record: &RawRecord) -> EncodedColumns<'_> {
        match self {
            Encoder::OneHot(encoder) => encoder.encode(record),
            Encoder::Lookup(encoder) => encoder.encode(record),
        }
    }
}

fn category_key_of(feature: &str, category: &Value) -> Result<String, ArtifactError> {
    let value = FieldValue::from_json(feature, category)
        .map_err(|e| ArtifactError::Invalid(e.to_string()))?;
    value.category_key().map(|k| k.into_owned()).ok_or_else(|| {
        ArtifactError::Invalid(format!("null category for feature `{}`", feature))
    })
}

/// Column suffix for a fitted category, printed the way the training frame
/// named it: float categories keep their fractional part (`11.0`).
fn category_label(category: &Value, key: &str) -> String {
    match category {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map_or_else(|| key.to_string(), |f| format!("{:?}", f)),
        _ => key.to_string(),
    }
}
