//! Raw transaction records as received from callers

use crate::error::PredictError;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A single scalar field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

static NULL: FieldValue = FieldValue::Null;

impl FieldValue {
    /// Numeric reading of the value, if it has one.
    ///
    /// Booleans read as 1/0, text is parsed as a float. Non-finite results are
    /// treated as non-numeric.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            FieldValue::Null => return None,
            FieldValue::Bool(b) => return Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    /// Numeric reading, or the neutral fill when the value is missing or not numeric.
    pub fn to_number_or_zero(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    /// Reading for boolean flag columns: {0,1} for native booleans and
    /// "true"/"false" text, numeric pass-through otherwise.
    pub fn to_flag(&self) -> f64 {
        match self {
            FieldValue::Text(s) if s.trim().eq_ignore_ascii_case("true") => 1.0,
            FieldValue::Text(s) if s.trim().eq_ignore_ascii_case("false") => 0.0,
            other => other.to_number_or_zero(),
        }
    }

    /// Key used to match the value against a fitted encoder's known categories.
    ///
    /// Integral numbers drop their fractional part (`11.0` -> `"11"`), booleans
    /// render as `True`/`False`. Null has no key.
    pub fn category_key(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::Bool(true) => Some(Cow::Borrowed("True")),
            FieldValue::Bool(false) => Some(Cow::Borrowed("False")),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(Cow::Owned(format!("{}", *n as i64)))
            }
            FieldValue::Number(n) => Some(Cow::Owned(n.to_string())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub(crate) fn from_json(name: &str, value: &Value) -> Result<Self, PredictError> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => Ok(n.as_f64().map_or(FieldValue::Null, FieldValue::Number)),
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(PredictError::InvalidInput(format!(
                "field `{}` must be a scalar value",
                name
            ))),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Working copy of one transaction: field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON payload.
    ///
    /// The payload must be a single flat object; arrays, scalars and nested
    /// values are rejected before any transform runs.
    pub fn from_json(payload: &Value) -> Result<Self, PredictError> {
        let object = match payload {
            Value::Object(map) => map,
            Value::Array(_) => {
                return Err(PredictError::InvalidInput(
                    "expected a JSON object for a single prediction, got an array".to_string(),
                ))
            }
            other => {
                return Err(PredictError::InvalidInput(format!(
                    "expected a JSON object for a single prediction, got {}",
                    json_type_name(other)
                )))
            }
        };

        let mut fields = BTreeMap::new();
        for (name, value) in object {
            fields.insert(name.clone(), FieldValue::from_json(name, value)?);
        }
        Ok(Self { fields })
    }

    /// Value of a field; absent fields read as null.
    pub fn get(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&NULL)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
