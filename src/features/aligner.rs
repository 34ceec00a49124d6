//! Alignment of transformed column groups to the trained column order.
//!
//! Concatenates scaled numeric, boolean and encoded categorical columns, then
//! reindexes the result onto the trained order: present columns are taken,
//! absent trained columns get the neutral fill, everything else is dropped.

use crate::features::schema::TrainedOrder;
use crate::types::record::RawRecord;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Value used for trained columns nothing produced.
pub const NEUTRAL_FILL: f64 = 0.0;

/// A single row matching the trained column order exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedVector<'a> {
    columns: &'a [String],
    values: Vec<f64>,
}

impl<'a> AlignedVector<'a> {
    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named column.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Column name -> value pairs, in trained order.
    pub fn to_pairs(&self) -> Vec<(String, f64)> {
        self.columns.iter().cloned().zip(self.values.iter().copied()).collect()
    }
}

/// Boolean flags as {0,1} columns. Coercion happens here, before alignment.
pub fn boolean_subset<'a>(names: &'a [String], record: &RawRecord) -> Vec<(&'a str, f64)> {
    names
        .iter()
        .map(|name| (name.as_str(), record.get(name).to_flag()))
        .collect()
}

/// Concatenate the three column groups and reindex onto `order`.
///
/// On duplicate names the first occurrence in concatenation order wins.
pub fn align<'o>(
    scaled_numeric: &[(&str, f64)],
    boolean: &[(&str, f64)],
    encoded: &[(&str, f64)],
    order: &'o TrainedOrder,
) -> AlignedVector<'o> {
    let mut space: HashMap<&str, f64> =
        HashMap::with_capacity(scaled_numeric.len() + boolean.len() + encoded.len());
    for &(name, value) in scaled_numeric.iter().chain(boolean).chain(encoded) {
        space.entry(name).or_insert(value);
    }

    let values = order
        .iter()
        .map(|column| space.get(column).copied().unwrap_or(NEUTRAL_FILL))
        .collect();

    AlignedVector {
        columns: order.columns(),
        values,
    }
}

/// How the columns the transforms can produce line up with the trained order.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentReport {
    /// Trained columns some transform produces
    pub usable: usize,
    /// Trained columns nothing produces; always neutral-filled
    pub unproduced: Vec<String>,
    /// Produced columns the classifier does not use
    pub dropped: Vec<String>,
}

impl AlignmentReport {
    pub fn new<'p>(order: &TrainedOrder, produced: impl IntoIterator<Item = &'p str>) -> Self {
        let produced: Vec<&str> = produced.into_iter().collect();
        let produced_set: HashSet<&str> = produced.iter().copied().collect();
        let trained: HashSet<&str> = order.iter().collect();

        let unproduced: Vec<String> = order
            .iter()
            .filter(|c| !produced_set.contains(c))
            .map(str::to_string)
            .collect();
        let mut seen = HashSet::new();
        let dropped = produced
            .iter()
            .filter(|c| !trained.contains(*c) && seen.insert(**c))
            .map(|c| c.to_string())
            .collect();

        Self {
            usable: order.len() - unproduced.len(),
            unproduced,
            dropped,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.usable > 0
    }
}
