// ========================================================================================
//                          Feature Record & Column Alignment
// ========================================================================================
//
// The model consumes rows positionally. A row whose columns are misnamed or out of
// order still produces a prediction, just a wrong one, so every row handed to the
// predictor is built here and nowhere else.

use ahash::{AHashMap, AHashSet};
use ndarray::{Array1, ArrayView1};
use std::fmt;

/// A single patient's features before alignment, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    entries: Vec<(String, f64)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a feature, replacing any earlier value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut record = FeatureRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// The ordered column list a trained model expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFeatureSchema {
    columns: Vec<String>,
}

impl ModelFeatureSchema {
    /// Accepts a non-empty list of distinct names. Anything else cannot be
    /// aligned against unambiguously.
    pub fn new(columns: Vec<String>) -> Result<Self, String> {
        if columns.is_empty() {
            return Err("feature list is empty".to_string());
        }
        let mut seen = AHashSet::with_capacity(columns.len());
        for name in &columns {
            if name.is_empty() {
                return Err("feature list contains an empty name".to_string());
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("feature '{name}' is listed more than once"));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A record reshaped to a schema: `values[i]` belongs to `columns[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    columns: Vec<String>,
    values: Array1<f64>,
}

impl AlignedRow {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.values[idx])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// What alignment had to do to make the record fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    /// Schema columns missing from the record, filled with 0, in schema order.
    pub filled: Vec<String>,
    /// Record columns unknown to the schema, in record order.
    pub dropped: Vec<String>,
}

impl AlignmentReport {
    pub fn is_exact(&self) -> bool {
        self.filled.is_empty() && self.dropped.is_empty()
    }
}

impl fmt::Display for AlignmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} column(s) zero-filled, {} column(s) dropped",
            self.filled.len(),
            self.dropped.len()
        )
    }
}

/// Aligns `record` to `schema`: missing columns become 0, unknown columns are
/// discarded, and the result follows the schema's order exactly.
pub fn align(record: &FeatureRecord, schema: &ModelFeatureSchema) -> AlignedRow {
    align_with_report(record, schema).0
}

/// `align`, also reporting which columns were zero-filled or dropped.
pub fn align_with_report(
    record: &FeatureRecord,
    schema: &ModelFeatureSchema,
) -> (AlignedRow, AlignmentReport) {
    let lookup: AHashMap<&str, f64> = record.iter().collect();
    let mut report = AlignmentReport::default();

    let values: Array1<f64> = schema
        .columns()
        .iter()
        .map(|name| match lookup.get(name.as_str()) {
            Some(&value) => value,
            None => {
                report.filled.push(name.clone());
                0.0
            }
        })
        .collect();

    let known: AHashSet<&str> = schema.columns().iter().map(String::as_str).collect();
    report.dropped = record
        .iter()
        .filter(|(name, _)| !known.contains(name))
        .map(|(name, _)| name.to_string())
        .collect();

    let row = AlignedRow {
        columns: schema.columns().to_vec(),
        values,
    };
    (row, report)
}
