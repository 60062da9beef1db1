//! Feature schema and patient records.
//!
//! A [`FeatureSchema`] fixes the ordered set of named dimensions every record
//! must supply, and which of them are severity indicators. Records arrive as
//! name -> value maps and are projected into schema order before they reach
//! the normalizer.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ScaleError, ScaleResult};

/// One patient row: an identifier plus named feature values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Identity used in error reports (CSV row number or an id column).
    pub id: String,
    /// Feature values by dimension name.
    pub values: BTreeMap<String, f64>,
}

impl FeatureRecord {
    /// Create an empty record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder: set one dimension.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Build a record from `(name, value)` pairs.
    pub fn from_pairs<I, S>(id: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Ordered feature dimensions and the severity-indicator subset.
///
/// # Example
///
/// ```
/// use severity_core::schema::{FeatureRecord, FeatureSchema};
///
/// let schema = FeatureSchema::default();
/// assert_eq!(schema.len(), 10);
/// assert_eq!(schema.severity_indices(), vec![0, 1]);
///
/// let record = schema
///     .features()
///     .iter()
///     .fold(FeatureRecord::new("r1"), |r, name| r.with_value(name.as_str(), 1.0));
/// assert_eq!(schema.project(&record).unwrap(), vec![1.0; 10]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Dimension names in vector order.
    pub features: Vec<String>,
    /// Dimensions averaged into a group's severity index.
    pub severity_indicators: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        let mut features = vec!["q1".to_string(), "q2".to_string()];
        features.extend((1..=8).map(|i| format!("w{}", i)));
        Self {
            features,
            severity_indicators: vec!["q1".to_string(), "q2".to_string()],
        }
    }
}

impl FeatureSchema {
    /// Create and validate a schema.
    ///
    /// # Errors
    ///
    /// See [`FeatureSchema::validate`].
    pub fn new<F, I>(features: F, severity_indicators: I) -> ScaleResult<Self>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let schema = Self {
            features: features.into_iter().map(Into::into).collect(),
            severity_indicators: severity_indicators.into_iter().map(Into::into).collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Check the schema is usable.
    ///
    /// # Errors
    ///
    /// Returns `ScaleError::Config` if there are no features, a duplicate
    /// feature or indicator, no indicators, or an indicator that is not a
    /// feature.
    pub fn validate(&self) -> ScaleResult<()> {
        if self.features.is_empty() {
            return Err(ScaleError::Config("schema.features must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for name in &self.features {
            if !seen.insert(name.as_str()) {
                return Err(ScaleError::Config(format!(
                    "schema.features contains duplicate '{}'",
                    name
                )));
            }
        }
        if self.severity_indicators.is_empty() {
            return Err(ScaleError::Config(
                "schema.severity_indicators must name at least one feature".into(),
            ));
        }
        let mut seen_ind = HashSet::new();
        for name in &self.severity_indicators {
            if !seen.contains(name.as_str()) {
                return Err(ScaleError::Config(format!(
                    "schema.severity_indicators: '{}' is not a feature",
                    name
                )));
            }
            if !seen_ind.insert(name.as_str()) {
                return Err(ScaleError::Config(format!(
                    "schema.severity_indicators contains duplicate '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Vector positions of the severity indicators, in indicator order.
    pub fn severity_indices(&self) -> Vec<usize> {
        self.severity_indicators
            .iter()
            .filter_map(|name| self.features.iter().position(|f| f == name))
            .collect()
    }

    /// Order `record`'s values by the schema.
    ///
    /// # Errors
    ///
    /// Returns `ScaleError::Schema` naming the record and the offending
    /// dimensions if any feature is missing, any extra dimension is present,
    /// or a value is not finite.
    pub fn project(&self, record: &FeatureRecord) -> ScaleResult<Vec<f64>> {
        let missing: Vec<&str> = self
            .features
            .iter()
            .filter(|f| !record.values.contains_key(f.as_str()))
            .map(String::as_str)
            .collect();
        let unknown: Vec<&str> = record
            .values
            .keys()
            .filter(|k| !self.features.iter().any(|f| f == *k))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() || !unknown.is_empty() {
            let mut parts = Vec::new();
            if !missing.is_empty() {
                parts.push(format!("missing dimensions [{}]", missing.join(", ")));
            }
            if !unknown.is_empty() {
                parts.push(format!("unknown dimensions [{}]", unknown.join(", ")));
            }
            return Err(ScaleError::schema(&record.id, parts.join("; ")));
        }

        let values: Vec<f64> = self.features.iter().map(|f| record.values[f.as_str()]).collect();
        self.check_values(&record.id, &values)?;
        Ok(values)
    }

    /// Check a raw vector already in schema order.
    ///
    /// # Errors
    ///
    /// Returns `ScaleError::Schema` if the length differs from the schema or
    /// a value is not finite.
    pub fn check_values(&self, record: &str, values: &[f64]) -> ScaleResult<()> {
        if values.len() != self.features.len() {
            return Err(ScaleError::schema(
                record,
                format!(
                    "expected {} dimensions, got {}",
                    self.features.len(),
                    values.len()
                ),
            ));
        }
        let bad: Vec<&str> = self
            .features
            .iter()
            .zip(values.iter())
            .filter(|(_, v)| !v.is_finite())
            .map(|(f, _)| f.as_str())
            .collect();
        if !bad.is_empty() {
            return Err(ScaleError::schema(
                record,
                format!("non-finite values in [{}]", bad.join(", ")),
            ));
        }
        Ok(())
    }
}
