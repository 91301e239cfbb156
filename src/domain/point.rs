//! Time-series point
//!
//! A [`Point`] is one output sample: measurement name, timestamp, an ordered
//! tag set and a field map. Tag and field keys are unique; adding an existing
//! key overwrites the previous value.
//!
//! Points render to InfluxDB line protocol:
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```

use super::errors::InfluxError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A value that can be stored in a point field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit floating point
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// UTF-8 string
    String(String),
    /// Boolean
    Boolean(bool),
}

impl FieldValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String view of the value, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Format this value for line protocol
    ///
    /// Floats are written as-is, integers get an `i` suffix, strings are quoted
    /// with inner quotes and backslashes escaped.
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{v}"),
            FieldValue::Integer(v) => format!("{v}i"),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            }
            FieldValue::Boolean(v) => v.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// One time-series sample
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    time: DateTime<Utc>,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Point {
    /// Create a point with no tags and no fields
    pub fn new(measurement: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            time,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Add or overwrite a tag
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add or overwrite a field
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// A point with zero tags and zero fields carries nothing and is never written
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.fields.is_empty()
    }

    /// Render the point as one line of InfluxDB line protocol
    ///
    /// Tags with empty values and non-finite floats are omitted since line
    /// protocol cannot represent them.
    ///
    /// # Errors
    ///
    /// Returns [`InfluxError::InvalidPoint`] if no field remains to be written
    /// or the timestamp is outside the nanosecond range.
    pub fn to_line_protocol(&self) -> Result<String, InfluxError> {
        let mut line = escape_measurement(&self.measurement);

        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, v)| !matches!(v, FieldValue::Float(f) if !f.is_finite()))
            .map(|(key, value)| format!("{}={}", escape_key(key), value.to_line_protocol()))
            .collect();

        if fields.is_empty() {
            return Err(InfluxError::InvalidPoint(format!(
                "measurement '{}' at {} has no writable fields",
                self.measurement, self.time
            )));
        }

        let timestamp_ns = self.time.timestamp_nanos_opt().ok_or_else(|| {
            InfluxError::InvalidPoint(format!("timestamp {} out of range", self.time))
        })?;

        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&timestamp_ns.to_string());

        Ok(line)
    }
}

/// Spaces and commas must be escaped in measurement names
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Commas, equals signs and spaces must be escaped in tag keys, tag values and field keys
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}
