//! Object-query response envelope.
//!
//! Result rows are reshaped into the record layout used by remote
//! object-query APIs: an `attributes` block naming the object type and a
//! per-record locator, followed by every selected column as a flat field.

use base64::Engine as _;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wrapper returned for every executed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub total_size: usize,
    pub done: bool,
    pub records: Vec<RecordView>,
}

impl ResponseEnvelope {
    pub fn new(records: Vec<RecordView>) -> Self {
        Self {
            total_size: records.len(),
            done: true,
            records,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttributes {
    #[serde(rename = "type")]
    pub object_type: String,
    pub url: String,
}

/// One result row. Fields keep the column order of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView {
    pub attributes: RecordAttributes,
    fields: Vec<(String, Value)>,
}

impl RecordView {
    pub fn new(attributes: RecordAttributes) -> Self {
        Self {
            attributes,
            fields: Vec::new(),
        }
    }

    /// Append a field. A repeated name keeps its first position and takes
    /// the new value.
    pub fn push_field(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for RecordView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("attributes", &self.attributes)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RecordView {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordViewVisitor)
    }
}

/// Reads fields in document order so a round trip keeps column order.
struct RecordViewVisitor;

impl<'de> Visitor<'de> for RecordViewVisitor {
    type Value = RecordView;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a record with an attributes block")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RecordView, A::Error> {
        let mut attributes: Option<RecordAttributes> = None;
        let mut fields: Vec<(String, Value)> = Vec::new();
        while let Some(name) = access.next_key::<String>()? {
            if name == "attributes" {
                if attributes.is_some() {
                    return Err(de::Error::duplicate_field("attributes"));
                }
                attributes = Some(access.next_value()?);
            } else {
                fields.push((name, access.next_value()?));
            }
        }

        let attributes = attributes.ok_or_else(|| de::Error::missing_field("attributes"))?;
        let mut view = RecordView::new(attributes);
        for (name, value) in fields {
            view.push_field(name, value);
        }
        Ok(view)
    }
}

/// Builds record locators of the form `{base}/{object_type}/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    base: String,
    object_type: String,
}

impl Locator {
    pub fn new(base: &str, object_type: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            object_type: object_type.to_string(),
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn url_for(&self, id: &str) -> String {
        format!("{}/{}/{}", self.base, self.object_type, id)
    }

    /// Attributes for a row whose first column holds `first`.
    pub fn attributes_for(&self, first: &Value) -> RecordAttributes {
        RecordAttributes {
            object_type: self.object_type.clone(),
            url: self.url_for(&locator_segment(first)),
        }
    }
}

/// Render the first column of a row as a locator segment. The first column
/// is assumed to be the primary key, whatever the query actually selected.
fn locator_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Convert an engine value without applying any schema typing.
pub fn json_value(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::Null,
        libsql::Value::Integer(i) => Value::from(i),
        libsql::Value::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        libsql::Value::Text(s) => Value::String(s),
        libsql::Value::Blob(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}
