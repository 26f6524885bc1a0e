//! Field-Mapping Serializer
//!
//! Renames and transforms record fields between a source shape and a
//! compact target shape. Values equal to their field's default are left out
//! of the target shape and restored on the way back.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A flat JSON object.
pub type Record = Map<String, Value>;

/// Converts one field value; `None` drops the field.
pub type Transform = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Decides whether a value equals the field's default.
pub type Equality = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

// == Field Mapping ==
/// How one source field maps onto one target field.
#[derive(Clone)]
pub struct FieldMapping {
    source: String,
    target: String,
    serialize: Transform,
    deserialize: Transform,
    default: Value,
    equality: Option<Equality>,
}

impl FieldMapping {
    /// Identity transforms and a `null` default.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            serialize: Arc::new(|value| Some(value.clone())),
            deserialize: Arc::new(|value| Some(value.clone())),
            default: Value::Null,
            equality: None,
        }
    }

    pub fn serialize<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.serialize = Arc::new(transform);
        self
    }

    pub fn deserialize<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.deserialize = Arc::new(transform);
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(equality));
        self
    }

    fn is_default(&self, value: &Value) -> bool {
        match &self.equality {
            Some(equality) => equality(value, &self.default),
            None => *value == self.default,
        }
    }
}

impl std::fmt::Debug for FieldMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapping")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("default", &self.default)
            .finish()
    }
}

// == Field Serializer ==
#[derive(Debug, Clone)]
pub struct FieldSerializer {
    mappings: Vec<FieldMapping>,
}

impl FieldSerializer {
    /// Fails unless source and target field names are each unique, which
    /// makes the mapping a bijection between the two field sets.
    pub fn new(mappings: Vec<FieldMapping>) -> Result<Self> {
        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for mapping in &mappings {
            if !sources.insert(mapping.source.as_str()) {
                return Err(Error::InvalidConfiguration(format!(
                    "Source field '{}' is mapped more than once",
                    mapping.source
                )));
            }
            if !targets.insert(mapping.target.as_str()) {
                return Err(Error::InvalidConfiguration(format!(
                    "Target field '{}' is mapped more than once",
                    mapping.target
                )));
            }
        }
        Ok(Self { mappings })
    }

    // == Serialize ==
    /// Source shape to target shape; unmapped source fields are dropped.
    pub fn serialize(&self, records: &[Record]) -> Vec<Record> {
        records.iter().map(|record| self.serialize_one(record)).collect()
    }

    pub fn serialize_one(&self, record: &Record) -> Record {
        let mut out = Record::new();
        for mapping in &self.mappings {
            let Some(value) = record.get(&mapping.source) else {
                continue;
            };
            if mapping.is_default(value) {
                continue;
            }
            if let Some(serialized) = (mapping.serialize)(value) {
                out.insert(mapping.target.clone(), serialized);
            }
        }
        out
    }

    // == Deserialize ==
    /// Target shape to source shape; every mapped source field is present.
    pub fn deserialize(&self, records: &[Record]) -> Vec<Record> {
        records
            .iter()
            .map(|record| self.deserialize_one(record))
            .collect()
    }

    pub fn deserialize_one(&self, record: &Record) -> Record {
        let mut out = Record::new();
        for mapping in &self.mappings {
            let value = record
                .get(&mapping.target)
                .and_then(|value| (mapping.deserialize)(value))
                .unwrap_or_else(|| mapping.default.clone());
            out.insert(mapping.source.clone(), value);
        }
        out
    }
}
