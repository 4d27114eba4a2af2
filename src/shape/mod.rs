//! Shape translation
//!
//! Walks a raw B2 object against a declarative keep-shape schema and
//! produces the block-structured encoding the provider schema expects:
//!
//! - keys are converted from camelCase to snake_case
//! - keys the schema does not declare are dropped
//! - nested objects are wrapped in lists (`{...}` -> `[{...}]`, empty -> `[]`)
//! - every declared key is present in the output, backfilled when absent

pub mod schemas;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{BridgeError, Result};
use crate::keys::to_snake;

/// How a single declared field is kept
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Keep the value as-is; absent values become `null`
    Scalar,
    /// Keep the value as-is; absent or `null` values become the default
    Default(Value),
    /// The value is an object or a list of objects shaped by the inner schema
    Nested(KeepShape),
}

/// Declarative allow-list of fields that survive shaping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeepShape {
    fields: Vec<(&'static str, Field)>,
}

impl KeepShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a scalar field
    pub fn scalar(self, name: &'static str) -> Self {
        self.field(name, Field::Scalar)
    }

    /// Declare a scalar field with a backfill value
    pub fn with_default(self, name: &'static str, value: Value) -> Self {
        self.field(name, Field::Default(value))
    }

    /// Declare a nested field
    pub fn nested(self, name: &'static str, inner: KeepShape) -> Self {
        self.field(name, Field::Nested(inner))
    }

    fn field(mut self, name: &'static str, field: Field) -> Self {
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.push((name, field));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, field)| field)
    }

    /// Declared field names, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    fn iter(&self) -> impl Iterator<Item = &(&'static str, Field)> {
        self.fields.iter()
    }
}

/// Projection of a domain entity onto a map keyed by native (camelCase) names
pub trait AsMap {
    fn as_map(&self) -> Result<Map<String, Value>>;
}

/// Serialize any serde value into a JSON object map
pub fn to_map<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(BridgeError::Shape(format!(
            "expected an object projection, got {}",
            kind_of(&other)
        ))),
    }
}

/// Shape a raw JSON object against `schema`
pub fn shape(raw: &Value, schema: &KeepShape) -> Result<Map<String, Value>> {
    match raw {
        Value::Object(map) => shape_map(map, schema),
        other => Err(BridgeError::Shape(format!(
            "expected an object to shape, got {}",
            kind_of(other)
        ))),
    }
}

/// Project an entity through [`AsMap`] and shape the result
pub fn shape_entity<E: AsMap + ?Sized>(
    entity: &E,
    schema: &KeepShape,
) -> Result<Map<String, Value>> {
    shape_map(&entity.as_map()?, schema)
}

fn shape_map(raw: &Map<String, Value>, schema: &KeepShape) -> Result<Map<String, Value>> {
    let mut result = Map::new();

    for (key, value) in raw {
        let key = to_snake(key);
        let shaped = match schema.get(&key) {
            None => continue,
            Some(Field::Nested(inner)) => shape_nested(&key, value, inner)?,
            Some(Field::Default(default)) if value.is_null() => default.clone(),
            Some(_) => value.clone(),
        };
        result.insert(key, shaped);
    }

    for (key, field) in schema.iter() {
        if result.contains_key(*key) {
            continue;
        }
        let backfill = match field {
            Field::Scalar => Value::Null,
            Field::Default(default) => default.clone(),
            Field::Nested(_) => Value::Array(Vec::new()),
        };
        result.insert(key.to_string(), backfill);
    }

    Ok(result)
}

fn shape_nested(key: &str, value: &Value, inner: &KeepShape) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Array(Vec::new())),
        Value::Object(map) if map.is_empty() => Ok(Value::Array(Vec::new())),
        Value::Object(map) => Ok(Value::Array(vec![Value::Object(shape_map(map, inner)?)])),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => shape_map(map, inner).map(Value::Object),
                other => Err(BridgeError::Shape(format!(
                    "field {} holds a list with a {} element, expected objects",
                    key,
                    kind_of(other)
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Err(BridgeError::Shape(format!(
            "field {} is declared nested but holds a {}",
            key,
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
