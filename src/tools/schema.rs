//! Typed tool argument schemas
//!
//! A tool declares its arguments as an [`ArgSchema`]. The registry renders
//! the schema as JSON Schema for the model and validates raw arguments
//! against it before the tool runs, so a tool only ever sees [`ToolArgs`]
//! that passed validation.

use serde_json::{Map, Value, json};

use crate::{Error, Result};

/// Type and constraints of one argument
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Number { min: Option<f64>, max: Option<f64> },
    Integer { min: Option<i64>, max: Option<i64> },
    Boolean,
    /// String restricted to a fixed set of values
    Enum(Vec<&'static str>),
}

/// One declared argument
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

/// Argument schema for a tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgSchema {
    fields: Vec<FieldSpec>,
}

impl ArgSchema {
    /// Schema with no arguments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required argument
    #[must_use]
    pub fn required(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
            description,
        });
        self
    }

    /// Add an optional argument
    #[must_use]
    pub fn optional(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
            description,
        });
        self
    }

    /// Declared fields in order
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Render as a JSON Schema object
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = match &field.kind {
                FieldKind::String => json!({ "type": "string" }),
                FieldKind::Number { min, max } => {
                    let mut p = json!({ "type": "number" });
                    if let Some(min) = min {
                        p["minimum"] = json!(min);
                    }
                    if let Some(max) = max {
                        p["maximum"] = json!(max);
                    }
                    p
                }
                FieldKind::Integer { min, max } => {
                    let mut p = json!({ "type": "integer" });
                    if let Some(min) = min {
                        p["minimum"] = json!(min);
                    }
                    if let Some(max) = max {
                        p["maximum"] = json!(max);
                    }
                    p
                }
                FieldKind::Boolean => json!({ "type": "boolean" }),
                FieldKind::Enum(values) => json!({ "type": "string", "enum": values }),
            };
            prop["description"] = json!(field.description);
            properties.insert(field.name.to_string(), prop);

            if field.required {
                required.push(field.name);
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check raw arguments against the schema
    ///
    /// Undeclared extra fields are dropped. A `null` argument value is
    /// treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArguments` naming the first violation
    pub fn validate(&self, tool: &str, raw: &Value) -> Result<ToolArgs> {
        let invalid = |reason: String| Error::InvalidArguments {
            tool: tool.to_string(),
            reason,
        };

        let empty = Map::new();
        let obj = match raw {
            Value::Object(obj) => obj,
            Value::Null => &empty,
            other => {
                return Err(invalid(format!(
                    "expected an object, got {}",
                    json_type_name(other)
                )));
            }
        };

        let mut accepted = Map::new();
        for field in &self.fields {
            match obj.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(invalid(format!("missing required field '{}'", field.name)));
                    }
                }
                Some(value) => {
                    check_field(field, value).map_err(invalid)?;
                    accepted.insert(field.name.to_string(), value.clone());
                }
            }
        }

        Ok(ToolArgs(accepted))
    }
}

fn check_field(field: &FieldSpec, value: &Value) -> std::result::Result<(), String> {
    let mismatch = |expected: &str| {
        format!(
            "field '{}' expected {expected}, got {}",
            field.name,
            json_type_name(value)
        )
    };

    match &field.kind {
        FieldKind::String => {
            value.as_str().ok_or_else(|| mismatch("string"))?;
        }
        FieldKind::Boolean => {
            value.as_bool().ok_or_else(|| mismatch("boolean"))?;
        }
        FieldKind::Number { min, max } => {
            let n = value.as_f64().ok_or_else(|| mismatch("number"))?;
            if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                return Err(format!(
                    "field '{}' value {n} is outside {}..={}",
                    field.name,
                    min.map_or_else(|| "-inf".to_string(), |m| m.to_string()),
                    max.map_or_else(|| "inf".to_string(), |m| m.to_string()),
                ));
            }
        }
        FieldKind::Integer { min, max } => {
            let n = value.as_i64().ok_or_else(|| mismatch("integer"))?;
            if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                return Err(format!("field '{}' value {n} is out of range", field.name));
            }
        }
        FieldKind::Enum(values) => {
            let s = value.as_str().ok_or_else(|| mismatch("string"))?;
            if !values.contains(&s) {
                return Err(format!(
                    "field '{}' must be one of [{}], got '{s}'",
                    field.name,
                    values.join(", ")
                ));
            }
        }
    }

    Ok(())
}

/// Get a human-readable name for a JSON value's type
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arguments that passed schema validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    /// Get a string argument
    ///
    /// # Errors
    ///
    /// Returns `Error::Tool` if the argument is absent
    pub fn str(&self, name: &str) -> Result<&str> {
        self.opt_str(name)
            .ok_or_else(|| Error::Tool(format!("missing argument '{name}'")))
    }

    /// Get an optional string argument
    #[must_use]
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Get a number argument
    ///
    /// # Errors
    ///
    /// Returns `Error::Tool` if the argument is absent
    pub fn f64(&self, name: &str) -> Result<f64> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::Tool(format!("missing argument '{name}'")))
    }

    /// Get an optional integer argument
    #[must_use]
    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Get an optional boolean argument
    #[must_use]
    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Raw validated arguments
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}
