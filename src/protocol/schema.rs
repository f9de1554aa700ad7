//! Structural input schemas for tools.
//!
//! A small, object-shaped subset of JSON Schema: named fields, each with a
//! primitive type and a required flag. Hosts publish it as `inputSchema`;
//! planners parse it back during discovery and reject anything outside the
//! subset.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// A schema that is not a well-formed structural description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed input schema: {reason}")]
pub struct SchemaError {
    pub reason: String,
}

impl SchemaError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ─── Field Types ─────────────────────────────────────────────────────────────

/// Primitive type of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldKind::String),
            "integer" => Some(FieldKind::Integer),
            "number" => Some(FieldKind::Number),
            "boolean" => Some(FieldKind::Boolean),
            "array" => Some(FieldKind::Array),
            "object" => Some(FieldKind::Object),
            _ => None,
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }
}

/// One named argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            description: None,
            default: None,
        }
    }

    pub fn optional(name: &str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

// ─── InputSchema ─────────────────────────────────────────────────────────────

/// The accepted argument shape of a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// A schema that accepts only an empty argument object.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(field.kind.as_str().into()));
            if let Some(ref desc) = field.description {
                prop.insert("description".into(), Value::String(desc.clone()));
            }
            if let Some(ref default) = field.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(field.name.clone(), Value::Object(prop));
        }

        let required: Vec<Value> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| Value::String(f.name.clone()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Parse a JSON Schema object, rejecting anything outside the supported subset.
    pub fn from_json_schema(value: &Value) -> Result<Self, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::new("schema is not a JSON object"))?;

        match obj.get("type").and_then(Value::as_str) {
            Some("object") => {}
            Some(other) => {
                return Err(SchemaError::new(format!(
                    "top-level type must be 'object', got '{other}'"
                )))
            }
            None => return Err(SchemaError::new("missing top-level 'type'")),
        }

        let properties = match obj.get("properties") {
            None => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(SchemaError::new("'properties' must be an object")),
        };

        let mut fields = Vec::with_capacity(properties.len());
        for (name, prop) in &properties {
            let prop = prop
                .as_object()
                .ok_or_else(|| SchemaError::new(format!("property '{name}' is not an object")))?;
            let type_name = prop
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| SchemaError::new(format!("property '{name}' has no 'type'")))?;
            let kind = FieldKind::parse(type_name).ok_or_else(|| {
                SchemaError::new(format!("property '{name}' has unsupported type '{type_name}'"))
            })?;
            let description = match prop.get("description") {
                None => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => {
                    return Err(SchemaError::new(format!(
                        "property '{name}' has a non-string description"
                    )))
                }
            };
            fields.push(FieldSpec {
                name: name.clone(),
                kind,
                required: false,
                description,
                default: prop.get("default").cloned(),
            });
        }

        match obj.get("required") {
            None => {}
            Some(Value::Array(names)) => {
                for entry in names {
                    let name = entry
                        .as_str()
                        .ok_or_else(|| SchemaError::new("'required' entries must be strings"))?;
                    let field = fields.iter_mut().find(|f| f.name == name).ok_or_else(|| {
                        SchemaError::new(format!("required field '{name}' is not a property"))
                    })?;
                    field.required = true;
                }
            }
            Some(_) => return Err(SchemaError::new("'required' must be an array")),
        }

        Ok(Self { fields })
    }

    /// Check arguments against the schema.
    ///
    /// `null` arguments are treated as an empty object; an explicit `null`
    /// on an optional field counts as absent.
    pub fn validate(&self, arguments: &Value) -> Result<(), String> {
        let empty = Map::new();
        let args = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(format!("arguments must be an object, got {}", json_type(other))),
        };

        for key in args.keys() {
            if self.get(key).is_none() {
                return Err(format!("unexpected field: '{key}'"));
            }
        }

        for field in &self.fields {
            match args.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field: '{}'", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.matches(value) => {
                    return Err(format!(
                        "field '{}' must be {}, got {}",
                        field.name,
                        field.kind.as_str(),
                        json_type(value)
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
