//! Parameter schemas and argument validation
//!
//! Tool arguments arrive from the model as loose JSON. Before anything is
//! dispatched they are checked against the tool's [`ParameterSchema`], which
//! either yields a [`ToolArguments`] value or the full list of problems.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    /// A filesystem or drive path. Sent as a string; surrounding whitespace
    /// and quote characters are stripped before dispatch.
    Path,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// JSON-Schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String | ParamType::Path => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String | ParamType::Path => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// Name of the JSON type of `value`, for diagnostics.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// Ordered parameter list of a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    params: Vec<ParamSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter.
    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.with_param(name, param_type, description, true)
    }

    /// Add an optional parameter.
    pub fn optional(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.with_param(name, param_type, description, false)
    }

    fn with_param(
        mut self,
        name: &str,
        param_type: ParamType,
        description: &str,
        required: bool,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render as a JSON-Schema object, the form the model expects.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.param_type.as_str(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check `args` against the schema.
    ///
    /// Every problem is collected rather than stopping at the first one, so
    /// the model sees the whole picture in a single error. `null` values are
    /// treated as absent.
    pub fn validate(&self, args: &Value) -> Result<ToolArguments, Vec<ArgumentIssue>> {
        let empty = Map::new();
        let object = match args {
            Value::Object(map) => map,
            // Models commonly send nothing at all for parameterless tools
            Value::Null => &empty,
            other => return Err(vec![ArgumentIssue::NotAnObject(json_type_name(other))]),
        };

        let mut issues = Vec::new();
        let mut validated = Map::new();

        for param in &self.params {
            match object.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        issues.push(ArgumentIssue::Missing(param.name.clone()));
                    }
                }
                Some(value) if !param.param_type.accepts(value) => {
                    issues.push(ArgumentIssue::TypeMismatch {
                        name: param.name.clone(),
                        expected: param.param_type.as_str(),
                        found: json_type_name(value),
                    });
                }
                Some(value) => {
                    validated.insert(param.name.clone(), normalize(param.param_type, value));
                }
            }
        }

        for key in object.keys() {
            if self.get(key).is_none() {
                issues.push(ArgumentIssue::Unexpected(key.clone()));
            }
        }

        if issues.is_empty() {
            Ok(ToolArguments(validated))
        } else {
            Err(issues)
        }
    }
}

impl Serialize for ParameterSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}

fn normalize(param_type: ParamType, value: &Value) -> Value {
    match (param_type, value) {
        (ParamType::Path, Value::String(s)) => Value::String(
            s.trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string(),
        ),
        _ => value.clone(),
    }
}

/// One reason an argument object failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentIssue {
    #[error("arguments must be an object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing required field '{0}'")]
    Missing(String),
    #[error("field '{name}' must be {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unexpected field '{0}'")]
    Unexpected(String),
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
