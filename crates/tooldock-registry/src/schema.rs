//! Declared parameter schemas and argument binding.

use crate::handler::HandlerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Semantic type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// A JSON string.
    String,
    /// A whole number.
    Integer,
    /// Any number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Accepts any JSON value.
    Any,
}

impl ParamType {
    /// The JSON-Schema `type` keyword for this parameter type.
    pub fn json_type(&self) -> Option<&'static str> {
        match self {
            ParamType::String => Some("string"),
            ParamType::Integer => Some("integer"),
            ParamType::Number => Some("number"),
            ParamType::Boolean => Some("boolean"),
            ParamType::Array => Some("array"),
            ParamType::Object => Some("object"),
            ParamType::Any => None,
        }
    }

    /// Strict check: does `value` already have this type?
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }

    /// Lax conversion of `value` into this type.
    ///
    /// Integers accept integral floats and numeric strings, numbers accept
    /// numeric strings, booleans accept `"true"`/`"false"`. Strings, arrays
    /// and objects are never converted from another type.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if self.matches(value) {
            return Some(value.clone());
        }
        match (self, value) {
            (ParamType::Integer, Value::Number(n)) => {
                let f = n.as_f64()?;
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some(Value::from(f as i64))
                } else {
                    None
                }
            }
            (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParamType::Number, Value::String(s)) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Some(Value::from(i));
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            }
            (ParamType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type().unwrap_or("any"))
    }
}

/// Name of the JSON type of `value`, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
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

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Expected JSON type.
    pub param_type: ParamType,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Filled in when an optional parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Shown to the LLM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A parameter the caller must supply.
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default: None,
            description: None,
        }
    }

    /// A parameter the caller may omit.
    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type)
        }
    }

    /// Value bound when the caller omits this parameter. Implies optional.
    pub fn with_default(mut self, default: Value) -> Self {
        self.required = false;
        self.default = Some(default);
        self
    }

    /// Attach a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Why a set of arguments was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    /// A required parameter was absent.
    #[error("missing required parameter '{0}'")]
    Missing(String),

    /// A parameter had the wrong JSON type.
    #[error("parameter '{param}' expects {expected}, got {found}")]
    WrongType {
        /// Parameter name.
        param: String,
        /// Declared type.
        expected: ParamType,
        /// JSON type actually received.
        found: &'static str,
    },
}

impl SchemaViolation {
    /// The offending parameter name.
    pub fn param(&self) -> &str {
        match self {
            SchemaViolation::Missing(param) => param,
            SchemaViolation::WrongType { param, .. } => param,
        }
    }
}

/// The declared parameters of a tool or prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

impl InputSchema {
    /// A schema with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder style).
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Declared parameters, in order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// The spec for parameter `name`.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validate `arguments` and bind them.
    ///
    /// Either every declared parameter validates and the full binding is
    /// returned, or nothing is bound. Unknown argument names are dropped.
    /// `null` counts as absent for optional parameters.
    pub fn bind(&self, arguments: &Map<String, Value>) -> Result<Arguments, SchemaViolation> {
        let mut bound = Map::new();

        for spec in &self.params {
            let supplied = match arguments.get(&spec.name) {
                Some(Value::Null) if !spec.required => None,
                other => other,
            };

            match supplied {
                Some(value) => {
                    let coerced =
                        spec.param_type
                            .coerce(value)
                            .ok_or_else(|| SchemaViolation::WrongType {
                                param: spec.name.clone(),
                                expected: spec.param_type,
                                found: json_type_name(value),
                            })?;
                    bound.insert(spec.name.clone(), coerced);
                }
                None if spec.required => return Err(SchemaViolation::Missing(spec.name.clone())),
                None => {
                    if let Some(default) = &spec.default {
                        bound.insert(spec.name.clone(), default.clone());
                    }
                }
            }
        }

        Ok(Arguments(bound))
    }

    /// Render as a JSON-Schema object, the shape LLM tool APIs accept.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for spec in &self.params {
            let mut prop = Map::new();
            if let Some(ty) = spec.param_type.json_type() {
                prop.insert("type".into(), Value::from(ty));
            }
            if let Some(desc) = &spec.description {
                prop.insert("description".into(), Value::from(desc.as_str()));
            }
            if let Some(default) = &spec.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(spec.name.clone(), Value::Object(prop));
            if spec.required {
                required.push(Value::from(spec.name.as_str()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Arguments that passed validation, with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// Raw value of `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// `name` as a string.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// `name` as an integer.
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// `name` as a float. Integers convert.
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    /// `name` as a bool.
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// A required string parameter. Fails as a tool error if absent, which
    /// only happens when a handler is registered with a schema that does
    /// not declare the parameter.
    pub fn require_str(&self, name: &str) -> Result<&str, HandlerError> {
        self.str(name)
            .ok_or_else(|| HandlerError::tool(format!("missing string argument '{name}'")))
    }

    /// Deserialize the whole argument set into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    /// All bound arguments.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the bound arguments.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
