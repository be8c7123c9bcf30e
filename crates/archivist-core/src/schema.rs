//! Response schema sent alongside the prompt.

use serde_json::{Map, Value, json};

use crate::fields::{FieldContext, FieldShape};

pub const SCHEMA_NAME: &str = "metadata_extraction";

/// JSON-Schema output contract for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

impl ResponseSchema {
    /// True when no field is requested; the service is not called then.
    pub fn is_empty(&self) -> bool {
        self.schema["properties"]
            .as_object()
            .is_none_or(|p| p.is_empty())
    }

    pub fn property_names(&self) -> Vec<&str> {
        self.schema["properties"]
            .as_object()
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// `json_schema` body for an OpenAI-style `response_format`.
    pub fn to_json_schema_format(&self) -> Value {
        json!({
            "name": self.name,
            "strict": self.strict,
            "schema": self.schema,
        })
    }
}

/// Build the schema from the requested fields of `context`.
///
/// Every listed property is required and no other keys are allowed, so a
/// strict service cannot omit or invent fields. Enum properties also accept
/// `""` so "unknown" stays expressible.
pub fn build_schema(context: &FieldContext) -> ResponseSchema {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in context.requested() {
        let prop = match &field.shape {
            FieldShape::Single => json!({
                "type": "string",
                "description": field.definition,
            }),
            FieldShape::Multi => json!({
                "type": "array",
                "items": { "type": "string" },
                "description": field.definition,
            }),
            FieldShape::Enum(values) => {
                let mut allowed: Vec<Value> =
                    values.iter().map(|v| Value::String(v.clone())).collect();
                if !values.iter().any(|v| v.is_empty()) {
                    allowed.push(Value::String(String::new()));
                }
                json!({
                    "type": "string",
                    "enum": allowed,
                    "description": field.definition,
                })
            }
        };
        properties.insert(field.name.clone(), prop);
        required.push(Value::String(field.name.clone()));
    }

    ResponseSchema {
        name: SCHEMA_NAME.to_string(),
        strict: true,
        schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        }),
    }
}
