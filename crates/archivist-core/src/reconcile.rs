//! Merge a raw service reply against the full field context.

use std::fmt;

use serde_json::Value;

use crate::dates::normalize_date;
use crate::fields::{Derived, FieldContext, FieldDescriptor, Normalize};
use crate::record::{FieldValue, MetadataRecord};
use crate::text_utils::extract_json_object;

/// Facts about the source document that the pipeline knows without asking.
#[derive(Debug, Clone)]
pub struct DocumentFacts {
    /// Lowercase extension of the original source file (`pdf`, `docx`, ...).
    pub original_format: String,
}

impl Default for DocumentFacts {
    fn default() -> Self {
        Self {
            original_format: "pdf".to_string(),
        }
    }
}

/// Non-fatal problems found while reconciling one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    MissingRequired { field: String },
    NotInVocabulary { field: String, value: String },
    UnparsedDate { field: String, value: String },
    WrongShape { field: String, found: &'static str },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::MissingRequired { field } => {
                write!(f, "required field {field} is empty")
            }
            ValidationWarning::NotInVocabulary { field, value } => {
                write!(f, "{field} value \"{value}\" is not in the controlled vocabulary")
            }
            ValidationWarning::UnparsedDate { field, value } => {
                write!(f, "{field} value \"{value}\" could not be normalized to ISO-8601")
            }
            ValidationWarning::WrongShape { field, found } => {
                write!(f, "{field} returned {found}; using an empty value")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub record: MetadataRecord,
    pub warnings: Vec<ValidationWarning>,
}

/// Parse a service reply into a JSON object.
///
/// Fenced replies are unwrapped. Anything that is not a JSON object,
/// including malformed JSON, is logged and becomes `{}`.
pub fn parse_reply(content: &str) -> Value {
    let candidate = extract_json_object(content);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => Value::Object(Default::default()),
        Err(e) => {
            tracing::warn!(error = %e, "malformed JSON in service reply, using empty object");
            Value::Object(Default::default())
        }
    }
}

/// Produce a complete record: exactly one value per context field.
pub fn reconcile(raw: &Value, context: &FieldContext, facts: &DocumentFacts) -> Reconciled {
    let empty = serde_json::Map::new();
    let object = raw.as_object().unwrap_or(&empty);
    let mut record = MetadataRecord::new();
    let mut warnings = Vec::new();

    for field in context.fields() {
        let value = if field.mirror_of.is_some() {
            // Filled from the canonical field below.
            FieldValue::empty_for(field)
        } else if let Some(Derived::OriginalFormat) = field.derived {
            derived_format(field, facts)
        } else {
            let returned = object
                .get(&field.name)
                .or_else(|| object.get(&field.column));
            let value = match returned {
                Some(v) => coerce(field, v, &mut warnings),
                None => FieldValue::empty_for(field),
            };
            post_process(field, value, &mut warnings)
        };
        record.set(&field.name, value);
    }

    for field in context.fields() {
        if let Some(canonical) = &field.mirror_of {
            let copied = record
                .get(canonical)
                .cloned()
                .unwrap_or_else(|| FieldValue::empty_for(field));
            record.set(&field.name, copied);
        }
    }

    for field in context.fields().iter().filter(|f| f.required) {
        if record.get(&field.name).is_none_or(FieldValue::is_empty) {
            warnings.push(ValidationWarning::MissingRequired {
                field: field.name.clone(),
            });
        }
    }

    for key in object.keys() {
        if context.resolve(key).is_none() {
            tracing::debug!(key = %key, "dropping field not in context");
        }
    }

    Reconciled { record, warnings }
}

fn derived_format(field: &FieldDescriptor, facts: &DocumentFacts) -> FieldValue {
    let format = facts.original_format.trim().to_lowercase();
    if field.is_multi() {
        FieldValue::Multi(vec![format])
    } else {
        FieldValue::Single(format)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce(field: &FieldDescriptor, value: &Value, warnings: &mut Vec<ValidationWarning>) -> FieldValue {
    let wrong_shape = |warnings: &mut Vec<ValidationWarning>, found: &'static str| {
        warnings.push(ValidationWarning::WrongShape {
            field: field.name.clone(),
            found,
        });
        FieldValue::empty_for(field)
    };

    if field.is_multi() {
        match value {
            Value::Null => FieldValue::Multi(Vec::new()),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match scalar_to_string(item) {
                        Some(s) if !s.is_empty() => out.push(s),
                        Some(_) => {}
                        None if item.is_null() => {}
                        None => return wrong_shape(warnings, "a nested value"),
                    }
                }
                FieldValue::Multi(out)
            }
            Value::Object(_) => wrong_shape(warnings, "an object"),
            scalar => {
                let s = scalar_to_string(scalar).unwrap_or_default();
                FieldValue::Multi(
                    s.split(';')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect(),
                )
            }
        }
    } else {
        match value {
            Value::Null => FieldValue::Single(String::new()),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match scalar_to_string(item) {
                        Some(s) if !s.is_empty() => parts.push(s),
                        Some(_) => {}
                        None if item.is_null() => {}
                        None => return wrong_shape(warnings, "a nested value"),
                    }
                }
                FieldValue::Single(parts.join("; "))
            }
            Value::Object(_) => wrong_shape(warnings, "an object"),
            scalar => FieldValue::Single(scalar_to_string(scalar).unwrap_or_default()),
        }
    }
}

fn post_process(
    field: &FieldDescriptor,
    value: FieldValue,
    warnings: &mut Vec<ValidationWarning>,
) -> FieldValue {
    let FieldValue::Single(s) = value else {
        return value;
    };
    if s.is_empty() {
        return FieldValue::Single(s);
    }

    let s = match field.normalize {
        Some(Normalize::Date) => match normalize_date(&s) {
            Some(iso) => iso,
            None => {
                warnings.push(ValidationWarning::UnparsedDate {
                    field: field.name.clone(),
                    value: s.clone(),
                });
                s
            }
        },
        None => s,
    };

    if let Some(allowed) = field.allowed_values()
        && !allowed.iter().any(|v| *v == s)
    {
        warnings.push(ValidationWarning::NotInVocabulary {
            field: field.name.clone(),
            value: s.clone(),
        });
    }

    FieldValue::Single(s)
}
