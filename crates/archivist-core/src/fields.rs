//! The field context: the table of metadata fields a run extracts.
//!
//! A context is loaded from JSON, either the built-in ICAEW/Dublin Core
//! table or a user-supplied file, and validated once into
//! [`FieldDescriptor`]s. Everything downstream (schema, prompt,
//! reconciliation, sinks) reads the typed table and never the raw JSON.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const BUILTIN_CONTEXT: &str = include_str!("../assets/field_context.json");

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("failed to read field context {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid field context JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field context must be a JSON object of field descriptors")]
    NotAnObject,
    #[error("field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("unknown field `{0}`")]
    UnknownField(String),
}

impl ContextError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ContextError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Value shape of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    Single,
    Multi,
    /// Single value restricted to a controlled vocabulary.
    Enum(Vec<String>),
}

impl FieldShape {
    pub fn is_multi(&self) -> bool {
        matches!(self, FieldShape::Multi)
    }
}

/// Post-processing applied to a returned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    Date,
}

/// A value the pipeline fills in itself instead of asking the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derived {
    OriginalFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub definition: String,
    pub comment: Option<String>,
    pub shape: FieldShape,
    pub required: bool,
    pub custom_instructions: Option<String>,
    /// Output column name; defaults to `name`.
    pub column: String,
    /// Whether the field is requested from the service.
    pub included: bool,
    /// Canonical field this one copies after reconciliation.
    pub mirror_of: Option<String>,
    pub normalize: Option<Normalize>,
    pub derived: Option<Derived>,
}

impl FieldDescriptor {
    pub fn is_multi(&self) -> bool {
        self.shape.is_multi()
    }

    /// Controlled vocabulary, if the field has one.
    pub fn allowed_values(&self) -> Option<&[String]> {
        match &self.shape {
            FieldShape::Enum(values) => Some(values),
            _ => None,
        }
    }

    /// Fields the service is actually asked for: included, not mirrored, not derived.
    pub fn is_requested(&self) -> bool {
        self.included && self.mirror_of.is_none() && self.derived.is_none()
    }
}

#[derive(Deserialize)]
struct RawItems {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct RawDescriptor {
    definition: Option<String>,
    comment: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    items: Option<RawItems>,
    #[serde(default)]
    required: bool,
    #[serde(rename = "enum")]
    allowed: Option<Vec<String>>,
    custom_instructions: Option<String>,
    column: Option<String>,
    included: Option<bool>,
    mirror_of: Option<String>,
    normalize: Option<String>,
    derived: Option<String>,
}

/// Validated, ordered field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldContext {
    preamble: Option<String>,
    fields: Vec<FieldDescriptor>,
}

impl FieldContext {
    /// The ICAEW/Dublin Core context shipped with the binary.
    pub fn builtin() -> Result<Self, ContextError> {
        Self::from_json_str(BUILTIN_CONTEXT)
    }

    pub fn from_path(path: &Path) -> Result<Self, ContextError> {
        let content = std::fs::read_to_string(path).map_err(|source| ContextError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse a context document.
    ///
    /// Accepts either `{"preamble": "...", "fields": {...}}` or a bare object
    /// mapping field names to descriptors. Field order is preserved.
    pub fn from_json_str(content: &str) -> Result<Self, ContextError> {
        let value: Value = serde_json::from_str(content)?;
        let Value::Object(mut root) = value else {
            return Err(ContextError::NotAnObject);
        };

        let (preamble, raw_fields) = if matches!(root.get("fields"), Some(Value::Object(_))) {
            let preamble = match root.remove("preamble") {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
                _ => None,
            };
            match root.remove("fields") {
                Some(Value::Object(fields)) => (preamble, fields),
                _ => return Err(ContextError::NotAnObject),
            }
        } else {
            (None, root)
        };

        let fields = parse_fields(raw_fields)?;
        validate_mirrors(&fields)?;
        Ok(Self { preamble, fields })
    }

    pub fn preamble(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look a key up by field name first, then by column alias.
    pub fn resolve(&self, key: &str) -> Option<&FieldDescriptor> {
        self.get(key)
            .or_else(|| self.fields.iter().find(|f| f.column == key))
    }

    /// Fields sent to the service, in context order.
    pub fn requested(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_requested())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    /// Adjust the included set. Names may be field names or column aliases.
    pub fn with_overrides(
        mut self,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, ContextError> {
        for key in include.iter().chain(exclude) {
            if self.resolve(key).is_none() {
                return Err(ContextError::UnknownField(key.clone()));
            }
        }
        for field in &mut self.fields {
            let named = |keys: &[String]| {
                keys.iter()
                    .any(|k| *k == field.name || *k == field.column)
            };
            let (included, excluded) = (named(include), named(exclude));
            if included {
                field.included = true;
            }
            if excluded {
                field.included = false;
            }
        }
        Ok(self)
    }
}

fn parse_fields(raw_fields: Map<String, Value>) -> Result<Vec<FieldDescriptor>, ContextError> {
    let mut fields = Vec::with_capacity(raw_fields.len());
    let mut columns = HashSet::new();

    for (name, raw) in raw_fields {
        if !raw.is_object() {
            return Err(ContextError::invalid(&name, "descriptor must be an object"));
        }
        let raw: RawDescriptor = serde_json::from_value(raw)
            .map_err(|e| ContextError::invalid(&name, e.to_string()))?;
        let descriptor = build_descriptor(&name, raw)?;
        if !columns.insert(descriptor.column.clone()) {
            return Err(ContextError::invalid(
                &name,
                format!("duplicate column `{}`", descriptor.column),
            ));
        }
        fields.push(descriptor);
    }
    Ok(fields)
}

fn build_descriptor(name: &str, raw: RawDescriptor) -> Result<FieldDescriptor, ContextError> {
    let definition = raw
        .definition
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ContextError::invalid(name, "missing `definition`"))?;

    let kind = raw
        .kind
        .ok_or_else(|| ContextError::invalid(name, "missing `type`"))?;

    let shape = match kind.as_str() {
        "string" => match raw.allowed {
            Some(values) if values.is_empty() => {
                return Err(ContextError::invalid(name, "`enum` must not be empty"));
            }
            Some(values) => FieldShape::Enum(values),
            None => FieldShape::Single,
        },
        "array" => {
            let item_kind = raw
                .items
                .and_then(|i| i.kind)
                .ok_or_else(|| ContextError::invalid(name, "array field missing `items.type`"))?;
            if item_kind != "string" {
                return Err(ContextError::invalid(
                    name,
                    format!("unsupported item type `{item_kind}`"),
                ));
            }
            if raw.allowed.is_some() {
                return Err(ContextError::invalid(name, "`enum` is only valid on string fields"));
            }
            FieldShape::Multi
        }
        other => {
            return Err(ContextError::invalid(
                name,
                format!("unsupported type `{other}`"),
            ));
        }
    };

    let normalize = match raw.normalize.as_deref() {
        None => None,
        Some("date") => Some(Normalize::Date),
        Some(other) => {
            return Err(ContextError::invalid(
                name,
                format!("unknown normalizer `{other}`"),
            ));
        }
    };
    if normalize.is_some() && shape.is_multi() {
        return Err(ContextError::invalid(name, "date normalization needs a string field"));
    }

    let derived = match raw.derived.as_deref() {
        None => None,
        Some("original_format") => Some(Derived::OriginalFormat),
        Some(other) => {
            return Err(ContextError::invalid(
                name,
                format!("unknown derivation `{other}`"),
            ));
        }
    };

    Ok(FieldDescriptor {
        name: name.to_string(),
        definition,
        comment: raw.comment.filter(|c| !c.trim().is_empty()),
        shape,
        required: raw.required,
        custom_instructions: raw.custom_instructions.filter(|c| !c.trim().is_empty()),
        column: raw.column.unwrap_or_else(|| name.to_string()),
        included: raw.included.unwrap_or(true),
        mirror_of: raw.mirror_of,
        normalize,
        derived,
    })
}

fn validate_mirrors(fields: &[FieldDescriptor]) -> Result<(), ContextError> {
    for field in fields {
        let Some(target) = &field.mirror_of else {
            continue;
        };
        if *target == field.name {
            return Err(ContextError::invalid(&field.name, "field cannot mirror itself"));
        }
        let canonical = fields
            .iter()
            .find(|f| f.name == *target)
            .ok_or_else(|| {
                ContextError::invalid(&field.name, format!("mirrors unknown field `{target}`"))
            })?;
        if canonical.mirror_of.is_some() {
            return Err(ContextError::invalid(
                &field.name,
                format!("`{target}` is itself a mirror"),
            ));
        }
        if canonical.is_multi() != field.is_multi() {
            return Err(ContextError::invalid(
                &field.name,
                format!("cardinality differs from `{target}`"),
            ));
        }
    }
    Ok(())
}
