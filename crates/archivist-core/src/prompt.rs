use crate::fields::FieldContext;
use crate::text_utils::capitalize_first;

/// Render the instruction block for `context`.
///
/// Pure function of the context: the same context always renders the same
/// prompt, which is built once per run and shared by every document.
pub fn build_prompt(context: &FieldContext) -> String {
    let mut out = String::new();

    if let Some(preamble) = context.preamble() {
        out.push_str(preamble.trim());
        out.push_str("\n\n");
    }

    out.push_str("Extract structured metadata from the document.\n\n");

    let required: Vec<&str> = context
        .requested()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();
    if !required.is_empty() {
        out.push_str("Required fields: ");
        out.push_str(&required.join(", "));
        out.push_str("\n\n");
    }

    out.push_str(
        "Follow the definition and comment of every field below. \
         A custom rule overrides the definition where the two disagree.\n\n",
    );

    for field in context.requested() {
        out.push_str("- **");
        out.push_str(&capitalize_first(&field.name));
        out.push_str("**: ");
        out.push_str(field.definition.trim());
        if let Some(comment) = &field.comment {
            out.push_str(" (");
            out.push_str(comment.trim());
            out.push(')');
        }
        if let Some(values) = field.allowed_values() {
            out.push_str(" Allowed values: ");
            out.push_str(&values.join("; "));
            out.push('.');
        }
        if let Some(rule) = &field.custom_instructions {
            out.push_str(" Custom rule (takes precedence over the definition): ");
            out.push_str(rule.trim());
        }
        out.push('\n');
    }

    out.push_str(
        "\nReturn a single JSON object with exactly these fields. \
         Use \"\" for an unknown single value and [] for an unknown list. \
         Do not wrap the JSON in markdown.\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldContext {
        FieldContext::from_json_str(
            r#"{
                "preamble": "You are an archivist.",
                "fields": {
                    "title": {"definition": "A name given to the resource.", "comment": "As printed.", "type": "string", "required": true},
                    "creator": {"definition": "Who made it.", "type": "array", "items": {"type": "string"}, "required": true,
                                "custom_instructions": "Normalise the institute name to ICAEW."},
                    "notes": {"definition": "Extra notes.", "type": "string"},
                    "rights": {"definition": "Rights.", "type": "string", "required": true, "included": false}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn renders_each_requested_field_capitalized() {
        let prompt = build_prompt(&sample());
        assert!(prompt.starts_with("You are an archivist."));
        assert!(prompt.contains("- **Title**: A name given to the resource. (As printed.)"));
        assert!(prompt.contains("- **Creator**: Who made it."));
        assert!(prompt.contains("- **Notes**: Extra notes."));
        assert!(!prompt.contains("**Rights**"));
    }

    #[test]
    fn custom_rule_is_marked_as_override() {
        let prompt = build_prompt(&sample());
        assert!(prompt.contains(
            "Custom rule (takes precedence over the definition): Normalise the institute name to ICAEW."
        ));
    }

    #[test]
    fn required_quick_reference_lists_requested_required_fields() {
        let prompt = build_prompt(&sample());
        assert!(prompt.contains("Required fields: title, creator\n"));
    }

    #[test]
    fn is_deterministic() {
        let ctx = sample();
        assert_eq!(build_prompt(&ctx), build_prompt(&ctx));
    }

    #[test]
    fn builtin_prompt_lists_content_type_vocabulary() {
        let prompt = build_prompt(&FieldContext::builtin().unwrap());
        assert!(prompt.contains("Thought leadership report"));
        assert!(prompt.contains("- **Icaew:ContentType**"));
    }
}
