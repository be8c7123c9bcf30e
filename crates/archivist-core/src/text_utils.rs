use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").unwrap());

/// Uppercase the first character, leaving the rest untouched.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Pull a JSON object out of a service reply.
///
/// Strips markdown code fences. Anything that does not then start with `{`
/// becomes `"{}"`.
pub fn extract_json_object(content: &str) -> String {
    let trimmed = content.trim();
    let unfenced = match FENCED_BLOCK.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    };
    if unfenced.starts_with('{') {
        unfenced.to_string()
    } else {
        "{}".to_string()
    }
}
