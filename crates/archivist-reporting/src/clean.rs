/// Make a value safe for downstream catalogue imports.
///
/// Dashes become `:`, curly quotes become straight ones, an ellipsis
/// becomes `...`, and any other non-ASCII character is dropped.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Mis-decoded UTF-8 dashes seen in some source files.
    let text = text
        .replace("\u{e2}\u{20ac}\u{201d}", ":")
        .replace("\u{e2}\u{20ac}\u{201c}", ":");
    for c in text.chars() {
        match c {
            '\u{2014}' | '\u{2013}' => out.push(':'),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{2026}' => out.push_str("..."),
            c if c.is_ascii() => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}
