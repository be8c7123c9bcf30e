//! File extensions the pipeline understands.

use std::path::Path;

/// Extensions that can be converted to PDF, in lookup order.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    "docx", "doc", "xlsx", "xls", "pptx", "ppt", "txt", "srt", "vtt", "jpg", "jpeg", "png", "tiff",
    "tif",
];

pub const OFFICE_EXTENSIONS: &[&str] = &["docx", "doc", "xlsx", "xls", "pptx", "ppt"];
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "srt", "vtt"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif"];

/// Lowercased extension without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_pdf(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("pdf")
}

pub fn is_convertible(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()))
}

/// PDF or convertible.
pub fn is_supported(path: &Path) -> bool {
    is_pdf(path) || is_convertible(path)
}

/// Whether an original-format string (e.g. `"png"`) names an image.
pub fn is_image_format(format: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&format.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("a/Report.PDF")).as_deref(), Some("pdf"));
        assert_eq!(extension_of(Path::new("a/README")), None);
    }

    #[test]
    fn supported_set() {
        assert!(is_supported(Path::new("x.pdf")));
        assert!(is_supported(Path::new("x.Docx")));
        assert!(is_supported(Path::new("x.vtt")));
        assert!(is_supported(Path::new("x.TIF")));
        assert!(!is_supported(Path::new("x.odt")));
        assert!(!is_convertible(Path::new("x.pdf")));
    }

    #[test]
    fn image_formats() {
        assert!(is_image_format("JPEG"));
        assert!(is_image_format("tif"));
        assert!(!is_image_format("pdf"));
        assert!(!is_image_format("docx"));
    }
}
