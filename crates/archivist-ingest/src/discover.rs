use std::path::{Path, PathBuf};

use crate::IngestError;
use crate::formats::{is_convertible, is_pdf, is_supported};

/// Where the run takes its documents from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    /// Top level only; subdirectories are not walked.
    Folder(PathBuf),
}

/// List the documents to process, sorted by path.
///
/// A folder yields its PDFs plus every convertible file that has no PDF
/// sibling with the same stem (that sibling is the converted copy and is
/// processed instead). An unsupported single file yields an empty list.
pub fn discover(source: &InputSource) -> Result<Vec<PathBuf>, IngestError> {
    match source {
        InputSource::File(path) => {
            if !path.is_file() {
                return Err(IngestError::NotFound(path.clone()));
            }
            if !is_supported(path) {
                tracing::warn!(path = %path.display(), "unsupported file type, skipping");
                return Ok(Vec::new());
            }
            Ok(vec![path.clone()])
        }
        InputSource::Folder(dir) => discover_folder(dir),
    }
}

fn discover_folder(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.exists() {
        return Err(IngestError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_supported(path))
        .collect();
    files.sort();

    let documents: Vec<PathBuf> = files
        .iter()
        .filter(|path| {
            if is_pdf(path) {
                return true;
            }
            let already_converted = is_convertible(path)
                && files
                    .iter()
                    .any(|f| is_pdf(f) && f.file_stem() == path.file_stem());
            if already_converted {
                tracing::debug!(path = %path.display(), "PDF copy exists, skipping original");
            }
            !already_converted
        })
        .cloned()
        .collect();

    tracing::info!(dir = %dir.display(), count = documents.len(), "discovered documents");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn folder_lists_pdfs_and_convertibles_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.pdf");
        touch(dir.path(), "a.docx");
        touch(dir.path(), "c.png");
        touch(dir.path(), "notes.md");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "deep.pdf");

        let found = discover(&InputSource::Folder(dir.path().to_path_buf())).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.docx", "b.pdf", "c.png"]);
    }

    #[test]
    fn converted_original_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "minutes.docx");
        touch(dir.path(), "minutes.pdf");

        let found = discover(&InputSource::Folder(dir.path().to_path_buf())).unwrap();
        assert_eq!(found, vec![dir.path().join("minutes.pdf")]);
    }

    #[test]
    fn sibling_pdf_match_ignores_extension_case() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Memo.DOCX");
        touch(dir.path(), "Memo.PDF");
        touch(dir.path(), "memo-draft.docx");

        let found = discover(&InputSource::Folder(dir.path().to_path_buf())).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("Memo.PDF"), dir.path().join("memo-draft.docx")]
        );
    }

    #[test]
    fn single_file() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = touch(dir.path(), "one.pdf");
        let md = touch(dir.path(), "one.md");

        assert_eq!(discover(&InputSource::File(pdf.clone())).unwrap(), vec![pdf]);
        assert!(discover(&InputSource::File(md)).unwrap().is_empty());
        assert!(matches!(
            discover(&InputSource::File(dir.path().join("missing.pdf"))),
            Err(IngestError::NotFound(_))
        ));
    }

    #[test]
    fn folder_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "file.pdf");
        assert!(matches!(
            discover(&InputSource::Folder(file)),
            Err(IngestError::NotADirectory(_))
        ));
        assert!(matches!(
            discover(&InputSource::Folder(dir.path().join("nope"))),
            Err(IngestError::NotFound(_))
        ));
    }
}
