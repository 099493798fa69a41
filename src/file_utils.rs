use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

// @module: File and directory utilities

/// Suffix of the directory a book's chapters are written to
pub const OUTPUT_DIR_SUFFIX: &str = "_audio";

/// Longest file name most filesystems accept, in bytes
pub const NAME_MAX: usize = 255;

/// Characters not allowed in file names on common filesystems
static FORBIDDEN_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("forbidden character pattern is valid")
});

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Extensions recognised as books in folder mode
pub const BOOK_EXTENSIONS: &[&str] = &["json", "txt"];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Default output directory for a book: `<stem>_audio` next to it
    pub fn output_dir_for(book_file: &Path) -> PathBuf {
        let stem = book_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "book".to_string());
        book_file
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{}{}", stem, OUTPUT_DIR_SUFFIX))
    }

    /// Find book files (`.json`, `.txt`) in a directory, sorted by path
    ///
    /// Output directories of earlier runs are skipped, so the chapter text
    /// files written there are never mistaken for books.
    pub fn find_book_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        let walker = WalkDir::new(dir.as_ref())
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_output_dir(e.path()));
        for entry in walker {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    let ext = ext.to_string_lossy();
                    if BOOK_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)) {
                        result.push(path.to_path_buf());
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Write bytes so the target either appears complete or not at all
    ///
    /// The data goes to a temporary file in the target directory, which is
    /// then renamed over the target.
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
        temp.write_all(content)
            .with_context(|| format!("Failed to write temporary file for {:?}", path))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to flush temporary file for {:?}", path))?;
        temp.persist(path)
            .with_context(|| format!("Failed to move output into place: {:?}", path))?;
        Ok(())
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        Self::write_atomic(path, content.as_bytes())
    }
}

/// Turn an arbitrary title into a file name component
///
/// Forbidden characters become `_`, whitespace runs collapse to `_`, and
/// leading or trailing dots and spaces are stripped. Empty titles become
/// `untitled`.
pub fn sanitize_title(title: &str) -> String {
    let replaced = FORBIDDEN_CHARS.replace_all(title, "_");
    let trimmed = replaced.trim_matches(|c: char| c == ' ' || c == '.' || c.is_whitespace());
    let collapsed = WHITESPACE_RUN.replace_all(trimmed, "_");
    if collapsed.is_empty() {
        "untitled".to_string()
    } else {
        collapsed.into_owned()
    }
}

fn is_output_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(OUTPUT_DIR_SUFFIX))
}

/// Build `NNNN_<title>.<ext>`, kept within `NAME_MAX` bytes
///
/// Over-long titles are cut on a character boundary and get a short hash of
/// the full title appended, so distinct titles stay distinct.
pub fn make_safe_filename(index: usize, title: &str, extension: &str) -> String {
    let prefix = format!("{:04}_", index);
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let title = sanitize_title(title);

    if prefix.len() + title.len() + suffix.len() <= NAME_MAX {
        return format!("{}{}{}", prefix, title, suffix);
    }

    let digest = Sha256::digest(title.as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    let budget = NAME_MAX - prefix.len() - suffix.len() - hash.len() - 1;

    let mut end = budget.min(title.len());
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}_{}{}", prefix, &title[..end], hash, suffix)
}
