/*!
 * Book loading.
 *
 * Two input shapes are understood: a JSON serialisation of `Book`, and plain
 * text where `# ` headings open chapters. In plain text, paragraphs become
 * `Text` nodes separated by `Break` nodes and `> ` lines become quotes.
 */

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::model::{Book, Chapter, DocumentNode};

/// How paragraphs are delimited in plain-text input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewlineMode {
    /// Blank lines separate paragraphs; single newlines are soft wraps
    #[default]
    Double,
    /// Every non-empty line is a paragraph
    Single,
}

impl fmt::Display for NewlineMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Double => write!(f, "double"),
            Self::Single => write!(f, "single"),
        }
    }
}

impl FromStr for NewlineMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "double" => Ok(Self::Double),
            "single" => Ok(Self::Single),
            _ => Err(anyhow!("Invalid newline mode: {}", s)),
        }
    }
}

/// Load a book from a `.json` or plain-text file
pub fn load_book(path: &Path, newline_mode: NewlineMode) -> Result<Book> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read book file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let book = if is_json {
        serde_json::from_str::<Book>(&content)
            .with_context(|| format!("Failed to parse book JSON: {}", path.display()))?
    } else {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();
        parse_plain_text(&content, &title, newline_mode)
    };

    debug!(
        "Loaded '{}' by {}: {} chapters, {} characters",
        book.title,
        book.author,
        book.chapters.len(),
        book.total_chars()
    );
    Ok(book)
}

/// Parse plain text into a book
///
/// Optional `Title:` and `Author:` lines before the first heading override
/// the fallback title. Text before the first heading forms a chapter named
/// after the book.
pub fn parse_plain_text(content: &str, fallback_title: &str, newline_mode: NewlineMode) -> Book {
    let mut title = fallback_title.to_string();
    let mut author = "Unknown".to_string();
    let mut sections: Vec<(Option<String>, Vec<&str>)> = vec![(None, Vec::new())];

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            sections.push((Some(heading.trim().to_string()), Vec::new()));
            continue;
        }
        if sections.len() == 1 {
            if let Some(value) = trimmed.strip_prefix("Title:") {
                title = value.trim().to_string();
                continue;
            }
            if let Some(value) = trimmed.strip_prefix("Author:") {
                author = value.trim().to_string();
                continue;
            }
        }
        if let Some(last) = sections.last_mut() {
            last.1.push(line);
        }
    }

    let chapters = sections
        .into_iter()
        .map(|(heading, lines)| {
            let name = heading.unwrap_or_else(|| title.clone());
            Chapter::new(name, paragraphs_to_nodes(&lines, newline_mode))
        })
        .filter(|chapter| !chapter.children.is_empty())
        .collect();

    Book {
        title,
        author,
        chapters,
    }
}

fn paragraphs_to_nodes(lines: &[&str], newline_mode: NewlineMode) -> Vec<DocumentNode> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || newline_mode == NewlineMode::Single {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            if !trimmed.is_empty() {
                paragraphs.push(vec![trimmed]);
            }
            continue;
        }
        current.push(trimmed);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let mut nodes = Vec::new();
    for paragraph in paragraphs {
        if !nodes.is_empty() {
            nodes.push(DocumentNode::Break);
        }
        let is_quote = paragraph.iter().all(|l| l.starts_with('>'));
        if is_quote {
            let text = paragraph
                .iter()
                .map(|l| l.trim_start_matches('>').trim())
                .collect::<Vec<_>>()
                .join(" ");
            nodes.push(DocumentNode::quote(vec![DocumentNode::text(text)]));
        } else {
            nodes.push(DocumentNode::text(paragraph.join(" ")));
        }
    }
    nodes
}
