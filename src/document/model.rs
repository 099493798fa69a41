/*!
 * Book document model.
 *
 * A chapter is a small tree of typed nodes. Flattening it with a pause
 * protocol yields the single string the segmenter consumes, with reserved
 * markers wherever a break or quote boundary requires a pause.
 */

use serde::{Deserialize, Serialize};

use crate::synthesis::pause::PauseProtocol;

/// A node in a chapter's content tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentNode {
    /// Plain text content
    Text { content: String },

    /// An explicit pause (paragraph or section break)
    Break,

    /// Quoted passage, spoken with a different pause emphasis
    Quote { children: Vec<DocumentNode> },
}

impl DocumentNode {
    /// Convenience constructor for a text leaf
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Convenience constructor for a quote
    pub fn quote(children: Vec<DocumentNode>) -> Self {
        Self::Quote { children }
    }

    /// Number of characters (code points) of leaf text below this node
    pub fn char_count(&self) -> usize {
        match self {
            Self::Text { content } => content.chars().count(),
            Self::Break => 0,
            Self::Quote { children } => children.iter().map(Self::char_count).sum(),
        }
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text { content } => out.push_str(content),
            Self::Break => {}
            Self::Quote { children } => children.iter().for_each(|c| c.collect_text(out)),
        }
    }

    fn collect_marked(&self, protocol: &PauseProtocol, out: &mut String) {
        match self {
            Self::Text { content } => out.push_str(content),
            Self::Break => out.push_str(protocol.break_marker()),
            Self::Quote { children } => {
                let marker = protocol.quote_marker().unwrap_or(protocol.break_marker());
                out.push_str(marker);
                children
                    .iter()
                    .for_each(|c| c.collect_marked(protocol, out));
                out.push_str(marker);
            }
        }
    }
}

/// A chapter: one output audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title, used for the output filename and tags
    pub title: String,

    /// Chapter content
    #[serde(default)]
    pub children: Vec<DocumentNode>,
}

impl Chapter {
    pub fn new(title: impl Into<String>, children: Vec<DocumentNode>) -> Self {
        Self {
            title: title.into(),
            children,
        }
    }

    pub fn char_count(&self) -> usize {
        self.children.iter().map(DocumentNode::char_count).sum()
    }

    /// Concatenation of all leaf text in document order
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.children.iter().for_each(|c| c.collect_text(&mut out));
        out
    }

    /// Leaf text with pause markers at every break and quote boundary
    pub fn flatten(&self, protocol: &PauseProtocol) -> String {
        let mut out = String::new();
        self.children
            .iter()
            .for_each(|c| c.collect_marked(protocol, &mut out));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.char_count() == 0
    }
}

/// A whole book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,

    #[serde(default = "default_author")]
    pub author: String,

    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

fn default_author() -> String {
    "Unknown".to_string()
}

impl Book {
    /// Chapters that contain at least one character of text
    pub fn non_empty_chapters(&self) -> Vec<&Chapter> {
        self.chapters.iter().filter(|c| !c.is_empty()).collect()
    }

    pub fn total_chars(&self) -> usize {
        self.chapters.iter().map(Chapter::char_count).sum()
    }
}
