/*!
 * Tests for loading books from disk
 */

use crate::common::{create_temp_dir, create_test_file};
use voxbook::document::{DocumentNode, NewlineMode, load_book};
use voxbook::synthesis::PauseProtocol;

/// Test loading a plain-text book with metadata and headings
#[test]
fn test_loadBook_withPlainText_shouldReadMetadataAndChapters() {
    let temp_dir = create_temp_dir().unwrap();
    let content = "Title: Harbour Lights\nAuthor: J. Doe\n\n\
        # One\nFirst paragraph\nwraps here.\n\nSecond paragraph.\n\n\
        # Two\n> A quoted line\n> that continues.\n";
    let path = create_test_file(temp_dir.path(), "harbour.txt", content).unwrap();

    let book = load_book(&path, NewlineMode::Double).unwrap();

    assert_eq!(book.title, "Harbour Lights");
    assert_eq!(book.author, "J. Doe");
    assert_eq!(book.chapters.len(), 2);
    assert_eq!(book.chapters[0].title, "One");
    assert_eq!(
        book.chapters[0].text(),
        "First paragraph wraps here.Second paragraph."
    );
    assert_eq!(
        book.chapters[1].children,
        vec![DocumentNode::quote(vec![DocumentNode::text(
            "A quoted line that continues."
        )])]
    );
}

/// Test that the file stem is used when no title line is present
#[test]
fn test_loadBook_withoutTitleLine_shouldUseFileStem() {
    let temp_dir = create_temp_dir().unwrap();
    let path = create_test_file(temp_dir.path(), "notes.txt", "Just one line.\n").unwrap();

    let book = load_book(&path, NewlineMode::Double).unwrap();

    assert_eq!(book.title, "notes");
    assert_eq!(book.author, "Unknown");
    assert_eq!(book.chapters.len(), 1);
    assert_eq!(book.chapters[0].title, "notes");
}

/// Test that headings without content do not produce chapters
#[test]
fn test_loadBook_withEmptyHeading_shouldSkipChapter() {
    let temp_dir = create_temp_dir().unwrap();
    let content = "# Empty\n\n# Full\nSomething happens.\n";
    let path = create_test_file(temp_dir.path(), "book.txt", content).unwrap();

    let book = load_book(&path, NewlineMode::Double).unwrap();

    assert_eq!(book.chapters.len(), 1);
    assert_eq!(book.chapters[0].title, "Full");
}

/// Test that single newline mode makes each line a paragraph
#[test]
fn test_loadBook_withSingleNewlineMode_shouldBreakEveryLine() {
    let temp_dir = create_temp_dir().unwrap();
    let path = create_test_file(temp_dir.path(), "poem.txt", "Line one\nLine two\nLine three\n")
        .unwrap();

    let book = load_book(&path, NewlineMode::Single).unwrap();
    let breaks = book.chapters[0]
        .children
        .iter()
        .filter(|n| **n == DocumentNode::Break)
        .count();

    assert_eq!(breaks, 2);
}

/// Test loading a JSON book with nested quotes
#[test]
fn test_loadBook_withJson_shouldKeepNodeTree() {
    let temp_dir = create_temp_dir().unwrap();
    let json = r#"{
        "title": "Letters",
        "chapters": [
            {"title": "First", "children": [
                {"type": "text", "content": "She read aloud."},
                {"type": "quote", "children": [{"type": "text", "content": "Dear friend."}]}
            ]}
        ]
    }"#;
    let path = create_test_file(temp_dir.path(), "letters.JSON", json).unwrap();

    let book = load_book(&path, NewlineMode::Double).unwrap();

    assert_eq!(book.title, "Letters");
    assert_eq!(book.author, "Unknown");
    assert_eq!(
        book.chapters[0].flatten(&PauseProtocol::default()),
        "She read aloud. @QTE#Dear friend. @QTE#"
    );
}

/// Test that malformed JSON is reported as an error
#[test]
fn test_loadBook_withMalformedJson_shouldFail() {
    let temp_dir = create_temp_dir().unwrap();
    let path = create_test_file(temp_dir.path(), "broken.json", "{\"title\": ").unwrap();

    assert!(load_book(&path, NewlineMode::Double).is_err());
}

/// Test that a missing file is reported as an error
#[test]
fn test_loadBook_withMissingFile_shouldFail() {
    let temp_dir = create_temp_dir().unwrap();
    let path = temp_dir.path().join("absent.txt");

    let err = load_book(&path, NewlineMode::Double).unwrap_err();
    assert!(err.to_string().contains("Failed to read book file"));
}
