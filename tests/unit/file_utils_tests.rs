/*!
 * Tests for file utilities and output naming
 */

use std::fs;

use crate::common::{create_temp_dir, create_test_file};
use voxbook::file_utils::{FileManager, NAME_MAX, make_safe_filename};

/// Test directory creation and existence checks
#[test]
fn test_ensureDir_shouldCreateNestedDirectories() {
    let temp_dir = create_temp_dir().unwrap();
    let nested = temp_dir.path().join("a").join("b").join("c");

    assert!(!FileManager::dir_exists(&nested));
    FileManager::ensure_dir(&nested).unwrap();
    assert!(FileManager::dir_exists(&nested));
    assert!(!FileManager::file_exists(&nested));

    // Existing directories are fine
    FileManager::ensure_dir(&nested).unwrap();
}

/// Test that book discovery descends into subdirectories
#[test]
fn test_findBookFiles_shouldSearchRecursively() {
    let temp_dir = create_temp_dir().unwrap();
    let sub = temp_dir.path().join("series");
    fs::create_dir(&sub).unwrap();
    create_test_file(temp_dir.path(), "one.txt", "x").unwrap();
    create_test_file(&sub, "two.JSON", "{}").unwrap();
    create_test_file(&sub, "notes.md", "x").unwrap();

    let found = FileManager::find_book_files(temp_dir.path()).unwrap();

    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|p| p.ends_with("one.txt")));
    assert!(found.iter().any(|p| p.ends_with("series/two.JSON")));
}

/// Test that output folders of earlier runs are not searched for books
#[test]
fn test_findBookFiles_shouldSkipOutputDirectories() {
    let temp_dir = create_temp_dir().unwrap();
    let book = create_test_file(temp_dir.path(), "novel.txt", "# One\nText.\n").unwrap();
    let output_dir = FileManager::output_dir_for(&book);
    fs::create_dir(&output_dir).unwrap();
    create_test_file(&output_dir, "0001_One.txt", "Text.").unwrap();

    let found = FileManager::find_book_files(temp_dir.path()).unwrap();

    assert_eq!(output_dir, temp_dir.path().join("novel_audio"));
    assert_eq!(found, vec![book]);
}

/// Test that the searched directory itself may carry the output suffix
#[test]
fn test_findBookFiles_withRootNamedLikeOutput_shouldStillSearchIt() {
    let temp_dir = create_temp_dir().unwrap();
    let root = temp_dir.path().join("radio_audio");
    fs::create_dir(&root).unwrap();
    create_test_file(&root, "script.json", "{}").unwrap();

    let found = FileManager::find_book_files(&root).unwrap();

    assert_eq!(found.len(), 1);
}

/// Test that rewriting a file replaces it completely
#[test]
fn test_writeAtomic_overExistingFile_shouldReplaceContent() {
    let temp_dir = create_temp_dir().unwrap();
    let path = create_test_file(temp_dir.path(), "out.txt", "old content that is longer").unwrap();

    FileManager::write_to_file(&path, "new").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}

/// Test that chapter titles map to distinct, bounded file names
#[test]
fn test_makeSafeFilename_shouldStayWithinNameMax() {
    let names: Vec<String> = [
        "Prologue",
        "Chapter 1: Into the Woods",
        "What? Why/How*",
        &"Very long title ".repeat(40),
    ]
    .iter()
    .enumerate()
    .map(|(i, title)| make_safe_filename(i + 1, title, "mp3"))
    .collect();

    assert_eq!(names[0], "0001_Prologue.mp3");
    assert_eq!(names[1], "0002_Chapter_1__Into_the_Woods.mp3");
    assert_eq!(names[2], "0003_What__Why_How_.mp3");
    assert!(names[3].len() <= NAME_MAX);
    assert!(names[3].starts_with("0004_Very_long_title"));
    assert!(names.iter().all(|n| !n.contains('/')));
}
