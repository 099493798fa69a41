/*!
 * Document model and book loading.
 *
 * This module contains the in-memory representation of a book:
 * - `model`: the Text/Break/Quote node tree, chapters and books
 * - `loader`: reading books from JSON or plain-text files
 */

pub mod loader;
pub mod model;

pub use loader::{NewlineMode, load_book, parse_plain_text};
pub use model::{Book, Chapter, DocumentNode};
