use serde::{Deserialize, Serialize};

/// A catalogued book, keyed by its ISBN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(deny_unknown_fields)]
pub struct Book {
    /// Natural key of the book
    pub isbn: String,
    /// Product page on Amazon
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    /// Year of publication
    pub year: i64,
}

/// `{"book": ...}` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book: Book,
}

/// `{"books": [...]}` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

/// `{"message": ...}` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
