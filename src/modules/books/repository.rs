//! Book persistence over the `books` table.
//!
//! Every operation is a single SQL statement touching at most one row, so no
//! explicit transactions or locking are needed.

use async_trait::async_trait;
use bookshelf_http::error::AppError;
use sqlx::SqlitePool;
use thiserror::Error;

use super::models::Book;

const BOOK_COLUMNS: &str = "isbn, amazon_url, author, language, pages, publisher, title, year";

pub type RepoResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("book {0} not found")]
    NotFound(String),

    #[error("book {0} already exists")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::not_found(err.to_string()),
            RepositoryError::Conflict(ref isbn) => AppError::conflict(
                vec![serde_json::json!({"field": "isbn", "error": format!("{isbn} is already taken")})],
                err.to_string(),
            ),
            RepositoryError::Storage(_) => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}

/// Storage operations on books, keyed by ISBN.
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn list(&self) -> RepoResult<Vec<Book>>;
    async fn get(&self, isbn: &str) -> RepoResult<Book>;
    async fn create(&self, book: &Book) -> RepoResult<Book>;
    /// Replace every non-key field of the book stored under `isbn`.
    async fn update(&self, isbn: &str, book: &Book) -> RepoResult<Book>;
    async fn delete(&self, isbn: &str) -> RepoResult<()>;
}

/// SQLite-backed book repository.
#[derive(Clone)]
pub struct SqliteBookRepository {
    pool: SqlitePool,
}

impl SqliteBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookRepository for SqliteBookRepository {
    async fn list(&self) -> RepoResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!("SELECT {BOOK_COLUMNS} FROM books"))
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn get(&self, isbn: &str) -> RepoResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE isbn = ?1"))
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(isbn.to_string()))
    }

    async fn create(&self, book: &Book) -> RepoResult<Book> {
        let result = sqlx::query_as::<_, Book>(&format!(
            "INSERT INTO books ({BOOK_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&book.isbn)
        .bind(&book.amazon_url)
        .bind(&book.author)
        .bind(&book.language)
        .bind(book.pages)
        .bind(&book.publisher)
        .bind(&book.title)
        .bind(book.year)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RepositoryError::Conflict(book.isbn.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, isbn: &str, book: &Book) -> RepoResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            "UPDATE books
             SET
                amazon_url = ?1,
                author = ?2,
                language = ?3,
                pages = ?4,
                publisher = ?5,
                title = ?6,
                year = ?7
             WHERE isbn = ?8
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&book.amazon_url)
        .bind(&book.author)
        .bind(&book.language)
        .bind(book.pages)
        .bind(&book.publisher)
        .bind(&book.title)
        .bind(book.year)
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(isbn.to_string()))
    }

    async fn delete(&self, isbn: &str) -> RepoResult<()> {
        let deleted = sqlx::query("DELETE FROM books WHERE isbn = ?1")
            .bind(isbn)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(RepositoryError::NotFound(isbn.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::test_support::{book, migrated_pool};

    async fn repository() -> SqliteBookRepository {
        SqliteBookRepository::new(migrated_pool().await)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = repository().await;
        let original = book("456");

        let created = repo.create(&original).await.unwrap();
        assert_eq!(created, original);
        assert_eq!(repo.get("456").await.unwrap(), original);
    }

    #[tokio::test]
    async fn missing_isbn_is_not_found() {
        let repo = repository().await;

        assert!(matches!(repo.get("0").await, Err(RepositoryError::NotFound(isbn)) if isbn == "0"));
        assert!(matches!(repo.delete("0").await, Err(RepositoryError::NotFound(_))));
        assert!(matches!(
            repo.update("0", &book("0")).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_returns_the_single_stored_book() {
        let repo = repository().await;
        assert!(repo.list().await.unwrap().is_empty());

        let stored = repo.create(&book("12345")).await.unwrap();
        assert_eq!(repo.list().await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn update_replaces_all_fields_and_keeps_isbn() {
        let repo = repository().await;
        repo.create(&book("12345")).await.unwrap();

        let replacement = Book {
            isbn: "ignored".to_string(),
            amazon_url: "http://a.co/new".to_string(),
            author: "New Author".to_string(),
            language: "german".to_string(),
            pages: 99,
            publisher: "New Publisher".to_string(),
            title: "New Title".to_string(),
            year: 1999,
        };

        let updated = repo.update("12345", &replacement).await.unwrap();
        let expected = Book {
            isbn: "12345".to_string(),
            ..replacement
        };
        assert_eq!(updated, expected);
        assert_eq!(repo.get("12345").await.unwrap(), expected);
        assert!(matches!(repo.get("ignored").await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_the_book() {
        let repo = repository().await;
        repo.create(&book("12345")).await.unwrap();
        repo.create(&book("456")).await.unwrap();

        repo.delete("12345").await.unwrap();

        assert!(matches!(repo.get("12345").await, Err(RepositoryError::NotFound(_))));
        let remaining: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.isbn)
            .collect();
        assert_eq!(remaining, vec!["456".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_isbn_is_a_conflict() {
        let repo = repository().await;
        repo.create(&book("456")).await.unwrap();

        let err = repo.create(&book("456")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(ref isbn) if isbn == "456"));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_internal_errors() {
        let pool = migrated_pool().await;
        pool.close().await;
        let repo = SqliteBookRepository::new(pool);

        let err = repo.list().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Storage(_)));
        assert!(matches!(AppError::from(err), AppError::Internal(_)));
    }
}
