//! HTTP handlers for the books module.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bookshelf_http::error::AppError;

use super::models::{Book, BookResponse, BooksResponse, MessageResponse};
use super::repository::BookRepository;
use super::validation::{validate_book, BookPayload};

pub type SharedRepository = Arc<dyn BookRepository>;

pub const DELETED_MESSAGE: &str = "Book deleted";

/// Routes for the books module, relative to its mount point.
pub fn router(repository: SharedRepository) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{isbn}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(repository)
}

async fn list_books(
    State(repository): State<SharedRepository>,
) -> Result<Json<BooksResponse>, AppError> {
    let books = repository.list().await?;
    tracing::debug!(module = "books", count = books.len(), "books listed");
    Ok(Json(BooksResponse { books }))
}

async fn get_book(
    State(repository): State<SharedRepository>,
    Path(isbn): Path<String>,
) -> Result<Json<BookResponse>, AppError> {
    let book = repository.get(&isbn).await?;
    Ok(Json(BookResponse { book }))
}

async fn create_book(
    State(repository): State<SharedRepository>,
    payload: Result<Json<BookPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let book = parse_book(payload)?;
    let book = repository.create(&book).await?;

    tracing::info!(module = "books", isbn = %book.isbn, "book created");
    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

async fn update_book(
    State(repository): State<SharedRepository>,
    Path(isbn): Path<String>,
    payload: Result<Json<BookPayload>, JsonRejection>,
) -> Result<Json<BookResponse>, AppError> {
    let book = parse_book(payload)?;
    let book = repository.update(&isbn, &book).await?;

    tracing::info!(module = "books", isbn = %book.isbn, "book updated");
    Ok(Json(BookResponse { book }))
}

async fn delete_book(
    State(repository): State<SharedRepository>,
    Path(isbn): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    repository.delete(&isbn).await?;

    tracing::info!(module = "books", isbn = %isbn, "book deleted");
    Ok(Json(MessageResponse {
        message: DELETED_MESSAGE.to_string(),
    }))
}

/// Validate a raw body and turn it into a [`Book`]; the repository is never
/// reached with an invalid payload.
fn parse_book(payload: Result<Json<BookPayload>, JsonRejection>) -> Result<Book, AppError> {
    let Json(BookPayload(payload)) = payload?;
    validate_book(&payload)?;
    serde_json::from_value(payload).map_err(|err| AppError::bad_request(err.to_string()))
}
