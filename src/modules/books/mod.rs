pub mod models;
pub mod repository;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bookshelf_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use repository::SqliteBookRepository;

/// Books module: CRUD over the `books` table
pub struct BooksModule;

impl BooksModule {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for BooksModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self, ctx: &InitCtx<'_>) -> Router {
        routes::router(Arc::new(SqliteBookRepository::new(ctx.db.clone())))
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_create_books",
            up: r#"
                CREATE TABLE IF NOT EXISTS books (
                    isbn       TEXT PRIMARY KEY NOT NULL,
                    amazon_url TEXT NOT NULL,
                    author     TEXT NOT NULL,
                    language   TEXT NOT NULL,
                    pages      INTEGER NOT NULL,
                    publisher  TEXT NOT NULL,
                    title      TEXT NOT NULL,
                    year       INTEGER NOT NULL
                );
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module() -> Arc<dyn Module> {
    Arc::new(BooksModule::new())
}

fn json_content(schema_ref: &str) -> serde_json::Value {
    json!({
        "application/json": {
            "schema": { "$ref": format!("#/components/schemas/{schema_ref}") }
        }
    })
}

fn error_response(description: &str) -> serde_json::Value {
    json!({ "description": description, "content": json_content("ErrorResponse") })
}

fn openapi_fragment() -> serde_json::Value {
    let isbn_param = json!({
        "name": "isbn",
        "in": "path",
        "required": true,
        "schema": { "type": "string" }
    });
    let required: Vec<&str> = validation::BOOK_SCHEMA.iter().map(|(name, _)| *name).collect();

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "responses": {
                        "200": { "description": "All books", "content": json_content("BooksResponse") },
                        "500": error_response("Internal server error")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": { "required": true, "content": json_content("Book") },
                    "responses": {
                        "201": { "description": "Book created", "content": json_content("BookResponse") },
                        "400": error_response("Invalid book payload"),
                        "409": error_response("ISBN already exists")
                    }
                }
            },
            "/{isbn}": {
                "get": {
                    "summary": "Get a book by ISBN",
                    "tags": ["Books"],
                    "parameters": [isbn_param.clone()],
                    "responses": {
                        "200": { "description": "The book", "content": json_content("BookResponse") },
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Replace a book",
                    "tags": ["Books"],
                    "parameters": [isbn_param.clone()],
                    "requestBody": { "required": true, "content": json_content("Book") },
                    "responses": {
                        "200": { "description": "Book updated", "content": json_content("BookResponse") },
                        "400": error_response("Invalid book payload"),
                        "404": error_response("Book not found")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [isbn_param],
                    "responses": {
                        "200": { "description": "Book deleted", "content": json_content("MessageResponse") },
                        "404": error_response("Book not found")
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "isbn": { "type": "string", "minLength": 1 },
                        "amazon_url": { "type": "string", "format": "uri" },
                        "author": { "type": "string" },
                        "language": { "type": "string" },
                        "pages": { "type": "integer", "format": "int64" },
                        "publisher": { "type": "string" },
                        "title": { "type": "string" },
                        "year": { "type": "integer", "format": "int64" }
                    },
                    "required": required,
                    "additionalProperties": false
                },
                "BookResponse": {
                    "type": "object",
                    "properties": { "book": { "$ref": "#/components/schemas/Book" } },
                    "required": ["book"]
                },
                "BooksResponse": {
                    "type": "object",
                    "properties": {
                        "books": { "type": "array", "items": { "$ref": "#/components/schemas/Book" } }
                    },
                    "required": ["books"]
                },
                "MessageResponse": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }
            }
        }
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_schema_requires_every_book_field() {
        let fragment = openapi_fragment();
        let required = fragment["components"]["schemas"]["Book"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), validation::BOOK_SCHEMA.len());
        assert!(fragment["paths"]["/{isbn}"]["delete"].is_object());
    }

    #[tokio::test]
    async fn migrations_create_books_table() {
        let pool = test_support::migrated_pool().await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
