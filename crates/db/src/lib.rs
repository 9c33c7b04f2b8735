//! SQLite pool factory and migration runner.

use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use bookshelf_kernel::settings::DatabaseSettings;
use bookshelf_kernel::Migration;

const MIGRATIONS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS _bookshelf_migrations (
    module TEXT NOT NULL,
    id TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    PRIMARY KEY (module, id)
);";

/// Open a connection pool for the configured database.
///
/// File databases are created when missing. An in-memory database lives only as
/// long as its connection, so in-memory pools hold exactly one connection that
/// is never recycled.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<SqlitePool> {
    let started_at = Instant::now();
    let acquire_timeout = Duration::from_millis(settings.acquire_timeout_ms);

    let options = SqliteConnectOptions::from_str(&settings.url)
        .with_context(|| format!("invalid database url '{}'", settings.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(acquire_timeout);

    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(acquire_timeout);
    pool_options = if settings.is_in_memory() {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(settings.max_connections.max(1))
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database '{}'", settings.url))?;

    tracing::info!(
        target: "bookshelf-db",
        url = %settings.url,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "database pool ready"
    );

    Ok(pool)
}

/// Open a private in-memory database, mainly for tests.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    connect(&DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        ..DatabaseSettings::default()
    })
    .await
}

/// Apply every migration that has not been recorded yet.
///
/// Each migration runs in its own transaction together with its bookkeeping row.
/// Returns the number of migrations applied by this call.
pub async fn apply_migrations(
    pool: &SqlitePool,
    migrations: &[(String, Migration)],
) -> anyhow::Result<usize> {
    sqlx::raw_sql(MIGRATIONS_TABLE_SQL)
        .execute(pool)
        .await
        .context("failed to create migrations table")?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let already_applied: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM _bookshelf_migrations WHERE module = ?1 AND id = ?2",
        )
        .bind(module)
        .bind(migration.id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to check migration {}/{}", module, migration.id))?;

        if already_applied > 0 {
            tracing::debug!(target: "bookshelf-db", %module, id = migration.id, "migration already applied");
            continue;
        }

        let mut tx = pool.begin().await.context("failed to open migration transaction")?;
        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {}/{} failed", module, migration.id))?;
        sqlx::query(
            "INSERT INTO _bookshelf_migrations (module, id, applied_at)
             VALUES (?1, ?2, strftime('%s', 'now'))",
        )
        .bind(module)
        .bind(migration.id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to record migration {}/{}", module, migration.id))?;
        tx.commit()
            .await
            .with_context(|| format!("failed to commit migration {}/{}", module, migration.id))?;

        tracing::info!(target: "bookshelf-db", %module, id = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widgets_migrations() -> Vec<(String, Migration)> {
        vec![
            (
                "widgets".to_string(),
                Migration {
                    id: "001_init",
                    up: "CREATE TABLE widgets (id TEXT PRIMARY KEY NOT NULL);",
                },
            ),
            (
                "widgets".to_string(),
                Migration {
                    id: "002_seed",
                    up: "INSERT INTO widgets (id) VALUES ('a'); INSERT INTO widgets (id) VALUES ('b');",
                },
            ),
        ]
    }

    #[tokio::test]
    async fn in_memory_pool_keeps_state_between_queries() {
        let pool = connect_in_memory().await.unwrap();

        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let pool = connect_in_memory().await.unwrap();
        let migrations = widgets_migrations();

        assert_eq!(apply_migrations(&pool, &migrations).await.unwrap(), 2);
        assert_eq!(apply_migrations(&pool, &migrations).await.unwrap(), 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM widgets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn failed_migration_is_not_recorded() {
        let pool = connect_in_memory().await.unwrap();
        let migrations = vec![(
            "broken".to_string(),
            Migration {
                id: "001_init",
                up: "CREATE TABLE broken (id TEXT); NOT VALID SQL;",
            },
        )];

        let err = apply_migrations(&pool, &migrations).await.unwrap_err();
        assert!(err.to_string().contains("broken/001_init"));

        let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _bookshelf_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recorded, 0);
    }
}
