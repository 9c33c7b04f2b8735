//! Application lifecycle: open storage, run module hooks and migrations, serve.

use std::future::Future;

use anyhow::Context;
use bookshelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use sqlx::SqlitePool;

use crate::modules;

/// Registry holding every project module
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry);
    registry
}

/// Open the pool, initialize modules and apply pending migrations.
///
/// Returns the pool and how many migrations this call applied.
pub async fn prepare(
    settings: &Settings,
    registry: &ModuleRegistry,
) -> anyhow::Result<(SqlitePool, usize)> {
    let db = bookshelf_db::connect(&settings.database)
        .await
        .context("failed to connect to database")?;

    let ctx = InitCtx { settings, db: &db };
    registry.init_modules(&ctx).await?;

    let migrations = registry.collect_migrations();
    let applied = bookshelf_db::apply_migrations(&db, &migrations)
        .await
        .context("failed to apply migrations")?;
    tracing::info!(applied, total = migrations.len(), "migrations complete");

    Ok((db, applied))
}

/// Apply pending migrations and exit
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let registry = registry();
    let (db, applied) = prepare(settings, &registry).await?;
    db.close().await;
    Ok(applied)
}

/// Run the HTTP service until `shutdown` resolves
pub async fn serve<F>(settings: &Settings, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = registry();
    let (db, _) = prepare(settings, &registry).await?;
    let ctx = InitCtx { settings, db: &db };

    registry.start_modules(&ctx).await?;

    let served = bookshelf_http::start_server(&registry, &ctx, shutdown).await;

    // Stop modules and release storage even when the server failed.
    let stopped = registry.stop_modules().await;
    db.close().await;
    tracing::info!("bookshelf shutdown complete");

    served.and(stopped)
}
