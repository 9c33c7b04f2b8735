use anyhow::Context;
use clap::{Parser, Subcommand};

use bookshelf_kernel::settings::Settings;

/// Bookshelf catalogue service
#[derive(Debug, Parser)]
#[command(name = "bookshelf", version, about)]
struct Cli {
    /// Environment to load (`local`, `staging` or `production`); overrides BOOKSHELF_ENV
    #[arg(long, global = true)]
    env: Option<String>,

    /// Directory holding `base.toml` and per-environment overlays
    #[arg(long, global = true)]
    config_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply migrations and serve the HTTP API (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        if self.env.is_none() && self.config_dir.is_none() {
            return Settings::load();
        }

        let environment = match &self.env {
            Some(env) => env.clone(),
            None => std::env::var("BOOKSHELF_ENV").unwrap_or_else(|_| "local".to_string()),
        };
        let config_dir = match &self.config_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };

        Settings::load_from(&config_dir, &environment)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli
        .settings()
        .with_context(|| "failed to load bookshelf settings")?;
    bookshelf_telemetry::init(&settings.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(env = ?settings.environment, "starting bookshelf service");
            bookshelf_app::serve(&settings, bookshelf_http::shutdown_signal()).await
        }
        Command::Migrate => {
            let applied = bookshelf_app::migrate(&settings).await?;
            tracing::info!(applied, "migrations finished");
            println!("applied {applied} migration(s)");
            Ok(())
        }
    }
}
