use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

mod analytics;
mod auth;
mod config;
mod connectors;
mod db;
mod error;
mod models;
mod report;
mod routes;
mod state;
mod summarizer;

use config::Config;
use models::ReportType;
use state::State;

#[derive(Parser)]
#[command(name = "orthodash")]
#[command(about = "Practice analytics dashboard backend for orthodontic groups", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample locations and acquisition costs
    Seed,
    /// Import acquisition costs from a CSV file
    ImportCosts {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Delete expired analytics cache rows and login sessions
    PruneCache,
    /// Render a saved session to markdown, or PDF when OUT ends in .pdf
    Report {
        #[arg(long)]
        session: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("orthodash=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    match cli.command {
        Commands::Serve => serve(&database_url).await?,
        Commands::InitDb => {
            let pool = db::connect(&database_url).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = db::connect(&database_url).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportCosts { csv } => {
            let pool = db::connect(&database_url).await?;
            let outcome = db::costs::import_csv(&pool, &csv).await?;
            println!(
                "Imported {} cost rows from {} ({} skipped).",
                outcome.upserted,
                csv.display(),
                outcome.skipped
            );
        }
        Commands::PruneCache => {
            let config = Config::from_env()?;
            let pool = db::connect(&database_url).await?;
            let cache_rows = db::cache::prune_expired(&pool, config.cache_ttl).await?;
            let logins = db::users::delete_expired_auth_sessions(&pool).await?;
            println!("Removed {cache_rows} cache rows and {logins} expired logins.");
        }
        Commands::Report { session, out } => {
            let pool = db::connect(&database_url).await?;
            let saved = db::sessions::get_session_any_owner(&pool, session)
                .await?
                .ok_or_else(|| anyhow!("session {session} not found"))?;

            let report_type = match out.extension().and_then(|ext| ext.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("pdf") => ReportType::Pdf,
                _ => ReportType::Markdown,
            };
            std::fs::write(&out, report::render(&saved, report_type))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn serve(database_url: &str) -> anyhow::Result<()> {
    info!("Initializing state...");
    let config = Config::from_env()?;
    let pool = db::connect_lazy(database_url)?;
    let state = State::new(config, pool);

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = routes::router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
