//! UsageLens - GUI telemetry analytics server.

use std::sync::Arc;

use usagelens::database::Database;
use usagelens::query_config::ConfigStore;
use usagelens::server::{run_server, state::AppState};
use usagelens::service::AnalyticsService;
use usagelens::settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("usagelens=info")),
        )
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              UsageLens - Telemetry Analytics               ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let settings = Settings::from_env()?;

    println!("🔧 Initializing database...");
    let db = Database::open(&settings.db_path)?;
    println!("   ✓ Database ready ({} events)", db.event_count()?);

    let config = ConfigStore::new(settings.config_dir.clone());
    tracing::info!(dir = ?config.dir(), "Query configuration directory");

    let service = AnalyticsService::new(
        Arc::new(db),
        Arc::new(config),
        settings.clicks.clone(),
        settings.selections.clone(),
    );

    println!("🔧 Starting HTTP server on http://{}", settings.bind_addr());
    run_server(settings.bind_addr(), AppState::new(service)).await?;

    println!("👋 UsageLens stopped");
    Ok(())
}
