use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use badminton_draws::config::Config;
use badminton_draws::db::{create_pool, health_check, run_migrations};
use badminton_draws::store::PgDrawStore;
use badminton_draws::telemetry::init_telemetry;
use badminton_draws::{DrawError, DrawService};

/// Audit every stored draw and exit non-zero when any match graph is corrupt.
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize telemetry
    init_telemetry(&config.log.rust_log);

    // Create database pool
    let db_pool = create_pool(&config)
        .await
        .context("Failed to create database pool")?;
    health_check(&db_pool)
        .await
        .context("Database health check failed")?;
    run_migrations(&db_pool)
        .await
        .context("Failed to apply migrations")?;

    let service = DrawService::new(Arc::new(PgDrawStore::new(db_pool)), config.draws.clone());

    let keys = service.list_draws().await?;
    tracing::info!(draws = keys.len(), "Auditing draws");

    let mut corrupt = 0usize;
    for key in &keys {
        match service.audit_draw(*key).await {
            Ok(()) => {}
            Err(DrawError::CorruptBracket(_)) => corrupt += 1,
            Err(e) => return Err(e).with_context(|| format!("Failed to audit draw {}", key)),
        }
    }

    if corrupt > 0 {
        tracing::error!(corrupt, total = keys.len(), "Corrupt draws found");
        return Ok(ExitCode::FAILURE);
    }

    tracing::info!(total = keys.len(), "All draws passed audit");
    Ok(ExitCode::SUCCESS)
}
