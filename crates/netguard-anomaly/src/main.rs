//! CLI entry point for the netguard-anomaly scorer.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netguard_core::config::{layered, section, DEFAULT_CONFIG_PREFIX};
use netguard_core::events::LogSink;
use netguard_core::OrgId;
use netguard_journal::{FileJournalStore, JournalStore};
use netguard_store::{DatabaseConfig, PgStore};

use netguard_anomaly::{AnomalyConfig, AnomalyEngine, ScoringReport};

#[derive(Parser)]
#[command(name = "netguard-anomaly")]
#[command(about = "Isolation Forest anomaly scoring for NetGuard telemetry")]
struct Cli {
    /// Score once and exit.
    #[arg(long)]
    once: bool,

    /// Score every organization on the configured interval.
    #[arg(long)]
    daemon: bool,

    /// Only score this tenant (otherwise read from config; empty means all).
    #[arg(long)]
    tenant_id: Option<String>,

    /// Config file prefix (default: netguard).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PREFIX)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.daemon {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    if cli.once == cli.daemon {
        anyhow::bail!("Specify --once (single scoring pass) or --daemon (periodic scoring)");
    }

    let cfg = layered(&cli.config)?;
    let anomaly_config: AnomalyConfig = section(&cfg, "anomaly")?;

    let db_config = DatabaseConfig::load(&cli.config)?;
    let store = PgStore::connect(&db_config).await?;
    store.migrate().await?;
    tracing::info!("Connected to PostgreSQL");

    let mut engine =
        AnomalyEngine::new(Arc::new(store), Arc::new(LogSink)).with_config(anomaly_config.clone());
    match FileJournalStore::new(&anomaly_config.journal_dir) {
        Ok(journal) => {
            let journal: Arc<dyn JournalStore> = Arc::new(journal);
            engine = engine.with_journal(journal);
        }
        Err(e) => tracing::warn!(error = %e, "Journal disabled: failed to open journal store"),
    }

    let tenant = match cli.tenant_id.as_deref().unwrap_or(&anomaly_config.tenant_id) {
        "" => None,
        raw => Some(OrgId::parse(raw)?),
    };

    if cli.daemon {
        engine.run_daemon(tenant).await;
        return Ok(());
    }

    let reports = engine.score_scope(tenant.as_ref()).await?;

    for report in &reports {
        match report {
            ScoringReport::Skipped {
                organization_id,
                samples,
                required,
            } => tracing::info!(
                org = %organization_id,
                samples,
                required,
                "Skipped: not enough telemetry"
            ),
            ScoringReport::Scored {
                organization_id,
                devices_scored,
                suppressed,
                anomalies,
                ..
            } => tracing::info!(
                org = %organization_id,
                devices_scored,
                suppressed,
                anomalies = anomalies.len(),
                "Scoring pass finished"
            ),
        }
    }

    Ok(())
}
