//! CLI entry point for the NetGuard REST API.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netguard_anomaly::{AnomalyConfig, AnomalyEngine};
use netguard_core::config::{layered, section, DEFAULT_CONFIG_PREFIX};
use netguard_core::events::{EventSink, FanoutSink, LogSink, MemorySink};
use netguard_discover::probe::TcpConnectScanner;
use netguard_discover::{scanner, DiscoverConfig, HostScanner, ScanPipeline};
use netguard_journal::{FileJournalStore, JournalStore};
use netguard_store::{DatabaseConfig, MemoryStore, PgStore, Store};
use netguard_vuln::{FindingAggregator, VulnConfig};

use netguard_api::{server, ApiConfig, AppState};

#[derive(Parser)]
#[command(name = "netguard-api")]
#[command(about = "REST API for NetGuard scans, findings, and anomalies")]
struct Cli {
    /// Listen address (otherwise read from config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Keep everything in memory instead of PostgreSQL.
    #[arg(long)]
    memory: bool,

    /// Config file prefix (default: netguard).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PREFIX)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let cfg = layered(&cli.config)?;
    let api_config: ApiConfig = section(&cfg, "api")?;
    let discover_config: DiscoverConfig = section(&cfg, "discover")?;
    let vuln_config: VulnConfig = section(&cfg, "vuln")?;
    let anomaly_config: AnomalyConfig = section(&cfg, "anomaly")?;

    let store: Arc<dyn Store> = if cli.memory {
        tracing::warn!("Using in-memory store; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let store = PgStore::connect(&DatabaseConfig::load(&cli.config)?).await?;
        store.migrate().await?;
        tracing::info!("Connected to PostgreSQL");
        Arc::new(store)
    };

    let recent = Arc::new(MemorySink::new(api_config.event_buffer));
    let events: Arc<dyn EventSink> =
        Arc::new(FanoutSink::new().with(Arc::new(LogSink)).with(recent.clone()));

    let host_scanner: Arc<dyn HostScanner> = match scanner::from_config(&discover_config).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Configured scanner unavailable, using TCP connect scanner");
            Arc::new(TcpConnectScanner::from_config(&discover_config.tcp))
        }
    };

    let journal: Option<Arc<dyn JournalStore>> = match FileJournalStore::new(&discover_config.journal_dir) {
        Ok(j) => Some(Arc::new(j)),
        Err(e) => {
            tracing::warn!(error = %e, "Journal disabled: failed to open journal store");
            None
        }
    };

    let mut pipeline = ScanPipeline::new(store.clone(), host_scanner, events.clone())
        .with_aggregator(Arc::new(FindingAggregator::from_config(&vuln_config)?))
        .with_stale_threshold_hours(discover_config.stale_threshold_hours);
    let mut anomaly = AnomalyEngine::new(store.clone(), events).with_config(anomaly_config);
    if let Some(journal) = journal {
        pipeline = pipeline.with_journal(journal.clone());
        anomaly = anomaly.with_journal(journal);
    }

    let state = AppState::new(store, Arc::new(pipeline), Arc::new(anomaly), recent);
    let bind = cli.bind.unwrap_or(api_config.bind);
    server::serve(&bind, state).await
}
