//! CLI entry point for the netguard-discover scanner.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netguard_core::config::{layered, section, DEFAULT_CONFIG_PREFIX};
use netguard_core::events::LogSink;
use netguard_core::{OrgId, ScanType};
use netguard_journal::{FileJournalStore, JournalStore};
use netguard_store::{ensure_organization, DatabaseConfig, MemoryStore, PgStore, Store};
use netguard_vuln::{FindingAggregator, VulnConfig};

use netguard_discover::config::{DiscoverConfig, ScanProfile, ScannerKind};
use netguard_discover::pipeline::{ScanPipeline, ScanRequest};
use netguard_discover::scanner;
use netguard_discover::scheduler::ScanScheduler;

#[derive(Parser)]
#[command(name = "netguard-discover")]
#[command(about = "Device discovery and port/service scanner for NetGuard")]
struct Cli {
    /// Target to scan (CIDR notation, e.g., 10.0.1.0/24).
    #[arg(short, long)]
    target: Option<String>,

    /// Scan profile: quick, standard, deep.
    #[arg(short, long, default_value = "standard")]
    profile: String,

    /// Scan type: network (discovery only) or security (adds findings).
    #[arg(long, default_value = "security")]
    scan_type: String,

    /// Run a single one-shot scan and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled scans.
    #[arg(long)]
    daemon: bool,

    /// Override tenant ID (otherwise read from config).
    #[arg(long)]
    tenant_id: Option<String>,

    /// Scanner backend: nmap or tcp (otherwise read from config).
    #[arg(long)]
    scanner: Option<String>,

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
    if cli.once == cli.daemon {
        anyhow::bail!("Specify --once (one-shot scan) or --daemon (scheduled scanning)");
    }

    let cfg = layered(&cli.config)?;
    let mut discover_config: DiscoverConfig = section(&cfg, "discover")?;
    let vuln_config: VulnConfig = section(&cfg, "vuln")?;
    if let Some(kind) = &cli.scanner {
        discover_config.scanner = kind.parse::<ScannerKind>()?;
    }

    let org = resolve_tenant_id(&cli, &discover_config)?;
    let store = open_store(&cli).await?;
    ensure_organization(store.as_ref(), &org, "default").await?;

    let scanner = scanner::from_config(&discover_config).await?;
    let aggregator = FindingAggregator::from_config(&vuln_config)?;
    tracing::info!(signatures = aggregator.catalog().len(), "Vulnerability catalog loaded");

    let mut pipeline = ScanPipeline::new(store, scanner, Arc::new(LogSink))
        .with_aggregator(Arc::new(aggregator))
        .with_stale_threshold_hours(discover_config.stale_threshold_hours);
    match FileJournalStore::new(&discover_config.journal_dir) {
        Ok(journal) => {
            let journal: Arc<dyn JournalStore> = Arc::new(journal);
            pipeline = pipeline.with_journal(journal);
        }
        Err(e) => tracing::warn!(error = %e, "Journal disabled: failed to open journal store"),
    }
    let pipeline = Arc::new(pipeline);

    if cli.once {
        let target = cli
            .target
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--target is required in --once mode"))?;
        let request = ScanRequest::new(
            target,
            cli.scan_type.parse::<ScanType>()?,
            cli.profile.parse::<ScanProfile>()?,
        );

        let report = pipeline.run(&org, &request).await?;
        tracing::info!(
            scan_id = %report.scan.id,
            devices = report.summary.total_scanned,
            new = report.summary.new_count,
            offline = report.summary.offline_count,
            findings = report.findings.len(),
            "One-shot scan finished"
        );
    } else {
        if discover_config.subnets.is_empty() {
            anyhow::bail!("No subnets configured: add [[discover.subnets]] entries for --daemon");
        }
        let scheduler = ScanScheduler::new(discover_config, pipeline, org);
        scheduler.run().await?;
    }

    Ok(())
}

fn resolve_tenant_id(cli: &Cli, config: &DiscoverConfig) -> anyhow::Result<OrgId> {
    let raw = cli.tenant_id.as_deref().unwrap_or(&config.tenant_id);
    if raw.is_empty() {
        anyhow::bail!("Tenant ID required: set --tenant-id or discover.tenant_id in config");
    }
    Ok(OrgId::parse(raw)?)
}

async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn Store>> {
    if cli.memory {
        tracing::warn!("Using in-memory store; results are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let db_config = DatabaseConfig::load(&cli.config)?;
    let store = PgStore::connect(&db_config).await?;
    store.migrate().await?;
    tracing::info!("Connected to PostgreSQL");
    Ok(Arc::new(store))
}
