//! Auditor - proof-of-storage audit service.

use anyhow::{bail, Context, Result};
use auditor::api;
use auditor::audit::{AuditLocks, AuditScheduler, ProofOrchestrator};
use auditor::commit::commit_block;
use auditor::config::{self, AuditorConfig};
use auditor::ledger::{HttpLedger, Ledger};
use auditor::prover::ZokratesProver;
use auditor::reporter::LedgerReporter;
use auditor::reporting::{run_reporting_loop, LogReportSink};
use auditor::storage::{BlockRef, FsBlockStore};
use clap::{Parser, Subcommand};
use pos_merkle::{derive, is_uninitialized, Seed};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Auditor - proof-of-storage audit service")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reporting loop and health API (default)
    Run,
    /// Commit a block: upload its digest, then finalize it
    Commit {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        block_id: u64,
        /// File holding the block bytes
        file: PathBuf,
    },
    /// Print the chunk indices challenged for a block
    Challenges {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        block_id: u64,
        /// Hex seed to use instead of querying the ledger
        #[arg(long)]
        seed: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    config.validate()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Commit {
            pool,
            block_id,
            file,
        } => commit(config, pool, block_id, file).await,
        Command::Challenges {
            pool,
            block_id,
            seed,
        } => challenges(config, pool, block_id, seed).await,
    }
}

fn http_ledger(config: &AuditorConfig) -> Result<Arc<HttpLedger>> {
    Ok(Arc::new(HttpLedger::new(
        &config.ledger_url,
        config.ledger_api_key.clone(),
        Duration::from_secs(config.ledger_timeout_secs),
    )?))
}

async fn run(config: AuditorConfig) -> Result<()> {
    let layout = config.layout()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.listen_addr,
        pools = config.pools.len(),
        chunk_size = layout.chunk_size(),
        chunk_count = layout.chunk_count(),
        challenges = config.challenge_count,
        "Auditor starting"
    );

    let store = Arc::new(
        FsBlockStore::open(&config.data_dir)
            .with_context(|| format!("Failed to open block store {}", config.data_dir.display()))?,
    );
    let ledger = http_ledger(&config)?;
    let locks = AuditLocks::new();
    let reporter = Arc::new(LedgerReporter::new(ledger.clone(), locks.ledger.clone()));

    std::fs::create_dir_all(&config.prover_work_dir).with_context(|| {
        format!(
            "Failed to create prover work dir {}",
            config.prover_work_dir.display()
        )
    })?;
    let prover = Arc::new(ZokratesProver::new(
        &config.prover_binary,
        config.prover_work_dir.clone(),
        Duration::from_secs(config.prover_timeout_secs),
    ));

    let orchestrator = Arc::new(ProofOrchestrator::new(
        store.clone(),
        ledger,
        reporter.clone(),
        prover,
        locks,
        layout,
        config.challenge_count,
        config.effective_build_workers(),
    ));
    let scheduler = Arc::new(AuditScheduler::new(
        config.primary_pools.clone(),
        Duration::from_secs(config.audit_interval_secs),
    ));

    tokio::spawn(run_reporting_loop(
        store,
        scheduler.clone(),
        orchestrator.clone(),
        Arc::new(LogReportSink),
        config.pools.clone(),
        Duration::from_secs(config.report_interval_secs),
    ));

    let app = api::router(Arc::new(api::AppState {
        scheduler,
        orchestrator,
        reporter,
        pools: config.pools.clone(),
    }));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Auditor listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn commit(config: AuditorConfig, pool: String, block_id: u64, file: PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let store = Arc::new(FsBlockStore::open(&config.data_dir)?);
    let locks = AuditLocks::new();
    let reporter = LedgerReporter::new(http_ledger(&config)?, locks.ledger);

    let root = commit_block(
        store,
        &reporter,
        config.layout()?,
        BlockRef::new(pool, block_id),
        bytes,
    )
    .await?;
    println!("0x{}", hex::encode(root));
    Ok(())
}

async fn challenges(
    config: AuditorConfig,
    pool: String,
    block_id: u64,
    seed: Option<String>,
) -> Result<()> {
    let seed: Seed = match seed {
        Some(raw) => {
            let bytes = hex::decode(raw.trim_start_matches("0x")).context("Invalid seed hex")?;
            bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("Seed must be 32 bytes"))?
        }
        None => http_ledger(&config)?.get_seed(&pool).await?,
    };
    if is_uninitialized(&seed) {
        bail!("Seed for pool {} is not initialized", pool);
    }

    let layout = config.layout()?;
    let indices = derive(&seed, block_id, config.challenge_count, layout.chunk_count())?;
    for index in indices {
        println!("{}", index);
    }
    Ok(())
}
