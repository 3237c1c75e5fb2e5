//! Vaccine scheduler command-line entry point.
//!
//! # Purpose
//! Wires configuration, observability, and storage, then drives the
//! interactive prompt over stdin/stdout until `quit` or end of input.
//!
//! # Notes
//! The `build_store` helper keeps wiring testable and minimizes main setup logic.
use anyhow::Context;
use clap::Parser;
use scheduler::app::{self, Scheduler};
use scheduler::config::{PostgresConfig, SchedulerConfig, StorageBackend};
use scheduler::observability;
use scheduler::store::{SchedulerStore, memory::InMemoryStore, postgres::PostgresStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

#[derive(Debug, Parser)]
#[command(name = "vaccine-scheduler", about = "Vaccine appointment scheduler")]
struct Args {
    /// YAML file overlaid on the environment configuration.
    #[arg(long)]
    config: Option<String>,
    #[arg(long, value_enum)]
    storage: Option<StorageBackend>,
    #[arg(long)]
    database_url: Option<String>,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_bind: Option<SocketAddr>,
    /// Skip the welcome banner.
    #[arg(long)]
    quiet: bool,
}

impl Args {
    fn resolve(self) -> anyhow::Result<SchedulerConfig> {
        let mut config = SchedulerConfig::from_env_or_yaml()?;
        if let Some(path) = &self.config {
            config.apply_yaml_file(path)?;
        }
        if let Some(storage) = self.storage {
            config.storage = storage;
        }
        if let Some(url) = self.database_url {
            match config.postgres.as_mut() {
                Some(pg) => pg.url = url,
                None => config.postgres = Some(PostgresConfig::with_url(url)),
            }
        }
        if let Some(addr) = self.metrics_bind {
            config.metrics_bind = Some(addr);
        }
        if self.quiet {
            config.show_banner = false;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().resolve().context("scheduler config")?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run_with_io(config, stdin, &mut stdout).await
}

async fn run_with_io<R, W>(config: SchedulerConfig, input: R, output: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let metrics_handle = observability::init_observability("vaccine-scheduler");
    let store = build_store(&config).await?;
    tracing::info!(
        backend = store.backend_name(),
        durable = store.is_durable(),
        "scheduler store ready"
    );

    let metrics_task = match (metrics_handle, config.metrics_bind) {
        (Some(handle), Some(addr)) => Some(tokio::spawn(async move {
            if let Err(err) = observability::serve_metrics(handle, addr).await {
                tracing::warn!(error = %err, %addr, "failed to serve metrics");
            }
        })),
        _ => None,
    };

    let mut scheduler = Scheduler::new(store);
    let result = app::run(&mut scheduler, input, output, config.show_banner)
        .await
        .context("command loop");

    if let Some(task) = metrics_task {
        task.abort();
        let _ = task.await;
    }
    result
}

async fn build_store(config: &SchedulerConfig) -> anyhow::Result<Arc<dyn SchedulerStore>> {
    let store: Arc<dyn SchedulerStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(PostgresStore::connect(pg).await?)
        }
    };
    store.health_check().await?;
    Ok(store)
}
