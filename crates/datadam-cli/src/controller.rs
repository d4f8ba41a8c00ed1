use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use datadam_core::{Backend, BackendFactory, BackendRegistry, DamConfig};
use datadam_dispatch::{DispatchError, Dispatcher, DispatcherSettings, LaneReport};
use datadam_generate::{Generator, GeneratorSettings, MemoryFactory, MemoryStore};
use datadam_mysql::MySqlFactory;

use crate::CliError;

/// Backends selectable through `db-config.kind`.
pub fn default_registry(config: &DamConfig) -> Result<BackendRegistry, CliError> {
    let factories: Vec<Arc<dyn BackendFactory>> = vec![
        Arc::new(MySqlFactory),
        Arc::new(MemoryFactory::new(MemoryStore::with_sample_schema(&config.schemas))),
    ];
    Ok(BackendRegistry::new(factories)?)
}

/// Outcome of a finished run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub submitted: u64,
    pub reports: Vec<LaneReport>,
}

/// Wires the generator to the dispatcher for the lifetime of one run.
pub struct Controller {
    config: DamConfig,
    registry: BackendRegistry,
}

impl Controller {
    pub fn new(config: DamConfig, registry: BackendRegistry) -> Self {
        Self { config, registry }
    }

    /// Generate and dispatch until the configured duration elapses or
    /// `shutdown` fires. An elapsed duration drains the lanes through a
    /// flush; `shutdown` stops them right away.
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary, CliError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now();
        let timer = Instant::now();
        let db = &self.config.db_config;
        info!(
            event = "run_started",
            run_id = %run_id,
            version = env!("CARGO_PKG_VERSION"),
            backend = %db.kind,
            started_at = %started_at.to_rfc3339(),
        );

        let settings = DispatcherSettings::from_config(&self.config)?;
        let limit = self.config.run_duration()?;

        let mut generator = Generator::new(
            self.registry.create(db).await?,
            GeneratorSettings::from(&self.config),
        )?;
        let tables = generator.prepare().await?;
        info!(event = "generator_ready", tables);

        let mut backends: Vec<Box<dyn Backend>> = Vec::with_capacity(settings.workers + 1);
        for _ in 0..=settings.workers {
            backends.push(self.registry.create(db).await?);
        }

        let lanes_cancel = CancellationToken::new();
        let (dispatcher, lanes) = Dispatcher::new(settings, backends, lanes_cancel.clone())?;
        let lanes = tokio::spawn(lanes.run());

        let stop = shutdown.child_token();
        if let Some(limit) = limit {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                stop.cancel();
            });
        }

        let outcome = generate(&mut generator, &dispatcher, &stop).await;
        let interrupted = shutdown.is_cancelled();
        stop.cancel();
        if let Err(err) = generator.close().await {
            warn!(error = %err, "closing generator backend failed");
        }

        // A signal skips the flush: queues may be full behind a stuck backend.
        let flushed = if interrupted {
            dispatcher.abort();
            Ok(())
        } else {
            dispatcher.shutdown().await
        };
        lanes_cancel.cancel();
        let reports = lanes.await?;
        for report in &reports {
            info!(
                event = "lane_report",
                lane = report.lane,
                role = %report.role,
                executed = report.executed,
                batches = report.batches,
                failed_batches = report.failed_batches,
                dropped = report.dropped,
            );
        }

        let submitted = outcome?;
        flushed?;
        info!(
            event = "run_finished",
            run_id = %run_id,
            submitted,
            duration_ms = timer.elapsed().as_millis() as u64,
        );
        Ok(RunSummary {
            run_id,
            submitted,
            reports,
        })
    }
}

/// Feed payloads to the dispatcher until `stop` fires, abandoning a submit
/// that is still waiting for queue space or the DDL barrier. Returns how many
/// were submitted.
async fn generate(
    generator: &mut Generator,
    dispatcher: &Dispatcher,
    stop: &CancellationToken,
) -> Result<u64, CliError> {
    let mut submitted = 0;
    while let Some(params) = generator.next(stop).await? {
        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = dispatcher.submit(params) => result,
        };
        match result {
            Ok(()) => submitted += 1,
            Err(DispatchError::Cancelled) => break,
            Err(DispatchError::Backend(err)) => {
                error!(error = %err, "ddl failed, continuing");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(submitted)
}
