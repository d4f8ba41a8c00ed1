use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use datadam_core::{Backend, DmlParams, Error, OpKind, Result};

use crate::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneRole {
    Regular,
    Ddl,
}

impl fmt::Display for LaneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneRole::Regular => f.write_str("regular"),
            LaneRole::Ddl => f.write_str("ddl"),
        }
    }
}

/// Counters a lane hands back when it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneReport {
    pub lane: usize,
    pub role: LaneRole,
    /// Statements applied successfully, DDL included.
    pub executed: u64,
    /// Batches applied without error.
    pub batches: u64,
    /// Batches dropped after a statement failed.
    pub failed_batches: u64,
    /// Jobs discarded: the rest of failed batches plus whatever was still
    /// queued at cancellation.
    pub dropped: u64,
}

impl LaneReport {
    fn new(lane: usize, role: LaneRole) -> Self {
        Self {
            lane,
            role,
            executed: 0,
            batches: 0,
            failed_batches: 0,
            dropped: 0,
        }
    }
}

/// One worker: an exclusive queue, an exclusive backend and the pending
/// batch.
pub(crate) struct Lane {
    id: usize,
    role: LaneRole,
    backend: Box<dyn Backend>,
    rx: mpsc::Receiver<Job>,
    in_flight: Arc<watch::Sender<usize>>,
    batch: Vec<DmlParams>,
    batch_size: usize,
    flush_interval: Duration,
    report: LaneReport,
}

impl Lane {
    pub(crate) fn new(
        id: usize,
        role: LaneRole,
        backend: Box<dyn Backend>,
        rx: mpsc::Receiver<Job>,
        in_flight: Arc<watch::Sender<usize>>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            id,
            role,
            backend,
            rx,
            in_flight,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            flush_interval,
            report: LaneReport::new(id, role),
        }
    }

    /// Consume jobs until `cancel` fires or every sender is gone, then
    /// execute the pending batch once and close the backend.
    ///
    /// A batch that is executing when `cancel` fires is abandoned at the
    /// statement in progress.
    pub(crate) async fn run(mut self, cancel: CancellationToken) -> LaneReport {
        info!(
            event = "lane_started",
            lane = self.id,
            role = %self.role,
            engine = self.backend.engine(),
        );

        let idle = tokio::time::sleep(self.flush_interval);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => self.handle(job, idle.as_mut(), &cancel).await,
                    None => break,
                },
                _ = &mut idle => {
                    if !self.batch.is_empty() {
                        debug!(lane = self.id, pending = self.batch.len(), "idle flush");
                    }
                    self.execute_batch(idle.as_mut(), Some(&cancel)).await;
                }
            }
        }

        self.execute_batch(idle.as_mut(), None).await;
        self.discard_queued();
        if let Err(err) = self.backend.close().await {
            warn!(lane = self.id, error = %err, "closing backend failed");
        }

        info!(
            event = "lane_stopped",
            lane = self.id,
            role = %self.role,
            executed = self.report.executed,
            failed_batches = self.report.failed_batches,
            dropped = self.report.dropped,
        );
        self.report
    }

    async fn handle(&mut self, job: Job, idle: Pin<&mut Sleep>, cancel: &CancellationToken) {
        match job {
            Job::Dml(params) => {
                self.batch.push(params);
                if self.batch.len() >= self.batch_size {
                    self.execute_batch(idle, Some(cancel)).await;
                }
            }
            Job::Flush { done } => {
                self.execute_batch(idle, Some(cancel)).await;
                let _ = done.send(());
            }
            Job::Ddl { params, done } => {
                self.execute_batch(idle, Some(cancel)).await;
                let outcome = apply_until(self.backend.as_mut(), &params, Some(cancel))
                    .await
                    .unwrap_or_else(|| {
                        Err(Error::Execution("ddl interrupted by cancellation".to_string()))
                    });
                match &outcome {
                    Ok(()) => {
                        self.report.executed += 1;
                        info!(
                            event = "ddl_applied",
                            lane = self.id,
                            schema = %params.schema,
                            table = %params.table,
                        );
                    }
                    Err(err) => {
                        error!(
                            lane = self.id,
                            schema = %params.schema,
                            table = %params.table,
                            error = %err,
                            "ddl failed"
                        );
                    }
                }
                let _ = done.send(outcome);
            }
        }
    }

    /// Apply the pending batch in arrival order. The first failing statement
    /// drops the remainder of the batch, and so does `interrupt` firing.
    async fn execute_batch(
        &mut self,
        idle: Pin<&mut Sleep>,
        interrupt: Option<&CancellationToken>,
    ) {
        idle.reset(Instant::now() + self.flush_interval);
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.batch);
        let size = batch.len();
        let mut applied = 0;
        let mut failure = None;
        let mut interrupted = false;
        for params in &batch {
            match apply_until(self.backend.as_mut(), params, interrupt).await {
                Some(Ok(())) => applied += 1,
                Some(Err(err)) => {
                    failure = Some((params, err));
                    break;
                }
                None => {
                    interrupted = true;
                    break;
                }
            }
        }

        self.report.executed += applied as u64;
        match failure {
            None if interrupted => {
                self.report.dropped += (size - applied) as u64;
                warn!(lane = self.id, applied, size, "batch interrupted by cancellation");
            }
            None => {
                self.report.batches += 1;
                debug!(lane = self.id, size, "batch executed");
            }
            Some((params, err)) => {
                self.report.failed_batches += 1;
                self.report.dropped += (size - applied - 1) as u64;
                error!(
                    lane = self.id,
                    kind = %params.kind,
                    schema = %params.schema,
                    table = %params.table,
                    applied,
                    size,
                    error = %err,
                    "batch failed, dropping the rest"
                );
            }
        }

        self.in_flight.send_modify(|count| *count = count.saturating_sub(size));
        self.batch = batch;
        self.batch.clear();
    }

    /// Drain jobs still queued after the loop ended.
    fn discard_queued(&mut self) {
        self.rx.close();
        let mut dropped = 0;
        while let Ok(job) = self.rx.try_recv() {
            if let Job::Dml(_) = job {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(lane = self.id, dropped, "jobs left in queue at shutdown");
            self.report.dropped += dropped as u64;
            self.in_flight.send_modify(|count| *count = count.saturating_sub(dropped));
        }
    }
}

/// Apply `params` unless `interrupt` fires first, in which case the statement
/// is abandoned and `None` comes back.
async fn apply_until(
    backend: &mut dyn Backend,
    params: &DmlParams,
    interrupt: Option<&CancellationToken>,
) -> Option<Result<()>> {
    match interrupt {
        Some(cancel) => tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = apply(backend, params) => Some(outcome),
        },
        None => Some(apply(backend, params).await),
    }
}

async fn apply(backend: &mut dyn Backend, params: &DmlParams) -> Result<()> {
    match params.kind {
        OpKind::Insert => backend.insert(&params.schema, &params.table, &params.values).await,
        OpKind::Update => {
            backend
                .update(&params.schema, &params.table, &params.keys, &params.values)
                .await
        }
        OpKind::Delete => backend.delete(&params.schema, &params.table, &params.keys).await,
        OpKind::Ddl => match params.ddl.as_deref() {
            Some(statement) => {
                backend
                    .execute_ddl(&params.schema, &params.table, statement)
                    .await
            }
            None => Err(Error::Execution(format!(
                "ddl payload for {}.{} carries no statement",
                params.schema, params.table
            ))),
        },
    }
}
