use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use datadam_core::{Backend, DamConfig, DmlParams, OpKind, lane_for};

use crate::error::{DispatchError, Result};
use crate::job::Job;
use crate::lane::{Lane, LaneReport, LaneRole};

/// Shape of the lane pool.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Number of regular lanes. One DDL lane is added on top.
    pub workers: usize,
    pub batch_size: usize,
    /// Idle time after which a lane executes a partial batch.
    pub flush_interval: Duration,
}

impl DispatcherSettings {
    pub fn from_config(config: &DamConfig) -> datadam_core::Result<Self> {
        Ok(Self {
            workers: config.concurrent,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval()?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DispatchError::Config("at least one worker lane is required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(DispatchError::Config("batch size must be at least 1".to_string()));
        }
        if self.flush_interval.is_zero() {
            return Err(DispatchError::Config("flush interval must be positive".to_string()));
        }
        Ok(())
    }
}

struct Shared {
    lanes: Vec<mpsc::Sender<Job>>,
    ddl_lane: mpsc::Sender<Job>,
    /// Regular jobs enqueued but not yet executed or dropped.
    in_flight: Arc<watch::Sender<usize>>,
    /// Regular submits hold it shared, a DDL submit holds it exclusively.
    gate: RwLock<()>,
    cancel: CancellationToken,
}

/// Submit side of the lane pool. Cheap to clone and safe to use from
/// several tasks at once.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

/// Lane workers waiting to be started with [`Lanes::run`].
pub struct Lanes {
    lanes: Vec<Lane>,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Build the pool over `backends`: the first `workers` become regular
    /// lanes and the last one the DDL lane.
    ///
    /// `cancel` governs every wait of the dispatcher and stops the lanes.
    pub fn new(
        settings: DispatcherSettings,
        backends: Vec<Box<dyn Backend>>,
        cancel: CancellationToken,
    ) -> Result<(Self, Lanes)> {
        settings.validate()?;
        if backends.len() != settings.workers + 1 {
            return Err(DispatchError::Config(format!(
                "{} workers need {} backends, got {}",
                settings.workers,
                settings.workers + 1,
                backends.len()
            )));
        }

        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);
        let capacity = settings.batch_size + 1;

        let mut senders = Vec::with_capacity(settings.workers);
        let mut lanes = Vec::with_capacity(backends.len());
        for (id, backend) in backends.into_iter().enumerate() {
            let role = if id == settings.workers {
                LaneRole::Ddl
            } else {
                LaneRole::Regular
            };
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            lanes.push(Lane::new(
                id,
                role,
                backend,
                rx,
                Arc::clone(&in_flight),
                settings.batch_size,
                settings.flush_interval,
            ));
        }
        let ddl_lane = senders
            .pop()
            .ok_or_else(|| DispatchError::Config("missing ddl lane".to_string()))?;

        let dispatcher = Self {
            shared: Arc::new(Shared {
                lanes: senders,
                ddl_lane,
                in_flight,
                gate: RwLock::new(()),
                cancel: cancel.clone(),
            }),
        };
        Ok((dispatcher, Lanes { lanes, cancel }))
    }

    /// Number of regular lanes.
    pub fn workers(&self) -> usize {
        self.shared.lanes.len()
    }

    /// Regular lane a payload is routed to.
    pub fn route(&self, params: &DmlParams) -> usize {
        lane_for(&params.routing_key(), self.workers())
    }

    /// Regular jobs submitted but not yet executed.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    /// Enqueue a payload.
    ///
    /// DML goes to its routed lane and only waits when that lane's queue is
    /// full. DDL waits until every earlier job has executed, runs alone on
    /// the DDL lane and returns once it has completed.
    pub async fn submit(&self, params: DmlParams) -> Result<()> {
        match params.kind {
            OpKind::Ddl => self.submit_ddl(params).await,
            _ => self.submit_dml(params).await,
        }
    }

    async fn submit_dml(&self, params: DmlParams) -> Result<()> {
        let _gate = self.cancellable(self.shared.gate.read()).await?;
        let lane = self.route(&params);

        let reserved = InFlight::reserve(&self.shared.in_flight);
        self.send(lane, &self.shared.lanes[lane], Job::Dml(params))
            .await?;
        reserved.hand_over();
        Ok(())
    }

    async fn submit_ddl(&self, params: DmlParams) -> Result<()> {
        let _gate = self.cancellable(self.shared.gate.write()).await?;
        debug!(schema = %params.schema, table = %params.table, "ddl barrier entered");

        self.flush_lanes().await?;
        self.wait_idle().await?;

        let ddl_id = self.workers();
        let (done, ack) = oneshot::channel();
        self.send(ddl_id, &self.shared.ddl_lane, Job::Ddl { params, done })
            .await?;
        self.cancellable(ack)
            .await?
            .map_err(|_| DispatchError::LaneClosed(ddl_id))??;
        Ok(())
    }

    /// Make every regular lane execute its pending batch and wait until all
    /// of them have.
    pub async fn flush(&self) -> Result<()> {
        self.flush_lanes().await
    }

    /// Flush the lanes, then stop them through the governing token.
    pub async fn shutdown(&self) -> Result<()> {
        let flushed = self.flush().await;
        self.shared.cancel.cancel();
        info!(event = "dispatcher_shutdown", flushed = flushed.is_ok());
        flushed
    }

    /// Stop the lanes without flushing. Each lane abandons the statement in
    /// progress and drops whatever is still queued.
    pub fn abort(&self) {
        self.shared.cancel.cancel();
        info!(
            event = "dispatcher_aborted",
            in_flight = *self.shared.in_flight.borrow()
        );
    }

    async fn flush_lanes(&self) -> Result<()> {
        let mut acks = Vec::with_capacity(self.shared.lanes.len());
        for (lane, sender) in self.shared.lanes.iter().enumerate() {
            let (done, ack) = oneshot::channel();
            self.send(lane, sender, Job::Flush { done }).await?;
            acks.push((lane, ack));
        }
        for (lane, ack) in acks {
            self.cancellable(ack)
                .await?
                .map_err(|_| DispatchError::LaneClosed(lane))?;
        }
        Ok(())
    }

    async fn wait_idle(&self) -> Result<()> {
        let mut in_flight = self.shared.in_flight.subscribe();
        self.cancellable(in_flight.wait_for(|count| *count == 0))
            .await?
            .map_err(|_| DispatchError::Cancelled)?;
        Ok(())
    }

    async fn send(&self, lane: usize, sender: &mpsc::Sender<Job>, job: Job) -> Result<()> {
        self.cancellable(sender.send(job))
            .await?
            .map_err(|_| DispatchError::LaneClosed(lane))
    }

    /// Race `fut` against the governing token.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(DispatchError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

/// One regular job counted in flight. Dropping it before
/// [`InFlight::hand_over`] gives the slot back, so an abandoned submit never
/// leaves the DDL barrier waiting on a job that was not enqueued.
struct InFlight<'a> {
    counter: Option<&'a watch::Sender<usize>>,
}

impl<'a> InFlight<'a> {
    fn reserve(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self {
            counter: Some(counter),
        }
    }

    /// The job reached its lane, which now owns the decrement.
    fn hand_over(mut self) {
        self.counter = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.counter.take() {
            counter.send_modify(|count| *count = count.saturating_sub(1));
        }
    }
}

impl Lanes {
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Spawn one task per lane and wait for all of them to exit.
    pub async fn run(self) -> Vec<LaneReport> {
        let handles: Vec<_> = self
            .lanes
            .into_iter()
            .map(|lane| tokio::spawn(lane.run(self.cancel.clone())))
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => error!(error = %err, "lane task failed"),
            }
        }
        reports
    }
}
