//! Rate-limited, weighted stream of DML payloads.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use datadam_core::{Backend, DamConfig, DmlParams, Error, OpKind, Result};

use crate::weighted::SmoothWeighted;

/// Knobs the generator reads from the run configuration.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Payloads per second.
    pub rate: u32,
    pub burst: u32,
    /// Weights aligned to [`OpKind::ALL`].
    pub op_weight: Vec<u32>,
    pub schemas: Vec<String>,
}

impl From<&DamConfig> for GeneratorSettings {
    fn from(config: &DamConfig) -> Self {
        Self {
            rate: config.rate,
            burst: config.burst,
            op_weight: config.op_weight.clone(),
            schemas: config.schemas.clone(),
        }
    }
}

/// Produces one payload per limiter token.
///
/// The generator owns its backend and mutates the selector and the backend's
/// id counters on every call, so it must have a single caller.
pub struct Generator {
    backend: Box<dyn Backend>,
    selector: SmoothWeighted<OpKind>,
    limiter: DefaultDirectRateLimiter,
    schemas: Vec<String>,
    produced: u64,
}

impl Generator {
    pub fn new(backend: Box<dyn Backend>, settings: GeneratorSettings) -> Result<Self> {
        if settings.op_weight.len() != OpKind::ALL.len() {
            return Err(Error::Config(format!(
                "op-weight needs {} entries, got {}",
                OpKind::ALL.len(),
                settings.op_weight.len()
            )));
        }
        let rate = NonZeroU32::new(settings.rate)
            .ok_or_else(|| Error::Config("rate must be at least 1".to_string()))?;
        let burst = NonZeroU32::new(settings.burst)
            .ok_or_else(|| Error::Config("burst must be at least 1".to_string()))?;

        let mut selector = SmoothWeighted::new();
        for (kind, weight) in OpKind::ALL.into_iter().zip(settings.op_weight.iter().copied()) {
            selector.add(kind, weight);
        }
        if selector.is_empty() {
            return Err(Error::Config("op-weight must not be all zero".to_string()));
        }

        let limiter = RateLimiter::direct(Quota::per_second(rate).allow_burst(burst));
        Ok(Self {
            backend,
            selector,
            limiter,
            schemas: settings.schemas,
            produced: 0,
        })
    }

    /// Introspect every configured schema so the first payloads do not pay
    /// for it.
    pub async fn prepare(&mut self) -> Result<usize> {
        let mut total = 0;
        for schema in &self.schemas {
            let (tables, _) = self.backend.prepare_tables(schema).await?;
            info!(event = "schema_loaded", schema = %schema, tables = tables.len());
            total += tables.len();
        }
        if total == 0 {
            return Err(Error::NoTables(self.schemas.clone()));
        }
        Ok(total)
    }

    /// Wait for a rate token and build the next payload.
    ///
    /// Returns `Ok(None)` once `cancel` fires.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<DmlParams>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            _ = self.limiter.until_ready() => {}
        }

        let kind = *self.selector.next().ok_or_else(|| {
            Error::Generation("no operation kind has a positive weight".to_string())
        })?;
        let params = match self.backend.generate_dml(kind).await {
            Err(Error::NoTables(_)) => return Err(Error::NoTables(self.schemas.clone())),
            other => other?,
        };
        self.produced += 1;
        debug!(kind = %params.kind, table = %params.table, "payload generated");
        Ok(Some(params))
    }

    /// Payloads handed out so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub async fn close(mut self) -> Result<()> {
        self.backend.close().await
    }
}
