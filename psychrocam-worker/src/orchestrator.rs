//! Refresh cycle orchestration
//!
//! One cycle is `Idle → Running → {Succeeded, Failed} → Idle`:
//!
//! 1. Take the `making_chart_now` lease, or give up if another worker holds it
//! 2. Make sure chart and sensor configuration are cached
//! 3. Make sure a validated remote source handle is cached
//! 4. Fetch states for the configured entities
//! 5. Aggregate points, history, arrows and evolution
//! 6. Render the chart into `svg_chart`
//! 7. Release the lease, whatever happened
//! 8. After a successful render, persist dirty configuration
//!
//! The lease is a cache flag with a TTL, so a worker that dies mid-cycle
//! blocks others for at most the lease duration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use psychrocam_connectors::{SourceFactory, TelemetrySource};
use psychrocam_core::constants::buffers::DEFAULT_SCAN_INTERVAL_S;
use psychrocam_core::constants::keys;
use psychrocam_core::constants::time::DEFAULT_LEASE_SECONDS;
use psychrocam_core::{
    CacheError, CacheValue, HistoryConfig, RemoteConfig, RemoteHandle, SensorAggregator,
    SensorGroups, States, TypedCache,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{WorkerError, WorkerResult};
use crate::reconciler::{ConfigReconciler, ReconcileReport};
use crate::render::{ChartRenderer, RenderContext};
use crate::storage::ConfigStorage;

/// Step at which a cycle failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Taking the lease
    Lease,
    /// Loading chart or sensor configuration
    Config,
    /// Validating the remote source or fetching states
    Fetch,
    /// Building points and history
    Aggregate,
    /// Drawing the chart
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lease => "lease",
            Self::Config => "config",
            Self::Fetch => "fetch",
            Self::Aggregate => "aggregate",
            Self::Render => "render",
        };
        f.write_str(name)
    }
}

/// Result of one guarded cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle holds the lease; nothing was touched
    Busy,
    /// The cycle stopped early
    Failed {
        /// Step that failed
        stage: Stage,
        /// Error message
        reason: String,
    },
    /// A chart was rendered
    Succeeded {
        /// Points in the chart
        points: usize,
        /// Configuration persisted afterwards
        reconciled: ReconcileReport,
    },
}

impl CycleOutcome {
    /// True for [`CycleOutcome::Succeeded`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

struct Failure {
    stage: Stage,
    reason: String,
}

impl Failure {
    fn at(stage: Stage) -> impl FnOnce(WorkerError) -> Failure {
        move |e| Failure {
            stage,
            reason: e.to_string(),
        }
    }
}

/// Runs refresh cycles against the shared cache
pub struct RefreshOrchestrator {
    cache: TypedCache,
    sources: Arc<dyn SourceFactory>,
    renderer: Arc<dyn ChartRenderer>,
    reconciler: ConfigReconciler,
    lease: Duration,
}

impl RefreshOrchestrator {
    /// Create an orchestrator with the default lease
    pub fn new(
        cache: TypedCache,
        storage: Arc<dyn ConfigStorage>,
        sources: Arc<dyn SourceFactory>,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            reconciler: ConfigReconciler::new(cache.clone(), storage),
            cache,
            sources,
            renderer,
            lease: Duration::from_secs(DEFAULT_LEASE_SECONDS),
        }
    }

    /// Override how long the lease outlives a crashed holder
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Shared cache
    pub fn cache(&self) -> &TypedCache {
        &self.cache
    }

    /// Configuration reconciler
    pub fn reconciler(&self) -> &ConfigReconciler {
        &self.reconciler
    }

    /// Run one cycle unless another one holds the lease
    pub async fn run_cycle(&self) -> CycleOutcome {
        match self.cache.is_flag_set(keys::REFRESH_IN_FLIGHT) {
            Ok(false) => {}
            Ok(true) => {
                warn!("Last refresh is not finished, aborting this one");
                return CycleOutcome::Busy;
            }
            Err(e) => {
                error!("Cannot read the refresh lease: {e}");
                return CycleOutcome::Failed {
                    stage: Stage::Lease,
                    reason: e.to_string(),
                };
            }
        }
        if let Err(e) = self
            .cache
            .set(keys::REFRESH_IN_FLIGHT, &CacheValue::Int(1), Some(self.lease))
        {
            error!("Cannot take the refresh lease: {e}");
            return CycleOutcome::Failed {
                stage: Stage::Lease,
                reason: e.to_string(),
            };
        }

        let result = self.refresh().await;

        if let Err(e) = self.cache.set(keys::REFRESH_IN_FLIGHT, &CacheValue::Int(0), None) {
            error!("Cannot release the refresh lease: {e}");
        }

        match result {
            Ok(points) => {
                let reconciled = self.reconciler.reconcile();
                info!("Refresh cycle done: {points} points");
                CycleOutcome::Succeeded { points, reconciled }
            }
            Err(Failure { stage, reason }) => {
                error!("Refresh cycle failed at {stage}: {reason}");
                CycleOutcome::Failed { stage, reason }
            }
        }
    }

    /// Run a cycle now, outside the schedule; still honours the lease
    pub async fn force_refresh_cycle(&self) -> CycleOutcome {
        debug!("Forced refresh cycle");
        self.run_cycle().await
    }

    /// Drop every cached entry and reload configuration from storage
    pub fn force_full_reset(&self) -> WorkerResult<()> {
        let removed = self.cache.clear()?;
        warn!("Cache data cleaned ({removed} entries)");
        self.reconciler.load_chart_config()?;
        self.reconciler.load_sensor_config()?;
        Ok(())
    }

    async fn refresh(&self) -> Result<usize, Failure> {
        self.reconciler
            .load_chart_config()
            .map_err(Failure::at(Stage::Config))?;
        self.reconciler
            .load_sensor_config()
            .map_err(Failure::at(Stage::Config))?;

        let states = self.fetch_states().await.map_err(Failure::at(Stage::Fetch))?;
        if states.is_empty() {
            return Err(Failure {
                stage: Stage::Fetch,
                reason: "no states from the remote source".into(),
            });
        }

        let outcome = SensorAggregator::new(self.cache.clone())
            .aggregate(&states)
            .map_err(|e| Failure::at(Stage::Aggregate)(e.into()))?;
        debug!(
            "Aggregated {} points, {} unknown",
            outcome.points.len(),
            outcome.unknown.len()
        );

        self.render().await.map_err(Failure::at(Stage::Render))?;
        Ok(outcome.points.len())
    }

    /// Fetch states, caching them under `ha_states`
    ///
    /// Anything short of a non-empty answer clears `ha_states` and yields an
    /// empty map.
    async fn fetch_states(&self) -> WorkerResult<States> {
        let states = match self.ensure_source().await? {
            Some(source) => {
                let groups: SensorGroups = self.cache.get_json(keys::SENSOR_GROUPS)?.unwrap_or_default();
                source.fetch_states(&groups.entity_ids()).await
            }
            None => States::new(),
        };

        if states.is_empty() {
            error!("Can't load remote states");
            self.cache.remove(keys::STATES)?;
            // Revalidate on the next cycle
            self.cache.remove(keys::REMOTE_HANDLE)?;
            return Ok(states);
        }
        self.cache.set_opaque(keys::STATES, &states)?;
        Ok(states)
    }

    /// Connect to the cached remote source, validating a new one if needed
    async fn ensure_source(&self) -> WorkerResult<Option<Box<dyn TelemetrySource>>> {
        match self.cache.get_opaque::<RemoteHandle>(keys::REMOTE_HANDLE) {
            Ok(Some(handle)) => return Ok(Some(self.sources.connect(&handle)?)),
            Ok(None) => {}
            Err(CacheError::Decode { reason, .. }) => {
                warn!("Discarding undecodable remote handle: {reason}");
                self.cache.remove(keys::REMOTE_HANDLE)?;
            }
            Err(e) => return Err(e.into()),
        }

        let Some(remote) = self.cache.get_json::<RemoteConfig>(keys::REMOTE_CONFIG)? else {
            warn!("No remote source configured");
            return Ok(None);
        };
        let handle = remote.handle();
        let source = self.sources.connect(&handle)?;
        let status = source.validate().await;
        if status.is_valid() {
            info!("Remote source at {} validated", handle.base_url);
            self.cache.set_opaque(keys::REMOTE_HANDLE, &handle)?;
            Ok(Some(source))
        } else {
            error!("Remote source at {} not usable: {status}", handle.base_url);
            self.cache.remove(keys::REMOTE_HANDLE)?;
            Ok(None)
        }
    }

    async fn render(&self) -> WorkerResult<()> {
        let context = RenderContext::gather(&self.cache)?;
        let chart = self.renderer.render(&context).await?;
        debug!("Chart rendered, {} bytes", chart.len());
        self.cache
            .set(keys::RENDERED_CHART, &CacheValue::Bytes(chart), None)?;
        Ok(())
    }

    /// Current scheduling period from the cached history config
    pub fn scan_interval(&self) -> Duration {
        let seconds = match self.cache.get_json::<HistoryConfig>(keys::HISTORY_CONFIG) {
            Ok(Some(history)) => history.scan_interval,
            Ok(None) => DEFAULT_SCAN_INTERVAL_S as f64,
            Err(e) => {
                warn!("Unreadable history config, using the default period: {e}");
                DEFAULT_SCAN_INTERVAL_S as f64
            }
        };
        if seconds.is_finite() && seconds >= 1.0 {
            Duration::from_secs_f64(seconds)
        } else {
            Duration::from_secs(1)
        }
    }

    /// Run a cycle every scan interval until `shutdown` completes
    ///
    /// The interval is re-read after each cycle and the ticker rebuilt when it
    /// changes.
    pub async fn run_scheduled<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut period = self.scan_interval();
        let mut ticker = interval_at(Instant::now(), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Polling every {period:?}");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    debug!("Scheduled cycle finished: {outcome:?}");

                    let next = self.scan_interval();
                    if next != period {
                        info!("Polling period changed from {period:?} to {next:?}");
                        period = next;
                        ticker = interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    }
                }
            }
        }
    }
}
