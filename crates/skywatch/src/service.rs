//! `HistoryService` builder and service loop.
//!
//! This is the entry point for running Skywatch. It ties the layers
//! together: detection feed → controller → cache/store → notifier, with
//! the archiving sweep on a timer.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use skywatch_notify::{Notifier, NullNotifier};
use skywatch_protocol::{Detection, FlightSession};
use skywatch_session::{SessionConfig, TrackedFlight};
use skywatch_store::{FileStore, WeekBucket};
use skywatch_tick::{IntervalScheduler, TickConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{FlightController, SkywatchError};

/// Everything needed to start a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Directory holding the weekly bucket files.
    ///
    /// Default: `./history`.
    pub history_dir: PathBuf,

    /// Timeouts and trace bounds.
    pub session: SessionConfig,

    /// Wall-clock limit for the shutdown sweep plus the final flush.
    ///
    /// Default: 5 seconds.
    pub shutdown_budget: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            history_dir: PathBuf::from("history"),
            session: SessionConfig::default(),
            shutdown_budget: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - `session` goes through [`SessionConfig::validated`].
    /// - A zero `shutdown_budget` would fail every shutdown; the default
    ///   is used instead.
    pub fn validated(mut self) -> Self {
        self.session = self.session.validated();
        if self.shutdown_budget.is_zero() {
            warn!("shutdown_budget of 0 would abort every shutdown, using 5s");
            self.shutdown_budget = Duration::from_secs(5);
        }
        self
    }
}

/// Builder for configuring a [`HistoryService`].
///
/// # Example
///
/// ```rust,no_run
/// use skywatch::prelude::*;
///
/// # async fn demo() -> Result<(), SkywatchError> {
/// let service = HistoryService::builder()
///     .history_dir("/var/lib/skywatch")
///     .build(NullNotifier);
///
/// let (tx, rx) = tokio::sync::mpsc::channel(1024);
/// # drop(tx);
/// service.run(rx, async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
#[derive(Debug, Default)]
pub struct HistoryServiceBuilder {
    config: ServiceConfig,
}

impl HistoryServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory holding the bucket files.
    pub fn history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.history_dir = dir.into();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets how long shutdown may take before it is abandoned.
    pub fn shutdown_budget(mut self, budget: Duration) -> Self {
        self.config.shutdown_budget = budget;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the service. Nothing touches the disk until the first
    /// detection or query.
    pub fn build<N: Notifier>(self, notifier: N) -> HistoryService<N> {
        let config = self.config.validated();
        let controller = FlightController::new(
            FileStore::new(&config.history_dir),
            config.session.clone(),
            notifier,
        );
        HistoryService { controller, config }
    }
}

/// A flight-history service for one history directory.
///
/// Call [`run`](Self::run) to start consuming detections. Queries can be
/// made concurrently from other tasks (wrap the service in an `Arc`).
pub struct HistoryService<N: Notifier> {
    controller: FlightController<N>,
    config: ServiceConfig,
}

impl HistoryService<NullNotifier> {
    /// Starts a builder. The notifier type is picked by
    /// [`HistoryServiceBuilder::build`].
    pub fn builder() -> HistoryServiceBuilder {
        HistoryServiceBuilder::new()
    }
}

impl<N: Notifier> HistoryService<N> {
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn controller(&self) -> &FlightController<N> {
        &self.controller
    }

    /// Runs the service loop until `shutdown` resolves or the detection
    /// channel closes, then archives and flushes everything.
    ///
    /// Detections are applied one at a time, in arrival order. A failed
    /// detection is logged and skipped; it never stops the loop.
    ///
    /// # Errors
    /// Only shutdown can fail: [`SkywatchError::ShutdownTimeout`] if it
    /// overran its budget, or the first flush error.
    pub async fn run(
        &self,
        mut detections: mpsc::Receiver<Detection>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), SkywatchError> {
        let mut scheduler = IntervalScheduler::new(TickConfig::with_period(
            self.config.session.archive_check_interval,
        ));
        tokio::pin!(shutdown);

        info!(
            history_dir = %self.config.history_dir.display(),
            inactive_timeout_ms = self.config.session.inactive_timeout.as_millis() as u64,
            max_trace_length = self.config.session.max_trace_length,
            "history service running"
        );

        let mut saved = 0u64;
        let mut rejected = 0u64;
        loop {
            tokio::select! {
                received = detections.recv() => match received {
                    Some(detection) => {
                        match self.controller.save_flight_to_history(detection).await {
                            Ok(_) => saved += 1,
                            // Already logged by the controller.
                            Err(_) => rejected += 1,
                        }
                    }
                    None => {
                        info!("detection feed closed");
                        break;
                    }
                },
                tick = scheduler.wait_for_tick() => {
                    let report = self.controller.sweep().await;
                    scheduler.record_tick_end();
                    let metrics = scheduler.metrics();
                    debug!(
                        tick = tick.tick,
                        late = tick.late,
                        skipped = tick.ticks_skipped,
                        ?report,
                        avg_sweep_ms = metrics.avg_tick_time.as_secs_f64() * 1000.0,
                        max_sweep_ms = metrics.max_tick_time.as_secs_f64() * 1000.0,
                        "sweep tick"
                    );
                }
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        let metrics = scheduler.metrics();
        info!(
            saved,
            rejected,
            sweeps = scheduler.tick_count(),
            late_sweeps = metrics.total_late,
            "history service stopping"
        );
        self.shutdown().await
    }

    /// Closes every tracked flight and flushes every cached bucket,
    /// bounded by the configured shutdown budget.
    pub async fn shutdown(&self) -> Result<(), SkywatchError> {
        let budget = self.config.shutdown_budget;
        let work = async {
            let closed = self.controller.shutdown_sweep().await;
            let written = self.controller.flush_all().await?;
            Ok::<_, SkywatchError>((closed, written))
        };

        match tokio::time::timeout(budget, work).await {
            Ok(Ok((closed, written))) => {
                info!(closed, written, "history service stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "final flush failed");
                Err(e)
            }
            Err(_) => {
                error!(budget_ms = budget.as_millis() as u64, "shutdown exceeded its budget");
                Err(SkywatchError::ShutdownTimeout(budget))
            }
        }
    }

    /// Saves one detection outside the service loop.
    pub async fn save_flight_to_history(&self, detection: Detection) -> Result<String, SkywatchError> {
        self.controller.save_flight_to_history(detection).await
    }

    /// A copy of every session in the bucket `filename`.
    pub async fn history(&self, filename: &str) -> Result<Vec<FlightSession>, SkywatchError> {
        self.controller.history(filename).await
    }

    /// A copy of the bucket covering `timestamp`.
    pub async fn history_for(&self, timestamp: DateTime<Utc>) -> Result<Vec<FlightSession>, SkywatchError> {
        self.controller.history_for(timestamp).await
    }

    /// Bucket files on disk, oldest week first.
    pub async fn list_buckets(&self) -> Result<Vec<WeekBucket>, SkywatchError> {
        self.controller.list_buckets().await
    }

    /// Flights currently tracked as `live` or `waiting`.
    pub async fn active_flights(&self) -> Vec<TrackedFlight> {
        self.controller.active_flights().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.history_dir, PathBuf::from("history"));
        assert_eq!(config.shutdown_budget, Duration::from_secs(5));
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_validated_replaces_zero_budget() {
        let config = ServiceConfig {
            shutdown_budget: Duration::ZERO,
            ..ServiceConfig::default()
        }
        .validated();
        assert_eq!(config.shutdown_budget, Duration::from_secs(5));
    }

    #[test]
    fn test_validated_cascades_to_session() {
        let config = ServiceConfig {
            session: SessionConfig {
                max_trace_length: 0,
                ..SessionConfig::default()
            },
            ..ServiceConfig::default()
        }
        .validated();
        assert_eq!(config.session.max_trace_length, 1);
    }

    #[test]
    fn test_builder_sets_fields() {
        let service = HistoryService::builder()
            .history_dir("/tmp/skywatch-test")
            .shutdown_budget(Duration::from_secs(1))
            .build(NullNotifier);
        assert_eq!(service.config().history_dir, PathBuf::from("/tmp/skywatch-test"));
        assert_eq!(service.config().shutdown_budget, Duration::from_secs(1));
    }
}
