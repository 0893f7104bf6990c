//! Periodic interval scheduler for Skywatch.
//!
//! Drives the archiving sweep: every `period` the service loop wakes up,
//! demotes idle sessions, and goes back to waiting for detections. The
//! scheduler also watches how long each sweep took relative to its
//! period and warns when sweeps start eating the whole interval.
//!
//! # Disabled mode
//!
//! When `period` is zero the scheduler is disabled and
//! [`IntervalScheduler::wait_for_tick`] pends forever. The service loop
//! still runs; it just never sweeps on a timer.
//!
//! # Integration
//!
//! The scheduler sits inside the service's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(detection) = detections.recv() => { /* save it */ }
//!         _ = scheduler.wait_for_tick() => {
//!             controller.sweep().await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Full configuration for the interval scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `Duration::ZERO` disables the scheduler.
    pub period: Duration,
    /// Warn when a tick's work takes at least this fraction (0.0–1.0) of
    /// the period. Default: 0.5.
    pub budget_warn_threshold: f64,
    /// Collect per-tick timing metrics.
    pub metrics_enabled: bool,
    /// Random delay (0–max µs) added to the first tick only, so several
    /// services started together don't sweep in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::ZERO,
            budget_warn_threshold: 0.5,
            metrics_enabled: true,
            initial_jitter_us: 50_000,
        }
    }
}

impl TickConfig {
    /// Shortest period accepted. Anything below is raised to this.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// Config for a specific period with default settings.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values.
    ///
    /// Called by [`IntervalScheduler::new`]:
    /// - a non-zero `period` is at least [`Self::MIN_PERIOD`];
    /// - `budget_warn_threshold` is clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if !self.period.is_zero() && self.period < Self::MIN_PERIOD {
            warn!(
                period_ms = self.period.as_millis() as u64,
                min_ms = Self::MIN_PERIOD.as_millis() as u64,
                "tick period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// The period, or `None` when disabled.
    pub fn tick_period(&self) -> Option<Duration> {
        (!self.period.is_zero()).then_some(self.period)
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`IntervalScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if the tick fired more than 10% of a period late.
    pub late: bool,
    /// Whole periods missed before this tick.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics. Timing values refer to the work reported through
/// [`IntervalScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_late: u64,
    pub total_skipped: u64,
    /// Exponential moving average of tick work time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last tick's work time as a fraction of the period.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-period scheduler for one background task.
pub struct IntervalScheduler {
    config: TickConfig,
    period: Option<Duration>,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl IntervalScheduler {
    /// Creates a scheduler. The first tick fires one period from now plus
    /// up to `initial_jitter_us`.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.tick_period();

        let next_tick = period.map(|p| {
            let jitter = if config.initial_jitter_us > 0 {
                Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
            } else {
                Duration::ZERO
            };
            TokioInstant::now() + p + jitter
        });

        match period {
            Some(p) => debug!(
                period_ms = p.as_millis() as u64,
                "interval scheduler created"
            ),
            None => debug!("interval scheduler created disabled"),
        }

        Self {
            config,
            period,
            tick_count: 0,
            next_tick,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Scheduler for `period` with default settings.
    pub fn with_period(period: Duration) -> Self {
        Self::new(TickConfig::with_period(period))
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever when disabled; inside `tokio::select!` the other
    /// branches keep running.
    ///
    /// A late tick forgets the periods it missed: the next one is due a
    /// full period after it fires, since one late sweep covers what the
    /// missed ones would have.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.period) {
            (Some(next), Some(period)) => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let late = late_by > period / 10;
        let mut ticks_skipped = 0u64;

        if late {
            ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
            if ticks_skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_millis() as u64,
                    "tick fired late, skipping missed ticks"
                );
            }
        }
        self.next_tick = Some(now + period);

        if late {
            self.metrics.total_late += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, late, "tick fired");

        TickInfo {
            tick: self.tick_count,
            late,
            ticks_skipped,
        }
    }

    /// Marks the end of the work done for the current tick.
    ///
    /// Without this call no budget warnings are emitted and timing
    /// metrics stay at zero.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        if let Some(period) = self.period {
            let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
            self.metrics.budget_utilization = utilization;

            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    period_ms = period.as_secs_f64() * 1000.0,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "tick work is taking a large share of its period"
                );
            }
        }

        if self.config.metrics_enabled {
            if elapsed > self.metrics.max_tick_time {
                self.metrics.max_tick_time = elapsed;
            }
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            let curr = elapsed.as_secs_f64();
            self.metrics.avg_tick_time = Duration::from_secs_f64(prev * (1.0 - alpha) + curr * alpha);
        }
    }

    /// `true` if the period is zero and no tick will ever fire.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// The configured period, or `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}
