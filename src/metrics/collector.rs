//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rivalry rating service
//! using Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::rating::ledger::LedgerKind;

/// Main metrics collector for the rating service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Game lifecycle metrics
    lifecycle_metrics: LifecycleMetrics,

    /// Rating and recalculation metrics
    rating_metrics: RatingMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Games currently held in the book
    pub games_tracked: IntGauge,

    /// 1 while a reversal is waiting for a recalculation
    pub recalculation_pending: IntGauge,
}

/// Game lifecycle metrics
#[derive(Clone)]
pub struct LifecycleMetrics {
    /// Games created, by mode (open or direct)
    pub games_created_total: IntCounterVec,

    /// Winner declarations, by outcome (completed or confirmed)
    pub winners_declared_total: IntCounterVec,

    /// Ranked confirmations that moved ratings
    pub confirmations_total: IntCounter,

    /// Confirmed games reversed
    pub reversals_total: IntCounter,

    /// Games deleted
    pub deletions_total: IntCounter,

    /// Calls refused because the game was locked
    pub lock_conflicts_total: IntCounter,

    /// Operations that failed, by operation and error family
    pub rejected_operations_total: IntCounterVec,
}

/// Rating and recalculation metrics
#[derive(Clone)]
pub struct RatingMetrics {
    /// Recalculation runs, by scope (since or all)
    pub recalculations_total: IntCounterVec,

    /// Games replayed by recalculations
    pub replayed_games_total: IntCounter,

    /// Recalculation wall time
    pub recalculation_duration: Histogram,

    /// Absolute size of applied deltas, by ledger
    pub rating_delta_abs: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lifecycle_metrics = LifecycleMetrics::new(&registry)?;
        let rating_metrics = RatingMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lifecycle_metrics,
            rating_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn lifecycle(&self) -> &LifecycleMetrics {
        &self.lifecycle_metrics
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    pub fn record_game_created(&self, mode: &str) {
        self.lifecycle_metrics
            .games_created_total
            .with_label_values(&[mode])
            .inc();
    }

    /// Record a winner declaration and the deltas it applied
    pub fn record_winner_declared(&self, confirmed: bool, deltas: &[(LedgerKind, i64)]) {
        let outcome = if confirmed { "confirmed" } else { "completed" };
        self.lifecycle_metrics
            .winners_declared_total
            .with_label_values(&[outcome])
            .inc();

        if !deltas.is_empty() {
            self.lifecycle_metrics.confirmations_total.inc();
        }
        for (kind, delta) in deltas {
            self.rating_metrics
                .rating_delta_abs
                .with_label_values(&[kind.label()])
                .observe(delta.unsigned_abs() as f64);
        }
    }

    pub fn record_reversal(&self) {
        self.lifecycle_metrics.reversals_total.inc();
    }

    pub fn record_deletion(&self) {
        self.lifecycle_metrics.deletions_total.inc();
    }

    pub fn record_lock_conflict(&self) {
        self.lifecycle_metrics.lock_conflicts_total.inc();
    }

    /// Count a failed operation under its error family
    pub fn record_rejection(&self, operation: &str, error: &EngineError) {
        let family = match error {
            EngineError::Validation { .. } => "validation",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Concurrency(_) => "concurrency",
            EngineError::Consistency { .. } => "consistency",
            EngineError::RecalculationRequired { .. } => "recalculation_required",
        };
        self.lifecycle_metrics
            .rejected_operations_total
            .with_label_values(&[operation, family])
            .inc();
    }

    pub fn record_recalculation(&self, scope: &str, replayed: usize, duration: Duration) {
        self.rating_metrics
            .recalculations_total
            .with_label_values(&[scope])
            .inc();
        self.rating_metrics
            .replayed_games_total
            .inc_by(replayed as u64);
        self.rating_metrics
            .recalculation_duration
            .observe(duration.as_secs_f64());
    }

    /// Refresh gauges that mirror the book
    pub fn update_book_gauges(&self, games: usize, recalculation_pending: bool) {
        self.service_metrics.games_tracked.set(games as i64);
        self.service_metrics
            .recalculation_pending
            .set(i64::from(recalculation_pending));
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode_text(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("rivalry_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "rivalry_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let games_tracked = IntGauge::new("rivalry_games_tracked", "Games held in the book")?;
        registry.register(Box::new(games_tracked.clone()))?;

        let recalculation_pending = IntGauge::new(
            "rivalry_recalculation_pending",
            "Whether a reversal is waiting for a recalculation",
        )?;
        registry.register(Box::new(recalculation_pending.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            games_tracked,
            recalculation_pending,
        })
    }
}

impl LifecycleMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let games_created_total = IntCounterVec::new(
            Opts::new("rivalry_games_created_total", "Total games created"),
            &["mode"],
        )?;
        registry.register(Box::new(games_created_total.clone()))?;

        let winners_declared_total = IntCounterVec::new(
            Opts::new(
                "rivalry_winners_declared_total",
                "Total winner declarations",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(winners_declared_total.clone()))?;

        let confirmations_total = IntCounter::new(
            "rivalry_confirmations_total",
            "Ranked confirmations that applied ratings",
        )?;
        registry.register(Box::new(confirmations_total.clone()))?;

        let reversals_total =
            IntCounter::new("rivalry_reversals_total", "Confirmed games reversed")?;
        registry.register(Box::new(reversals_total.clone()))?;

        let deletions_total = IntCounter::new("rivalry_deletions_total", "Games deleted")?;
        registry.register(Box::new(deletions_total.clone()))?;

        let lock_conflicts_total = IntCounter::new(
            "rivalry_lock_conflicts_total",
            "Operations refused because the game was locked",
        )?;
        registry.register(Box::new(lock_conflicts_total.clone()))?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rivalry_rejected_operations_total",
                "Operations that returned an error",
            ),
            &["operation", "error"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        Ok(Self {
            games_created_total,
            winners_declared_total,
            confirmations_total,
            reversals_total,
            deletions_total,
            lock_conflicts_total,
            rejected_operations_total,
        })
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let recalculations_total = IntCounterVec::new(
            Opts::new("rivalry_recalculations_total", "Recalculation runs"),
            &["scope"],
        )?;
        registry.register(Box::new(recalculations_total.clone()))?;

        let replayed_games_total = IntCounter::new(
            "rivalry_replayed_games_total",
            "Games replayed by recalculations",
        )?;
        registry.register(Box::new(replayed_games_total.clone()))?;

        let recalculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rivalry_recalculation_duration_seconds",
                "Recalculation time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(recalculation_duration.clone()))?;

        let rating_delta_abs = HistogramVec::new(
            HistogramOpts::new(
                "rivalry_rating_delta_abs",
                "Absolute rating delta applied per entity",
            )
            .buckets(vec![5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 80.0, 120.0]),
            &["ledger"],
        )?;
        registry.register(Box::new(rating_delta_abs.clone()))?;

        Ok(Self {
            recalculations_total,
            replayed_games_total,
            recalculation_duration,
            rating_delta_abs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _lifecycle = collector.lifecycle();
        let _rating = collector.rating();
    }

    #[test]
    fn test_winner_declaration_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_winner_declared(false, &[]);
        collector.record_winner_declared(
            true,
            &[(LedgerKind::Member, 61), (LedgerKind::Member, -61)],
        );

        let lifecycle = collector.lifecycle();
        assert_eq!(
            lifecycle
                .winners_declared_total
                .with_label_values(&["confirmed"])
                .get(),
            1
        );
        assert_eq!(lifecycle.confirmations_total.get(), 1);
        assert_eq!(
            collector
                .rating()
                .rating_delta_abs
                .with_label_values(&["member"])
                .get_sample_count(),
            2
        );
    }

    #[test]
    fn test_rejections_by_family() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        collector.record_rejection("declare_winner", &EngineError::validation("bad side"));
        collector.record_rejection("declare_winner", &EngineError::validation("bad side"));

        assert_eq!(
            collector
                .lifecycle()
                .rejected_operations_total
                .with_label_values(&["declare_winner", "validation"])
                .get(),
            2
        );
    }

    #[test]
    fn test_encode_text() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        collector.record_game_created("direct");
        collector.record_recalculation("all", 3, Duration::from_millis(4));
        collector.update_book_gauges(5, true);

        let text = collector.encode_text().unwrap();
        assert!(text.contains("rivalry_games_created_total"));
        assert!(text.contains("rivalry_recalculation_duration_seconds"));
        assert_eq!(collector.service().recalculation_pending.get(), 1);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
