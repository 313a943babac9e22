//! Metrics and monitoring for the rivalry rating service
//!
//! This module provides Prometheus metrics collection and the HTTP server
//! exposing health, metrics and book statistics.

pub mod collector;
pub mod health;

pub use collector::{
    LifecycleMetrics, MetricsCollector, MetricsTimer, RatingMetrics, ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig, HealthServerState};
