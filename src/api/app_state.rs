use crate::engine::EngineHandle;
use crate::observability::AppMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Hot-swappable memory engine
    pub engine: Arc<EngineHandle>,
    /// Request and operation counters
    pub metrics: Arc<AppMetrics>,
    /// Process start, for `uptime_seconds`
    pub start_time: DateTime<Utc>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &"Arc<EngineHandle>")
            .field("generation", &self.engine.generation())
            .field("start_time", &self.start_time)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine: Arc::new(engine),
            metrics: Arc::new(AppMetrics::default()),
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
