//! 可观测性模块
//!
//! 提供 Prometheus 文本格式指标、请求指标中间件和结构化日志初始化。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::config::config::LoggingConfig;

// ===== Simple Metrics =====

/// 应用指标
#[derive(Default)]
pub struct AppMetrics {
    pub http_requests_total: AtomicU64,
    pub http_request_duration_ms_sum: AtomicU64,
    pub active_requests: AtomicI64,
    pub client_errors_total: AtomicU64,
    pub server_errors_total: AtomicU64,
    pub memories_added_total: AtomicU64,
    pub memories_updated_total: AtomicU64,
    pub memories_deleted_total: AtomicU64,
    pub searches_total: AtomicU64,
    pub search_latency_ms_sum: AtomicU64,
    pub resets_total: AtomicU64,
    pub reconfigures_total: AtomicU64,
    pub reconfigure_failures_total: AtomicU64,
}

impl AppMetrics {
    /// 记录 HTTP 请求
    pub fn record_http_request(&self, duration_ms: u64, status: u16) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
        self.http_request_duration_ms_sum
            .fetch_add(duration_ms, Ordering::Relaxed);
        match status {
            400..=499 => {
                self.client_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            500.. => {
                self.server_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_added(&self, count: usize) {
        self.memories_added_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_updated(&self) {
        self.memories_updated_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, count: usize) {
        self.memories_deleted_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// 记录搜索请求
    pub fn record_search(&self, duration_ms: u64) {
        self.searches_total.fetch_add(1, Ordering::Relaxed);
        self.search_latency_ms_sum
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_reset(&self) {
        self.resets_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconfigure(&self, success: bool) {
        if success {
            self.reconfigures_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reconfigure_failures_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self, generation: u64) -> String {
        let requests = self.http_requests_total.load(Ordering::Relaxed);
        let searches = self.searches_total.load(Ordering::Relaxed);
        format!(
            r#"# HELP memgate_http_requests_total Total HTTP requests
# TYPE memgate_http_requests_total counter
memgate_http_requests_total {}
# HELP memgate_http_request_duration_seconds HTTP request duration in seconds
# TYPE memgate_http_request_duration_seconds summary
memgate_http_request_duration_seconds_sum {}
memgate_http_request_duration_seconds_count {}
# HELP memgate_active_requests Requests currently being served
# TYPE memgate_active_requests gauge
memgate_active_requests {}
# HELP memgate_http_errors_total HTTP error responses by class
# TYPE memgate_http_errors_total counter
memgate_http_errors_total{{class="4xx"}} {}
memgate_http_errors_total{{class="5xx"}} {}
# HELP memgate_memories_added_total Memories stored
# TYPE memgate_memories_added_total counter
memgate_memories_added_total {}
# HELP memgate_memories_updated_total Memories updated
# TYPE memgate_memories_updated_total counter
memgate_memories_updated_total {}
# HELP memgate_memories_deleted_total Memories deleted
# TYPE memgate_memories_deleted_total counter
memgate_memories_deleted_total {}
# HELP memgate_search_requests_total Total search requests
# TYPE memgate_search_requests_total counter
memgate_search_requests_total {}
# HELP memgate_search_latency_seconds Search latency in seconds
# TYPE memgate_search_latency_seconds summary
memgate_search_latency_seconds_sum {}
memgate_search_latency_seconds_count {}
# HELP memgate_resets_total Store resets
# TYPE memgate_resets_total counter
memgate_resets_total {}
# HELP memgate_reconfigures_total Runtime reconfigurations by outcome
# TYPE memgate_reconfigures_total counter
memgate_reconfigures_total{{outcome="success"}} {}
memgate_reconfigures_total{{outcome="failure"}} {}
# HELP memgate_engine_generation Active engine generation
# TYPE memgate_engine_generation gauge
memgate_engine_generation {}
"#,
            requests,
            self.http_request_duration_ms_sum.load(Ordering::Relaxed) as f64 / 1000.0,
            requests,
            self.active_requests.load(Ordering::Relaxed),
            self.client_errors_total.load(Ordering::Relaxed),
            self.server_errors_total.load(Ordering::Relaxed),
            self.memories_added_total.load(Ordering::Relaxed),
            self.memories_updated_total.load(Ordering::Relaxed),
            self.memories_deleted_total.load(Ordering::Relaxed),
            searches,
            self.search_latency_ms_sum.load(Ordering::Relaxed) as f64 / 1000.0,
            searches,
            self.resets_total.load(Ordering::Relaxed),
            self.reconfigures_total.load(Ordering::Relaxed),
            self.reconfigure_failures_total.load(Ordering::Relaxed),
            generation,
        )
    }
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn metrics_middleware(
    State(metrics): State<Arc<AppMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    metrics.active_requests.fetch_add(1, Ordering::Relaxed);

    let response = next.run(req).await;

    metrics.active_requests.fetch_sub(1, Ordering::Relaxed);
    metrics.record_http_request(
        start.elapsed().as_millis() as u64,
        response.status().as_u16(),
    );
    response
}

// ===== Structured Logging =====

/// 初始化日志。`RUST_LOG` 优先于配置中的级别。
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},tower_http=info", config.level)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_line_number(true);

    if config.structured {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))?;
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_gather() {
        let metrics = AppMetrics::default();
        metrics.record_http_request(100, 200);
        metrics.record_http_request(20, 404);
        metrics.record_http_request(20, 503);
        metrics.record_search(50);
        metrics.record_added(3);
        metrics.record_reconfigure(false);

        let output = metrics.gather(2);
        assert!(output.contains("memgate_http_requests_total 3"));
        assert!(output.contains(r#"memgate_http_errors_total{class="4xx"} 1"#));
        assert!(output.contains(r#"memgate_http_errors_total{class="5xx"} 1"#));
        assert!(output.contains("memgate_search_requests_total 1"));
        assert!(output.contains("memgate_memories_added_total 3"));
        assert!(output.contains(r#"memgate_reconfigures_total{outcome="failure"} 1"#));
        assert!(output.contains("memgate_engine_generation 2"));
    }

    #[test]
    fn test_duration_is_reported_in_seconds() {
        let metrics = AppMetrics::default();
        metrics.record_http_request(1500, 200);
        assert!(
            metrics
                .gather(1)
                .contains("memgate_http_request_duration_seconds_sum 1.5")
        );
    }
}
