use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde::Serialize;

/// Process-wide request counters published at `/debug/vars`
#[derive(Debug, Default)]
pub struct Metrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    by_status: Mutex<BTreeMap<u16, u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_active_requests: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self, status: StatusCode, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);

        let mut by_status = self.by_status.lock().unwrap_or_else(PoisonError::into_inner);
        *by_status.entry(status.as_u16()).or_default() += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let received = self.requests_received.load(Ordering::Relaxed);
        let sent = self.responses_sent.load(Ordering::Relaxed);
        let by_status = self
            .by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(code, count)| (code.to_string(), *count))
            .collect();

        MetricsSnapshot {
            total_requests_received: received,
            total_responses_sent: sent,
            total_active_requests: received.saturating_sub(sent),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: by_status,
        }
    }
}

pub async fn track_metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    metrics.request_received();

    let response = next.run(request).await;

    metrics.response_sent(response.status(), started.elapsed());
    response
}
