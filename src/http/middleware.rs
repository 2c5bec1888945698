use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::conditions::{RequestContext, ResponseContext};
use crate::storage::Measurement;
use crate::AppState;

// ─── Request-scoped markers ──────────────────────────────────────

/// Authenticated caller. The host's auth layer inserts this into request
/// extensions; requests without it count as anonymous.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

/// Response extension set by a cache layer when it served the response.
#[derive(Debug, Clone, Copy)]
pub struct CacheHit;

/// Per-request accumulator for backing-query cost.
///
/// The middleware inserts one into request extensions; handlers pull it out
/// with `Extension<QueryTracker>` and wrap their queries in [`QueryTracker::time`].
#[derive(Debug, Clone, Default)]
pub struct QueryTracker {
    totals: Arc<Mutex<QueryTotals>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct QueryTotals {
    count: u64,
    time: Duration,
}

impl QueryTracker {
    pub fn record(&self, elapsed: Duration) {
        let mut totals = self.totals.lock();
        totals.count += 1;
        totals.time += elapsed;
    }

    /// Await `query` and record how long it took.
    pub async fn time<F: Future>(&self, query: F) -> F::Output {
        let start = Instant::now();
        let out = query.await;
        self.record(start.elapsed());
        out
    }

    /// (query count, seconds spent in queries)
    pub fn totals(&self) -> (u64, f64) {
        let totals = *self.totals.lock();
        (totals.count, totals.time.as_secs_f64())
    }
}

// ─── Middleware ──────────────────────────────────────────────────

/// Measures every routed request and hands the facts to the profiler.
///
/// Profiling is skipped when the switch is off, the request matched no
/// route, or a condition rejects it. Timing headers are added either way:
///
///   X-Response-Time-Us: total handler wall time in microseconds
///   Server-Timing:      same value in the standard Server-Timing format
pub async fn profiling_middleware(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let endpoint = matched_path.map(|p| p.as_str().to_owned());

    let active = match &endpoint {
        Some(endpoint) => {
            state.profiler.is_on().await
                && state.conditions.allows_request(&RequestContext {
                    method: &method,
                    path: &path,
                    endpoint,
                    headers: req.headers(),
                })
        }
        None => false,
    };

    let tracker = QueryTracker::default();
    if active {
        req.extensions_mut().insert(tracker.clone());
    }
    let is_anon_call = req.extensions().get::<Principal>().is_none();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    // ── Hand off to the profiler ────────────────────────────────
    if let (true, Some(endpoint)) = (active, endpoint) {
        let allowed = state.conditions.allows_response(&ResponseContext {
            status: response.status(),
            headers: response.headers(),
        });
        if allowed {
            let (query_count, query_time) = tracker.totals();
            let measurement = Measurement {
                endpoint_name: endpoint,
                method: method.to_string(),
                is_anon_call,
                is_cache_hit: response.extensions().get::<CacheHit>().is_some(),
                query_time,
                query_count,
                call_duration: elapsed.as_secs_f64(),
            };
            state.profiler.measure(&measurement).await;
        }
    }

    // ── Inject response headers ─────────────────────────────────
    let us = elapsed.as_micros();
    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    debug!(
        status = response.status().as_u16(),
        method = %method,
        path = %path,
        us = us as u64,
        profiled = active,
        "request"
    );

    response
}
