//! Gates deciding whether a request gets profiled.
//!
//! Conditions are consulted by the HTTP middleware before the handler runs
//! and again once the response is ready. The storage engine never sees them.

use axum::http::{HeaderMap, Method, StatusCode};

/// What a condition can inspect before the handler runs.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// Matched route pattern, e.g. "/api/users/:id"
    pub endpoint: &'a str,
    pub headers: &'a HeaderMap,
}

/// What a condition can inspect after the handler returns.
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    pub status: StatusCode,
    pub headers: &'a HeaderMap,
}

/// A yes/no predicate. Returning `false` from either hook skips profiling.
pub trait Condition: Send + Sync {
    fn process_request(&self, ctx: &RequestContext<'_>) -> bool;

    fn process_response(&self, ctx: &ResponseContext<'_>) -> bool;
}

/// Ordered list of conditions. Evaluation stops at the first `false`.
#[derive(Default)]
pub struct ConditionPipeline {
    conditions: Vec<Box<dyn Condition>>,
}

impl ConditionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    pub fn allows_request(&self, ctx: &RequestContext<'_>) -> bool {
        self.conditions.iter().all(|c| c.process_request(ctx))
    }

    pub fn allows_response(&self, ctx: &ResponseContext<'_>) -> bool {
        self.conditions.iter().all(|c| c.process_response(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        request: bool,
        response: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Condition for Fixed {
        fn process_request(&self, _: &RequestContext<'_>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.request
        }

        fn process_response(&self, _: &ResponseContext<'_>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
        }
    }

    fn fixed(request: bool, response: bool, calls: &Arc<AtomicUsize>) -> Fixed {
        Fixed {
            request,
            response,
            calls: calls.clone(),
        }
    }

    #[test]
    fn empty_pipeline_allows_everything() {
        let pipeline = ConditionPipeline::new();
        let headers = HeaderMap::new();
        let req = RequestContext {
            method: &Method::GET,
            path: "/",
            endpoint: "/",
            headers: &headers,
        };
        assert!(pipeline.allows_request(&req));
        assert!(pipeline.allows_response(&ResponseContext {
            status: StatusCode::OK,
            headers: &headers,
        }));
    }

    #[test]
    fn stops_at_first_rejection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = ConditionPipeline::new()
            .with(fixed(false, true, &calls))
            .with(fixed(true, false, &calls));
        let headers = HeaderMap::new();
        let req = RequestContext {
            method: &Method::POST,
            path: "/x",
            endpoint: "/x",
            headers: &headers,
        };

        assert!(!pipeline.allows_request(&req));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let resp = ResponseContext {
            status: StatusCode::OK,
            headers: &headers,
        };
        assert!(!pipeline.allows_response(&resp));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
