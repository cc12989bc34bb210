//! Timing wrappers that feed the [`PerformanceMonitor`].
//!
//! Each helper records one metric per call: status 200 when the wrapped
//! operation returns `Ok`, 500 when it returns `Err`. The result is passed
//! through untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::observability::performance::{MetricSample, PerformanceMonitor};

const QUERY_ROUTE_CHARS: usize = 50;

fn status_of<T, E>(result: &Result<T, E>) -> u16 {
    if result.is_ok() {
        200
    } else {
        500
    }
}

fn record(monitor: &PerformanceMonitor, route: String, method: &str, started: Instant, status: u16) {
    monitor.record_metric(MetricSample::new(
        route,
        method,
        started.elapsed().as_millis() as u64,
        status,
    ));
}

/// Wrap `f` so every call is timed under route `function:<name>`.
pub fn instrument<A, T, E, F>(
    monitor: Arc<PerformanceMonitor>,
    name: &str,
    f: F,
) -> impl Fn(A) -> Result<T, E>
where
    F: Fn(A) -> Result<T, E>,
{
    let route = format!("function:{}", name);
    move |arg| {
        let started = Instant::now();
        let result = f(arg);
        record(&monitor, route.clone(), "FUNCTION", started, status_of(&result));
        result
    }
}

/// Time a future under route `function:<name>`.
pub async fn measure_async<T, E, Fut>(monitor: &PerformanceMonitor, name: &str, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = fut.await;
    record(monitor, format!("function:{}", name), "FUNCTION", started, status_of(&result));
    result
}

/// Time a synchronous closure under route `sync:<name>`.
pub fn measure_sync<T, E, F>(monitor: &PerformanceMonitor, name: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let started = Instant::now();
    let result = f();
    record(monitor, format!("sync:{}", name), "SYNC", started, status_of(&result));
    result
}

/// Time a database call. The route is `db:` plus the first 50 characters of the query.
pub async fn measure_query<T, E, Fut>(monitor: &PerformanceMonitor, query: &str, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = fut.await;
    let route = format!("db:{}", query.chars().take(QUERY_ROUTE_CHARS).collect::<String>());
    record(monitor, route, "QUERY", started, status_of(&result));
    result
}
