#[inline]
pub fn log_perf(scope: &str, started_at_ms: i64, finished_at_ms: i64, details: &str) {
    let elapsed_ms = finished_at_ms.saturating_sub(started_at_ms).max(0);
    if details.trim().is_empty() {
        tracing::debug!(target: "stemstore::perf", "{scope} took {elapsed_ms}ms");
    } else {
        tracing::debug!(target: "stemstore::perf", "{scope} took {elapsed_ms}ms | {details}");
    }
}
