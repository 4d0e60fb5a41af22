/// Utility helpers for stemstore

/// Format a playback position as `M:SS`. Negative, NaN and infinite input
/// renders as `0:00`.
pub fn format_time(seconds: f64) -> String {
    let total = finite_or_zero(seconds).max(0.0).floor() as u64;
    let mins = total / 60;
    let secs = total % 60;
    format!("{}:{:02}", mins, secs)
}

/// Media elements report NaN/Infinity for unknown durations.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Clamp a seek target into `[0, duration]`; an unknown duration pins to zero.
pub fn clamp_position(position: f64, duration: f64) -> f64 {
    let duration = finite_or_zero(duration).max(0.0);
    finite_or_zero(position).clamp(0.0, duration)
}

/// `current / duration`, or `0` while the duration is unknown.
pub fn progress_fraction(current: f64, duration: f64) -> f64 {
    let duration = finite_or_zero(duration);
    if duration <= 0.0 {
        return 0.0;
    }
    (finite_or_zero(current) / duration).clamp(0.0, 1.0)
}
