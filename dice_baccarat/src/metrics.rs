//! Engine metrics recorded through the `metrics` facade.
//!
//! Nothing is exported from here. A binary that wants the numbers installs a
//! recorder (the server uses the Prometheus exporter); without one every call
//! is a no-op.

// ============================================================================
// Round Metrics
// ============================================================================

/// Increment rounds started counter.
pub fn round_started() {
    metrics::counter!("rounds_started_total").increment(1);
}

/// Increment rounds finished counter, labelled by winning class.
pub fn round_finished(winner: &str) {
    metrics::counter!("rounds_finished_total", "winner" => winner.to_string()).increment(1);
}

/// Increment rounds abandoned counter (force stop, watchdog, crash recovery).
pub fn round_abandoned(reason: &'static str) {
    metrics::counter!("rounds_abandoned_total", "reason" => reason).increment(1);
}

/// Increment accepted bets counter.
pub fn bet_placed() {
    metrics::counter!("bets_placed_total").increment(1);
}

/// Increment rejected bets counter.
pub fn bet_rejected() {
    metrics::counter!("bets_rejected_total").increment(1);
}

/// Set current active rooms count.
pub fn active_rooms(count: usize) {
    metrics::gauge!("active_rooms").set(count as f64);
}

// ============================================================================
// Effect Metrics
// ============================================================================

/// Increment delivered effects counter.
pub fn effect_delivered(kind: &'static str) {
    metrics::counter!("effects_delivered_total", "kind" => kind).increment(1);
}

/// Increment dropped effects counter.
pub fn effect_dropped(kind: &'static str) {
    metrics::counter!("effects_dropped_total", "kind" => kind).increment(1);
}

/// Increment delivery retries counter.
pub fn effect_retried() {
    metrics::counter!("effect_retries_total").increment(1);
}

/// Increment fallback draws counter.
pub fn draw_fallback() {
    metrics::counter!("draw_fallbacks_total").increment(1);
}

// ============================================================================
// Scheduler Metrics
// ============================================================================

/// Increment failed scheduled tasks counter.
pub fn task_failed(category: &'static str) {
    metrics::counter!("scheduled_tasks_failed_total", "category" => category).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        round_started();
        round_finished("tie");
        round_abandoned("watchdog");
        bet_placed();
        bet_rejected();
        active_rooms(3);
        effect_delivered("notify");
        effect_dropped("notify");
        effect_retried();
        draw_fallback();
        task_failed("countdown");
    }
}
