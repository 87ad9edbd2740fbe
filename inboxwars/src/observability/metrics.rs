//! Prometheus metrics.
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs a recorder. Labels are limited to fixed sets
//! (phase names, add-on kinds) so player input cannot grow cardinality.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::InboxWarsError;
use crate::phase::GamePhase;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global recorder.
///
/// With `port`, a Prometheus HTTP listener is bound on
/// `127.0.0.1:<port>`. Later calls are ignored.
///
/// # Errors
///
/// Returns `InboxWarsError::Io` if the recorder or listener cannot be
/// installed.
pub fn init_metrics(port: Option<u16>) -> Result<(), InboxWarsError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| InboxWarsError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "inboxwars_phase_transitions_total",
        "Phase transitions by phase entered"
    );
    describe_counter!("inboxwars_rounds_resolved_total", "Rounds resolved and recorded");
    describe_counter!(
        "inboxwars_resolution_failures_total",
        "Round calculations that failed"
    );
    describe_counter!(
        "inboxwars_apply_failures_total",
        "Round results that could not be fully applied"
    );
    describe_histogram!(
        "inboxwars_resolution_duration_ms",
        "Round calculation duration in milliseconds"
    );
    describe_counter!("inboxwars_auto_locks_total", "Participants locked in by the timer");
    describe_counter!(
        "inboxwars_auto_corrections_total",
        "Onboarding add-ons removed to fit a budget"
    );
    describe_counter!(
        "inboxwars_investigations_total",
        "Investigations triggered by consensus"
    );
    describe_counter!(
        "inboxwars_clients_suspended_total",
        "Clients suspended by investigations"
    );
    describe_counter!("inboxwars_spam_trap_hits_total", "Spam-trap hits");
    describe_gauge!("inboxwars_sessions_active", "Sessions in the store");
}

/// Records a phase transition.
pub fn record_phase_transition(to: GamePhase) {
    counter!("inboxwars_phase_transitions_total", "phase" => to.as_str()).increment(1);
}

/// Records a round resolved and appended to history.
pub fn record_round_resolved(duration: Duration) {
    counter!("inboxwars_rounds_resolved_total").increment(1);
    histogram!("inboxwars_resolution_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Records a failed round calculation.
pub fn record_resolution_failure() {
    counter!("inboxwars_resolution_failures_total").increment(1);
}

/// Records a round result that was only partly applied.
pub fn record_apply_failure() {
    counter!("inboxwars_apply_failures_total").increment(1);
}

/// Records participants locked by the timer.
pub fn record_auto_locks(count: usize) {
    counter!("inboxwars_auto_locks_total").increment(count as u64);
}

/// Records add-ons removed by auto-correction.
pub fn record_auto_corrections(count: usize) {
    if count > 0 {
        counter!("inboxwars_auto_corrections_total").increment(count as u64);
    }
}

/// Records a triggered investigation and whether it suspended a client.
pub fn record_investigation(suspended: bool) {
    counter!("inboxwars_investigations_total").increment(1);
    if suspended {
        counter!("inboxwars_clients_suspended_total").increment(1);
    }
}

/// Records spam-trap hits.
pub fn record_spam_trap_hits(count: usize) {
    if count > 0 {
        counter!("inboxwars_spam_trap_hits_total").increment(count as u64);
    }
}

/// Sets the number of stored sessions.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions_active(count: usize) {
    gauge!("inboxwars_sessions_active").set(count as f64);
}
