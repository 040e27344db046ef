// Prometheus metrics definitions for the clan helper.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Clan log ingestion ───────────────────────────────────────────

    /// Log lines parsed from the clan log API.
    pub static ref LOG_RECORDS_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "clan_helper_log_records_fetched_total",
        "Clan log lines parsed from the API",
    )
    .unwrap();

    /// Log lines that were new and got stored.
    pub static ref LOG_RECORDS_INSERTED_TOTAL: IntCounter = IntCounter::new(
        "clan_helper_log_records_inserted_total",
        "New clan log lines stored in the outbox",
    )
    .unwrap();

    /// Third-party fetches that failed after retries, by source (clan_logs, market).
    pub static ref FETCH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clan_helper_fetch_failures_total", "Failed third-party fetches"),
        &["source"],
    )
    .unwrap();

    // ── Outbox ───────────────────────────────────────────────────────

    /// Log lines relayed to Discord, by destination channel.
    pub static ref OUTBOX_RELAYED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clan_helper_outbox_relayed_total", "Clan log lines relayed"),
        &["channel"],
    )
    .unwrap();

    pub static ref OUTBOX_FAILED_TOTAL: IntCounter = IntCounter::new(
        "clan_helper_outbox_failed_total",
        "Clan log lines whose send failed",
    )
    .unwrap();

    pub static ref CELEBRATIONS_TOTAL: IntCounter = IntCounter::new(
        "clan_helper_celebrations_total",
        "Large donation celebrations posted",
    )
    .unwrap();

    // ── Discord ──────────────────────────────────────────────────────

    /// Scheduled posts, by kind (daily, weekly, bosssummary).
    pub static ref SCHEDULED_POSTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clan_helper_scheduled_posts_total", "Scheduled posts made"),
        &["kind"],
    )
    .unwrap();

    /// Slash command invocations, by command name.
    pub static ref COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clan_helper_commands_total", "Slash command invocations"),
        &["command"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(LOG_RECORDS_FETCHED_TOTAL.clone()),
        Box::new(LOG_RECORDS_INSERTED_TOTAL.clone()),
        Box::new(FETCH_FAILURES_TOTAL.clone()),
        Box::new(OUTBOX_RELAYED_TOTAL.clone()),
        Box::new(OUTBOX_FAILED_TOTAL.clone()),
        Box::new(CELEBRATIONS_TOTAL.clone()),
        Box::new(SCHEDULED_POSTS_TOTAL.clone()),
        Box::new(COMMANDS_TOTAL.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Encode all registered metrics as Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_register() {
        register_metrics();
        // A second registration is tolerated.
        register_metrics();

        OUTBOX_RELAYED_TOTAL.with_label_values(&["general"]).inc();
        SCHEDULED_POSTS_TOTAL.with_label_values(&["daily"]).inc();

        let output = gather_metrics();
        assert!(output.contains("clan_helper_outbox_relayed_total"));
        assert!(output.contains("kind=\"daily\""));
    }
}
