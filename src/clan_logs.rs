// Clan activity log poller: pulls the clan log from the game API and stores
// new lines in the outbox.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::db::{Database, InsertOutcome, NewLogRecord};
use crate::http::{FetchError, JsonFetcher};
use crate::metrics;
use crate::scheduler::run_every;

pub const DEFAULT_CLAN_LOG_URL: &str =
    "https://query.idleclans.com/api/Clan/logs/clan/KlutzCo?limit=500";
pub const RECENT_CLAN_LOG_URL: &str =
    "https://query.idleclans.com/api/Clan/logs/clan/KlutzCo?limit=10";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const RECENT_INTERVAL: Duration = Duration::from_secs(60);

/// JSON numbers above this are epoch milliseconds, below it epoch seconds.
const MILLIS_THRESHOLD: f64 = 1e12;

/// Interpret a loosely typed timestamp: RFC3339, `YYYY-MM-DD HH:MM:SS` (UTC),
/// a numeric string (13 digits means milliseconds, otherwise seconds) or a
/// JSON number.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(ts.and_utc());
            }
            let n: i64 = s.parse().ok()?;
            if s.len() == 13 {
                DateTime::from_timestamp_millis(n)
            } else {
                DateTime::from_timestamp(n, 0)
            }
        }
        Value::Number(n) => {
            if let Some(secs) = n.as_i64().filter(|v| (*v as f64) <= MILLIS_THRESHOLD) {
                return DateTime::from_timestamp(secs, 0);
            }
            let f = n.as_f64()?;
            if f > MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(f as i64)
            } else {
                DateTime::from_timestamp(f as i64, 0)
            }
        }
        _ => None,
    }
}

fn string_field(item: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| item.get(*key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Normalise raw log items. Items without a usable timestamp are skipped.
pub fn parse_clan_logs(items: &[Map<String, Value>]) -> Vec<NewLogRecord> {
    items
        .iter()
        .filter_map(|item| {
            let Some(raw) = item.get("timestamp").or_else(|| item.get("time")) else {
                tracing::warn!("Clan log item has no timestamp, skipping");
                return None;
            };
            let Some(timestamp) = parse_timestamp(raw) else {
                tracing::warn!(raw = %raw, "Unparsable clan log timestamp, skipping");
                return None;
            };
            Some(NewLogRecord {
                clan_name: string_field(item, &["clanName", "clan_name"]),
                member_name: string_field(item, &["memberUsername", "member_username"]),
                message: string_field(item, &["message"]),
                timestamp,
            })
        })
        .collect()
}

/// Counts from one fetch cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Fetches one clan-log endpoint and stores whatever it has not seen yet.
pub struct ClanLogPoller {
    db: Arc<Database>,
    fetcher: JsonFetcher,
    url: String,
}

impl ClanLogPoller {
    pub fn new(db: Arc<Database>, fetcher: JsonFetcher, url: impl Into<String>) -> Self {
        Self {
            db,
            fetcher,
            url: url.into(),
        }
    }

    pub async fn fetch_and_store(&self, cancel: &CancellationToken) -> Result<FetchReport, FetchError> {
        let items: Vec<Map<String, Value>> = self.fetcher.get_json(&self.url, cancel).await?;
        let records = parse_clan_logs(&items);

        let mut report = FetchReport {
            fetched: records.len(),
            ..Default::default()
        };
        for record in &records {
            match self.db.insert_log_record(record).await {
                Ok(InsertOutcome::Inserted) => report.inserted += 1,
                Ok(InsertOutcome::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    tracing::error!(member = %record.member_name, "Failed to store clan log line: {e}");
                    report.failed += 1;
                }
            }
        }

        metrics::LOG_RECORDS_FETCHED_TOTAL.inc_by(report.fetched as u64);
        metrics::LOG_RECORDS_INSERTED_TOTAL.inc_by(report.inserted as u64);
        Ok(report)
    }

    /// Fetch now and then every `interval` until cancelled.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let token = cancel.clone();
        let (this, token) = (&self, &token);
        run_every("clan_logs", interval, cancel, move || async move {
            match this.fetch_and_store(token).await {
                Ok(report) => tracing::info!(
                    url = %this.url,
                    fetched = report.fetched,
                    inserted = report.inserted,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    "Clan log fetch complete"
                ),
                Err(FetchError::Cancelled) => {}
                Err(e) => {
                    metrics::FETCH_FAILURES_TOTAL.with_label_values(&["clan_logs"]).inc();
                    tracing::error!(url = %this.url, "Clan log fetch failed: {e}");
                }
            }
        })
        .await;
    }
}
