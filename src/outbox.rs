// Outbox relayer: delivers stored clan log lines to Discord channels chosen
// by their text, and celebrates large vault donations.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, LogRecord};
use crate::discord::{channel_id_by_name, EmbedMessage, Messenger};
use crate::metrics;
use crate::roster;
use crate::scheduler::{run_every, CLAN_TIMEZONE};

pub const RELAY_INTERVAL: Duration = Duration::from_secs(30);
pub const BATCH_SIZE: i64 = 10;
/// Pause between consecutive sends to stay clear of Discord rate limits.
pub const SEND_PAUSE: Duration = Duration::from_millis(150);
pub const DEFAULT_DONATION_THRESHOLD: u64 = 1_000_000;

const CELEBRATION_GIF: &str = "https://media.giphy.com/media/l0HlLMw4h4VELMXle/giphy.gif";
const CELEBRATION_COLOUR: u32 = 0xF1C40F;

lazy_static! {
    static ref DONATION_PATTERN: Regex =
        Regex::new(r"^(.+?)\s+added\s+(\d+)x\s+Gold\.$").expect("donation pattern is valid");
}

/// Destination channel names, by kind of log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRules {
    pub donation_channel: String,
    pub general_channel: String,
    pub default_channel: String,
}

impl RoutingRules {
    pub fn channel_for(&self, text: &str) -> &str {
        if is_gold_donation(text) {
            &self.donation_channel
        } else if is_celebration(text) {
            &self.general_channel
        } else {
            &self.default_channel
        }
    }
}

pub fn is_gold_donation(text: &str) -> bool {
    text.contains("added ") && text.contains("x Gold.")
}

pub fn is_celebration(text: &str) -> bool {
    text.to_lowercase().contains("congratulat") || text.contains("reached level")
}

/// `` `[Jan 20 10:04]` text `` with the time shown in the clan's timezone.
pub fn format_record(record: &LogRecord) -> String {
    let local = record.timestamp.with_timezone(&CLAN_TIMEZONE);
    format!("`[{}]` {}", local.format("%b %e %H:%M"), record.message)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Donation {
    pub member: String,
    pub amount: u64,
}

/// A gold donation of at least `threshold`.
pub fn parse_large_donation(text: &str, threshold: u64) -> Option<Donation> {
    let caps = DONATION_PATTERN.captures(text)?;
    let amount: u64 = caps[2].parse().ok()?;
    if amount < threshold {
        return None;
    }
    Some(Donation {
        member: caps[1].to_string(),
        amount,
    })
}

/// How a large donation is announced in the general channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CelebrationStyle {
    #[default]
    Text,
    /// Rich embed that mentions the member when their Discord id is known.
    Embed,
}

impl FromStr for CelebrationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(CelebrationStyle::Text),
            "embed" => Ok(CelebrationStyle::Embed),
            other => Err(format!("unknown celebration style '{other}' (expected text or embed)")),
        }
    }
}

/// Group digits in threes: `1500000` → `1,500,000`.
fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn celebration_text(donation: &Donation) -> String {
    format!(
        "Leadership commends {} for their exceptional Clan Vault contribution. This selfless act of organizational commitment exemplifies KlutzCo values. Well done.\n\n{CELEBRATION_GIF}",
        donation.member
    )
}

pub fn celebration_embed(donation: &Donation) -> EmbedMessage {
    let who = roster::mention_for_member(&donation.member).unwrap_or_else(|| donation.member.clone());
    EmbedMessage {
        title: "Clan Vault Contribution".into(),
        description: format!(
            "Leadership commends {who} for contributing **{} gold** to the Clan Vault. This selfless act of organizational commitment exemplifies KlutzCo values. Well done.",
            with_thousands(donation.amount)
        ),
        image: Some(CELEBRATION_GIF.into()),
        colour: CELEBRATION_COLOUR,
        ..Default::default()
    }
}

/// Counts from one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub sent: usize,
    pub failed: usize,
    /// Records whose destination channel could not be resolved.
    pub skipped: usize,
    pub celebrations: usize,
}

pub struct OutboxRelayer {
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    rules: RoutingRules,
    donation_threshold: u64,
    celebration_style: CelebrationStyle,
    send_pause: Duration,
}

impl OutboxRelayer {
    pub fn new(
        db: Arc<Database>,
        messenger: Arc<dyn Messenger>,
        rules: RoutingRules,
        donation_threshold: u64,
        celebration_style: CelebrationStyle,
    ) -> Self {
        Self {
            db,
            messenger,
            rules,
            donation_threshold,
            celebration_style,
            send_pause: SEND_PAUSE,
        }
    }

    pub fn with_send_pause(mut self, pause: Duration) -> Self {
        self.send_pause = pause;
        self
    }

    /// Deliver the oldest unsent batch. Records stay unsent when their channel
    /// is missing or their send fails, so the next pass retries them.
    pub async fn relay_pending(&self, cancel: &CancellationToken) -> Result<RelayReport, sqlx::Error> {
        let records = self.db.get_unsent_records(BATCH_SIZE).await?;
        let mut report = RelayReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        // Destinations in first-seen order; records keep their order within each.
        let mut by_channel: Vec<(&str, Vec<&LogRecord>)> = Vec::new();
        for record in &records {
            let channel = self.rules.channel_for(&record.message);
            match by_channel.iter_mut().find(|(name, _)| *name == channel) {
                Some((_, group)) => group.push(record),
                None => by_channel.push((channel, vec![record])),
            }
        }

        let mut sent_ids = Vec::with_capacity(records.len());
        'channels: for (channel, group) in by_channel {
            let Some(channel_id) = channel_id_by_name(self.messenger.as_ref(), channel).await else {
                tracing::warn!(channel, records = group.len(), "Destination channel missing, leaving records unsent");
                report.skipped += group.len();
                continue;
            };

            for record in group {
                match self.messenger.send_text(channel_id, &format_record(record)).await {
                    Ok(_) => {
                        sent_ids.push(record.id);
                        report.sent += 1;
                        metrics::OUTBOX_RELAYED_TOTAL.with_label_values(&[channel]).inc();
                        if self.celebrate(&record.message).await {
                            report.celebrations += 1;
                        }
                    }
                    Err(e) => {
                        tracing::error!(id = record.id, channel, "Failed to relay clan log line: {e}");
                        report.failed += 1;
                        metrics::OUTBOX_FAILED_TOTAL.inc();
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break 'channels,
                    _ = tokio::time::sleep(self.send_pause) => {}
                }
            }
        }

        if !sent_ids.is_empty() {
            if let Err(e) = self.db.mark_sent(&sent_ids).await {
                tracing::error!(count = sent_ids.len(), "Failed to mark records sent: {e}");
            }
        }
        Ok(report)
    }

    /// Post the large-donation announcement if `text` qualifies. Failures are
    /// logged and never affect the relay of the record itself.
    async fn celebrate(&self, text: &str) -> bool {
        let Some(donation) = parse_large_donation(text, self.donation_threshold) else {
            return false;
        };
        let Some(channel_id) =
            channel_id_by_name(self.messenger.as_ref(), &self.rules.general_channel).await
        else {
            return false;
        };

        let posted = match self.celebration_style {
            CelebrationStyle::Text => {
                self.messenger
                    .send_text(channel_id, &celebration_text(&donation))
                    .await
            }
            CelebrationStyle::Embed => {
                self.messenger
                    .send_embed(channel_id, celebration_embed(&donation))
                    .await
            }
        };
        match posted {
            Ok(_) => {
                metrics::CELEBRATIONS_TOTAL.inc();
                tracing::info!(member = %donation.member, amount = donation.amount, "Celebrated large donation");
                true
            }
            Err(e) => {
                tracing::error!(member = %donation.member, "Failed to post donation celebration: {e}");
                false
            }
        }
    }

    /// Relay now and then every [`RELAY_INTERVAL`] until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let token = cancel.clone();
        let (this, token) = (&self, &token);
        run_every("outbox", RELAY_INTERVAL, cancel, move || async move {
            match this.relay_pending(token).await {
                Ok(report) if report == RelayReport::default() => {}
                Ok(report) => tracing::info!(
                    sent = report.sent,
                    failed = report.failed,
                    skipped = report.skipped,
                    celebrations = report.celebrations,
                    "Relayed clan log lines"
                ),
                Err(e) => tracing::error!("Failed to load unsent clan log lines: {e}"),
            }
        })
        .await;
    }
}
