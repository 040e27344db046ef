// Boss fight summary: poll reactions merged into one message per day.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc, Weekday};

use crate::db::{Database, MessageKind};
use crate::discord::{channel_id_by_name, Messenger, MessengerError};
use crate::error::Error;
use crate::metrics;
use crate::roster;
use crate::scheduler::{DailyJob, CLAN_TIMEZONE};

/// Appended to the names of members who signed up on the weekly poll only.
pub const WEEKLY_MARKER: &str = " [W]";

const SUMMARY_HEADER: &str = "Today's boss fight summaries:\n";

/// A boss as listed in the summary. Order of [`SUMMARY_BOSSES`] is output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BossEntry {
    pub emoji: &'static str,
    pub name: &'static str,
    /// Only tracked through the weekly poll.
    pub weekly_only: bool,
}

/// The weekly poll's Gem Quest reaction, matching the `:key:` line of its prompt.
pub const GEM_QUEST_EMOJI: &str = "🔑";

pub const SUMMARY_BOSSES: &[BossEntry] = &[
    BossEntry { emoji: "🐔", name: "Griffin", weekly_only: false },
    BossEntry { emoji: "😈", name: "Hades", weekly_only: false },
    BossEntry { emoji: "👹", name: "Devil", weekly_only: false },
    BossEntry { emoji: "⚡", name: "Zeus", weekly_only: false },
    BossEntry { emoji: "🦁", name: "Chimera", weekly_only: false },
    BossEntry { emoji: "🐍", name: "Medusa", weekly_only: false },
    BossEntry { emoji: GEM_QUEST_EMOJI, name: "Gem Quest", weekly_only: true },
];

/// Non-bot reactors for one boss emoji on each poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BossReactions {
    pub daily: HashSet<u64>,
    pub weekly: HashSet<u64>,
}

/// A member gets the weekly marker when they only reacted on the weekly poll,
/// unless the boss has no daily poll at all.
pub fn needs_weekly_marker(boss: &BossEntry, in_daily: bool) -> bool {
    !boss.weekly_only && !in_daily
}

/// One resolved reactor on a boss line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Signup {
    /// Declared first so sorting puts unmarked names ahead of marked ones.
    pub weekly_only: bool,
    pub name: String,
}

impl Signup {
    pub fn display(&self) -> String {
        if self.weekly_only {
            format!("{}{WEEKLY_MARKER}", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// A daily boss whose every participant is weekly-only stays hidden until Friday.
pub fn hidden_until_friday(boss: &BossEntry, signups: &[Signup], is_friday: bool) -> bool {
    !boss.weekly_only
        && !is_friday
        && !signups.is_empty()
        && signups.iter().all(|s| s.weekly_only)
}

/// Union both reactor sets, resolve display names (dropping unknown ids) and
/// sort unmarked names before marked ones, each group ascending.
pub fn merge_reactions_to_names(
    boss: &BossEntry,
    reactions: &BossReactions,
    id_to_name: &HashMap<u64, String>,
) -> Vec<Signup> {
    let mut signups: Vec<Signup> = reactions
        .daily
        .union(&reactions.weekly)
        .filter_map(|id| {
            let name = id_to_name.get(id)?.clone();
            let weekly_only = needs_weekly_marker(boss, reactions.daily.contains(id));
            Some(Signup { weekly_only, name })
        })
        .collect();

    signups.sort();
    signups
}

/// Render the summary message. `bosses` lists every configured boss, even
/// those nobody reacted to, so name alignment stays stable.
pub fn build_summary(
    bosses: &[(BossEntry, BossReactions)],
    id_to_name: &HashMap<u64, String>,
    is_friday: bool,
) -> String {
    let width = bosses
        .iter()
        .map(|(boss, _)| boss.name.chars().count())
        .max()
        .unwrap_or(0);

    let mut lines = vec![SUMMARY_HEADER.to_string()];
    for (boss, reactions) in bosses {
        let signups = merge_reactions_to_names(boss, reactions, id_to_name);
        if signups.is_empty() || hidden_until_friday(boss, &signups, is_friday) {
            continue;
        }

        let names: Vec<String> = signups.iter().map(Signup::display).collect();
        let mut line = format!(
            "{}`  {:<width$}:` {}",
            boss.emoji,
            boss.name,
            names.join(" · ")
        );
        if boss.weekly_only {
            line.insert(0, '\n');
        }
        lines.push(line);
    }

    lines.join("\n")
}

/// Fridays are judged in the clan's timezone.
pub fn is_friday(now: DateTime<Utc>) -> bool {
    now.with_timezone(&CLAN_TIMEZONE).weekday() == Weekday::Fri
}

/// What a manual regeneration request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regeneration {
    Posted { message_id: u64 },
    NoPreviousSummary,
    ChannelNotFound,
}

/// Posts the summary into the summary channel, replacing the previous one.
pub struct SummaryPoster {
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    boss_channel: String,
    summary_channel: String,
}

impl SummaryPoster {
    pub fn new(
        db: Arc<Database>,
        messenger: Arc<dyn Messenger>,
        boss_channel: impl Into<String>,
        summary_channel: impl Into<String>,
    ) -> Self {
        Self {
            db,
            messenger,
            boss_channel: boss_channel.into(),
            summary_channel: summary_channel.into(),
        }
    }

    /// Scheduled path: post whenever both channels resolve.
    pub async fn post(&self, now: DateTime<Utc>) -> Result<Option<u64>, Error> {
        let Some(summary_channel_id) =
            channel_id_by_name(self.messenger.as_ref(), &self.summary_channel).await
        else {
            return Ok(None);
        };
        self.post_in(summary_channel_id, now).await.map(Some)
    }

    /// Manual path: only replace a summary that was posted before.
    pub async fn regenerate(&self, now: DateTime<Utc>) -> Result<Regeneration, Error> {
        let Some(summary_channel_id) =
            channel_id_by_name(self.messenger.as_ref(), &self.summary_channel).await
        else {
            return Ok(Regeneration::ChannelNotFound);
        };

        let previous = self
            .db
            .get_last_message_ref(MessageKind::BossSummary, summary_channel_id)
            .await?;
        if previous.is_none() {
            return Ok(Regeneration::NoPreviousSummary);
        }

        match self.post_in(summary_channel_id, now).await {
            Ok(message_id) => Ok(Regeneration::Posted { message_id }),
            Err(Error::Messenger(MessengerError::NotFound(what))) => {
                tracing::warn!(what = %what, "Cannot regenerate boss summary");
                Ok(Regeneration::ChannelNotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn post_in(&self, summary_channel_id: u64, now: DateTime<Utc>) -> Result<u64, Error> {
        let boss_channel_id = channel_id_by_name(self.messenger.as_ref(), &self.boss_channel)
            .await
            .ok_or_else(|| MessengerError::NotFound(format!("channel {}", self.boss_channel)))?;

        let daily = self
            .db
            .get_last_message_ref(MessageKind::Daily, boss_channel_id)
            .await?;
        let weekly = self
            .db
            .get_last_message_ref(MessageKind::Weekly, boss_channel_id)
            .await?;

        let mut bosses = Vec::with_capacity(SUMMARY_BOSSES.len());
        for boss in SUMMARY_BOSSES {
            let reactions = BossReactions {
                daily: match (boss.weekly_only, daily) {
                    (false, Some(message_id)) => {
                        self.reactors(boss_channel_id, message_id, boss.emoji).await
                    }
                    _ => HashSet::new(),
                },
                weekly: match weekly {
                    Some(message_id) => self.reactors(boss_channel_id, message_id, boss.emoji).await,
                    None => HashSet::new(),
                },
            };
            bosses.push((*boss, reactions));
        }

        let content = build_summary(&bosses, &roster::display_names_by_user_id(), is_friday(now));

        if let Some(old_id) = self
            .db
            .get_last_message_ref(MessageKind::BossSummary, summary_channel_id)
            .await?
        {
            match self.messenger.delete_message(summary_channel_id, old_id).await {
                // The stored reference must not outlive the message if the send below fails.
                Ok(()) => {
                    self.db
                        .delete_last_message_ref(MessageKind::BossSummary, summary_channel_id)
                        .await?;
                }
                Err(e) => {
                    tracing::warn!(message_id = old_id, "Failed to delete previous boss summary: {e}");
                }
            }
        }

        let message_id = self.messenger.send_text(summary_channel_id, &content).await?;
        metrics::SCHEDULED_POSTS_TOTAL
            .with_label_values(&[MessageKind::BossSummary.as_str()])
            .inc();

        if let Err(e) = self
            .db
            .set_last_message_ref(MessageKind::BossSummary, summary_channel_id, message_id)
            .await
        {
            tracing::error!(message_id, "Failed to store boss summary reference: {e}");
        }

        tracing::info!(channel_id = summary_channel_id, message_id, "Posted boss summary");
        Ok(message_id)
    }

    /// Reaction fetch failures count as nobody having reacted.
    async fn reactors(&self, channel_id: u64, message_id: u64, emoji: &str) -> HashSet<u64> {
        match self.messenger.reactors(channel_id, message_id, emoji).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(message_id, emoji, "Failed to fetch reactions: {e}");
                HashSet::new()
            }
        }
    }
}

#[async_trait]
impl DailyJob for SummaryPoster {
    fn name(&self) -> &'static str {
        "boss_summary"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), Error> {
        self.post(now).await.map(|_| ())
    }
}
