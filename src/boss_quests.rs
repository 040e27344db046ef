// Boss quest polls: a prompt posted at midnight UTC that members answer by
// reacting with the emoji of each boss they still need.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use tokio_util::sync::CancellationToken;

use crate::boss_summary::SUMMARY_BOSSES;
use crate::db::{Database, MessageKind};
use crate::discord::{channel_id_by_name, Messenger, MessengerError};
use crate::error::Error;
use crate::metrics;
use crate::retry::{Failure, RetryError, RetryPolicy};
use crate::scheduler::DailyJob;

const SEND_RETRY: RetryPolicy = RetryPolicy::linear(3, Duration::from_millis(500));
const REACTION_RETRY: RetryPolicy = RetryPolicy::linear(3, Duration::from_millis(300));

const BOSS_LINES: &str = "\n\n  :chicken:  Griffin\n :imp:  Hades\n :japanese_ogre:  Devil\n :zap:  Zeus\n :lion_face:  Chimera\n :snake:  Medusa";
const GEM_QUEST_LINE: &str = "\n :key:  Gem quest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestKind {
    Daily,
    Weekly,
}

impl QuestKind {
    pub fn message_kind(self) -> MessageKind {
        match self {
            QuestKind::Daily => MessageKind::Daily,
            QuestKind::Weekly => MessageKind::Weekly,
        }
    }

    /// Kinds due on `date`, in posting order: Monday gets the weekly poll first.
    pub fn due_on(date: NaiveDate) -> Vec<QuestKind> {
        if date.weekday() == Weekday::Mon {
            vec![QuestKind::Weekly, QuestKind::Daily]
        } else {
            vec![QuestKind::Daily]
        }
    }
}

/// `1` → `st`, `2` → `nd`, `3` → `rd`, everything else (and 11-13) → `th`.
pub fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Prompt text plus the reactions to seed it with, in display order.
pub fn build_quest_prompt(kind: QuestKind, date: NaiveDate) -> (String, Vec<&'static str>) {
    // Seeded from the summary's boss list so every reaction is one it reads back.
    let reactions = SUMMARY_BOSSES
        .iter()
        .filter(|boss| kind == QuestKind::Weekly || !boss.weekly_only)
        .map(|boss| boss.emoji)
        .collect();
    let content = match kind {
        QuestKind::Daily => format!(
            "What are your **daily boss quests today ({} {}{})?**{BOSS_LINES}",
            date.format("%b"),
            date.day(),
            ordinal_suffix(date.day())
        ),
        QuestKind::Weekly => {
            format!("What are your **weekly boss quests this week?**{BOSS_LINES}{GEM_QUEST_LINE}")
        }
    };
    (content, reactions)
}

/// Posts the quest polls and records each one as the latest of its kind.
pub struct QuestPoster {
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    channel: String,
    cancel: CancellationToken,
}

impl QuestPoster {
    pub fn new(
        db: Arc<Database>,
        messenger: Arc<dyn Messenger>,
        channel: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            messenger,
            channel: channel.into(),
            cancel,
        }
    }

    /// Post one poll. Returns the new message id, or `None` when the channel
    /// is missing or not writable.
    pub async fn post(&self, kind: QuestKind, date: NaiveDate) -> Result<Option<u64>, Error> {
        let Some(channel_id) = channel_id_by_name(self.messenger.as_ref(), &self.channel).await
        else {
            return Ok(None);
        };

        match self.messenger.can_send(channel_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(channel = %self.channel, "Missing view/send permission, skipping poll");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(channel = %self.channel, "Permission check failed, skipping poll: {e}");
                return Ok(None);
            }
        }

        let (content, reactions) = build_quest_prompt(kind, date);

        let messenger = &self.messenger;
        let sent = SEND_RETRY
            .run(&self.cancel, |attempt| {
                let content = &content;
                async move {
                    messenger.send_text(channel_id, content).await.map_err(|e| {
                        tracing::warn!(attempt, "Failed to send quest poll: {e}");
                        Failure::Transient(e)
                    })
                }
            })
            .await;
        let message_id = match sent {
            Ok(id) => id,
            Err(RetryError::Cancelled) => return Ok(None),
            Err(RetryError::Exhausted { last, .. }) | Err(RetryError::Aborted(last)) => {
                return Err(last.into());
            }
        };

        for emoji in reactions {
            let added = REACTION_RETRY
                .run(&self.cancel, |attempt| async move {
                    messenger
                        .add_reaction(channel_id, message_id, emoji)
                        .await
                        .map_err(|e: MessengerError| {
                            tracing::warn!(attempt, emoji, "Failed to add reaction: {e}");
                            Failure::Transient(e)
                        })
                })
                .await;
            match added {
                Ok(()) => {}
                Err(RetryError::Cancelled) => break,
                Err(e) => tracing::error!(emoji, "Giving up on reaction: {e}"),
            }
        }

        self.db
            .set_last_message_ref(kind.message_kind(), channel_id, message_id)
            .await?;
        metrics::SCHEDULED_POSTS_TOTAL
            .with_label_values(&[kind.message_kind().as_str()])
            .inc();

        tracing::info!(kind = kind.message_kind().as_str(), channel = %self.channel, message_id, "Posted boss quest poll");
        Ok(Some(message_id))
    }
}

#[async_trait]
impl DailyJob for QuestPoster {
    fn name(&self) -> &'static str {
        "boss_quests"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<(), Error> {
        let today = now.date_naive();
        for kind in QuestKind::due_on(today) {
            if let Err(e) = self.post(kind, today).await {
                tracing::error!(kind = kind.message_kind().as_str(), "Failed to post boss quest poll: {e}");
            }
        }
        Ok(())
    }
}
