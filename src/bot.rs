// Gateway event handler and the background workers it starts once the
// session is ready.

use std::sync::{Arc, Mutex};

use chrono::NaiveTime;
use serenity::all::{Context, EventHandler, Interaction, Ready};
use serenity::async_trait;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::boss_quests::QuestPoster;
use crate::boss_summary::SummaryPoster;
use crate::clan_logs::{ClanLogPoller, RECENT_INTERVAL};
use crate::commands::{self, Commands};
use crate::config::Config;
use crate::db::Database;
use crate::discord::{Messenger, SerenityMessenger};
use crate::http::JsonFetcher;
use crate::outbox::{OutboxRelayer, RoutingRules};
use crate::scheduler::{run_daily, DailySchedule, CLAN_TIMEZONE};

/// Long-running tasks, spawned on the tracker so shutdown can wait for them.
pub struct Workers {
    pub config: Config,
    pub db: Arc<Database>,
    pub fetcher: JsonFetcher,
    pub tracker: TaskTracker,
    pub cancel: CancellationToken,
}

impl Workers {
    pub fn spawn(self, messenger: Arc<dyn Messenger>) {
        let Workers {
            config,
            db,
            fetcher,
            tracker,
            cancel,
        } = self;

        let main_log = ClanLogPoller::new(db.clone(), fetcher.clone(), config.clan_log_url.clone());
        tracker.spawn(main_log.run(config.clan_log_interval, cancel.clone()));

        let recent_log = ClanLogPoller::new(db.clone(), fetcher, config.recent_clan_log_url.clone());
        tracker.spawn(recent_log.run(RECENT_INTERVAL, cancel.clone()));

        let relayer = OutboxRelayer::new(
            db.clone(),
            messenger.clone(),
            RoutingRules {
                donation_channel: config.donation_channel.clone(),
                general_channel: config.general_channel.clone(),
                default_channel: config.clan_message_channel.clone(),
            },
            config.donation_threshold,
            config.celebration_style,
        );
        tracker.spawn(relayer.run(cancel.clone()));

        let quests = QuestPoster::new(
            db.clone(),
            messenger.clone(),
            config.boss_channel.clone(),
            cancel.clone(),
        );
        tracker.spawn(run_daily(
            DailySchedule::new(chrono_tz::UTC, NaiveTime::MIN),
            quests,
            cancel.clone(),
        ));

        let summary = SummaryPoster::new(
            db,
            messenger,
            config.boss_channel.clone(),
            config.boss_summary_channel.clone(),
        );
        let ten_am = NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN);
        tracker.spawn(run_daily(
            DailySchedule::new(CLAN_TIMEZONE, ten_am),
            summary,
            cancel,
        ));

        tracing::info!("Background workers started");
    }
}

pub struct Handler {
    commands: Commands,
    /// Taken on the first `ready`; reconnects must not start a second set.
    workers: Mutex<Option<Workers>>,
}

impl Handler {
    pub fn new(commands: Commands, workers: Workers) -> Self {
        Self {
            commands,
            workers: Mutex::new(Some(workers)),
        }
    }

    fn take_workers(&self) -> Option<Workers> {
        match self.workers.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "Connected to Discord"
        );

        if let Err(e) = commands::register(&ctx.http).await {
            tracing::error!("Failed to register slash commands: {e}");
        }

        if let Some(workers) = self.take_workers() {
            let messenger = SerenityMessenger::new(ctx.http.clone(), ctx.cache.clone());
            workers.spawn(Arc::new(messenger));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        self.commands.handle(&ctx, interaction).await;
    }
}
