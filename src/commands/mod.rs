// Slash commands: definitions, registration and interaction dispatch.

pub mod boss_info;
pub mod boss_summary;
pub mod market_food;

use std::sync::Arc;

use chrono::Utc;
use serenity::all::{
    Command, CommandDataOption, CommandInteraction, CommandOptionType, Context,
    CreateAutocompleteResponse, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse, Http, Interaction,
};
use tokio_util::sync::CancellationToken;

use crate::boss_summary::SummaryPoster;
use crate::db::Database;
use crate::discord::{EmbedMessage, SerenityMessenger};
use crate::metrics;

use market_food::MarketClient;

/// Discord rejects autocomplete responses with more choices than this.
pub const MAX_CHOICES: usize = 25;

/// Upper-case the first letter of every word and lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_whitespace() || c == '-' {
            word_start = true;
            out.push(c);
        } else if word_start {
            out.extend(c.to_uppercase());
            word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// A command answer, independent of how it is delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub content: Option<String>,
    pub embed: Option<EmbedMessage>,
    pub ephemeral: bool,
}

impl Reply {
    pub fn text(content: impl Into<String>, ephemeral: bool) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
            ephemeral,
        }
    }

    pub fn embed(embed: EmbedMessage, ephemeral: bool) -> Self {
        Self {
            content: None,
            embed: Some(embed),
            ephemeral,
        }
    }

    fn into_message(self) -> CreateInteractionResponseMessage {
        let mut message = CreateInteractionResponseMessage::new().ephemeral(self.ephemeral);
        if let Some(content) = self.content {
            message = message.content(content);
        }
        if let Some(embed) = self.embed {
            message = message.embed(embed.into());
        }
        message
    }
}

pub fn boss_reply(name: &str, just_for_me: bool) -> Reply {
    match boss_info::find_by_name(name) {
        Some(boss) => Reply::embed(boss_info::boss_embed(name, boss), just_for_me),
        None => Reply::text(format!("Unknown boss: {name}"), just_for_me),
    }
}

pub fn key_reply(name: &str, just_for_me: bool) -> Reply {
    match boss_info::find_by_key(name) {
        Some(boss) => Reply::embed(boss_info::key_embed(name, boss), just_for_me),
        None => Reply::text(format!("Unknown key: {name}"), just_for_me),
    }
}

fn just_for_me_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::Boolean,
        "just_for_me",
        "Only show the result to me.",
    )
}

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("boss")
            .description("Find a boss information by its name")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "name",
                    "The name of the boss to find.",
                )
                .required(true)
                .set_autocomplete(true),
            )
            .add_option(just_for_me_option()),
        CreateCommand::new("keys")
            .description("Find a boss information by its key")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "name",
                    "The name of the key you have.",
                )
                .required(true)
                .set_autocomplete(true),
            )
            .add_option(just_for_me_option()),
        CreateCommand::new("market-food")
            .description("Show cost-effective food items based on current market prices")
            .add_option(just_for_me_option()),
        CreateCommand::new("boss_summary").description("Regenerate the boss summary message"),
    ]
}

/// Replace the global command set with [`definitions`].
pub async fn register(http: &Http) -> Result<(), serenity::Error> {
    let registered = Command::set_global_commands(http, definitions()).await?;
    tracing::info!(count = registered.len(), "Registered slash commands");
    Ok(())
}

fn string_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str())
}

fn bool_option(options: &[CommandDataOption], name: &str) -> bool {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_bool())
        .unwrap_or(false)
}

/// Everything the command handlers need beyond the interaction itself.
pub struct Commands {
    db: Arc<Database>,
    market: MarketClient,
    boss_channel: String,
    summary_channel: String,
    cancel: CancellationToken,
}

impl Commands {
    pub fn new(
        db: Arc<Database>,
        market: MarketClient,
        boss_channel: impl Into<String>,
        summary_channel: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            market,
            boss_channel: boss_channel.into(),
            summary_channel: summary_channel.into(),
            cancel,
        }
    }

    pub async fn handle(&self, ctx: &Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => self.handle_command(ctx, &command).await,
            Interaction::Autocomplete(autocomplete) => {
                handle_autocomplete(ctx, &autocomplete).await
            }
            _ => {}
        }
    }

    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) {
        let name = command.data.name.as_str();
        metrics::COMMANDS_TOTAL.with_label_values(&[name]).inc();
        let options = &command.data.options;

        let reply = match name {
            "boss" => boss_reply(
                string_option(options, "name").unwrap_or_default(),
                bool_option(options, "just_for_me"),
            ),
            "keys" => key_reply(
                string_option(options, "name").unwrap_or_default(),
                bool_option(options, "just_for_me"),
            ),
            "market-food" => self.market_food(bool_option(options, "just_for_me")).await,
            "boss_summary" => return self.regenerate_summary(ctx, command).await,
            other => {
                tracing::warn!(command = other, "Unknown command");
                return;
            }
        };

        if let Err(e) = command
            .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_message()))
            .await
        {
            tracing::error!(command = name, "Failed to respond to command: {e}");
        }
    }

    async fn market_food(&self, just_for_me: bool) -> Reply {
        let prices = match self.market.latest_prices(&self.cancel).await {
            Ok(prices) => prices,
            Err(e) => {
                metrics::FETCH_FAILURES_TOTAL.with_label_values(&["market"]).inc();
                tracing::error!("Failed to fetch market prices: {e}");
                return Reply::text(
                    "❌ Failed to fetch market data. The API may be temporarily unavailable. Please try again later.",
                    true,
                );
            }
        };

        let values = market_food::calculate_food_values(&prices);
        if values.is_empty() {
            return Reply::text(
                "⚠️ No food items found with valid market prices. Try again later.",
                just_for_me,
            );
        }

        let total = values.len();
        let values = market_food::filter_dominated(values);
        tracing::info!(shown = values.len(), total, "Market food values computed");
        Reply::embed(market_food::food_embed(&values), just_for_me)
    }

    async fn regenerate_summary(&self, ctx: &Context, command: &CommandInteraction) {
        if let Err(e) = command.defer_ephemeral(&ctx.http).await {
            tracing::error!("Failed to acknowledge /boss_summary: {e}");
            return;
        }

        let messenger = SerenityMessenger::new(ctx.http.clone(), ctx.cache.clone());
        let poster = SummaryPoster::new(
            self.db.clone(),
            Arc::new(messenger),
            &self.boss_channel,
            &self.summary_channel,
        );
        let outcome = poster.regenerate(Utc::now()).await;
        if let Err(e) = &outcome {
            tracing::error!("Failed to regenerate boss summary: {e}");
        }

        let edit = EditInteractionResponse::new().content(boss_summary::outcome_message(&outcome));
        if let Err(e) = command.edit_response(&ctx.http, edit).await {
            tracing::error!("Failed to update /boss_summary response: {e}");
        }
    }
}

async fn handle_autocomplete(ctx: &Context, interaction: &CommandInteraction) {
    let Some(focused) = interaction.data.autocomplete() else {
        return;
    };

    let choices = match interaction.data.name.as_str() {
        "boss" => boss_info::boss_choices(focused.value),
        "keys" => boss_info::key_choices(focused.value),
        _ => return,
    };

    let response = choices
        .into_iter()
        .fold(CreateAutocompleteResponse::new(), |response, (label, value)| {
            response.add_string_choice(label, value)
        });
    if let Err(e) = interaction
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await
    {
        tracing::warn!(command = %interaction.data.name, "Failed to send autocomplete choices: {e}");
    }
}
