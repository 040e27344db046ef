// The slice of the Discord API the background tasks need, behind a trait so
// the posting logic can run against a fake in tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    Cache, ChannelId, ChannelType, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildChannel,
    Http, MessageId, ReactionType, UserId,
};
use thiserror::Error;

/// Discord caps a single reaction-users page at 100 entries.
pub const MAX_REACTORS_PER_EMOJI: u8 = 100;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("discord api error: {0}")]
    Discord(#[from] serenity::Error),
    #[error("{0} not found")]
    NotFound(String),
}

/// A rich embed, independent of any client library's builder types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedMessage {
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub image: Option<String>,
    pub colour: u32,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl From<EmbedMessage> for CreateEmbed {
    fn from(embed: EmbedMessage) -> Self {
        let mut builder = CreateEmbed::new()
            .title(embed.title)
            .description(embed.description)
            .colour(embed.colour);
        if let Some(url) = embed.url {
            builder = builder.url(url);
        }
        if let Some(image) = embed.image {
            builder = builder.image(image);
        }
        if !embed.fields.is_empty() {
            builder = builder.fields(
                embed
                    .fields
                    .into_iter()
                    .map(|f| (f.name, f.value, f.inline)),
            );
        }
        if let Some(footer) = embed.footer {
            builder = builder.footer(CreateEmbedFooter::new(footer));
        }
        builder
    }
}

/// Outbound messaging operations used by the schedulers and the relayer.
/// Ids are raw Discord snowflakes.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// First guild text channel named `name`, across every guild the bot is in.
    async fn find_channel_id(&self, name: &str) -> Result<Option<u64>, MessengerError>;

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<u64, MessengerError>;

    async fn send_embed(&self, channel_id: u64, embed: EmbedMessage) -> Result<u64, MessengerError>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), MessengerError>;

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), MessengerError>;

    /// Distinct non-bot users who reacted with `emoji` (first page only).
    async fn reactors(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<HashSet<u64>, MessengerError>;

    /// Whether the bot may both view and post in the channel.
    async fn can_send(&self, channel_id: u64) -> Result<bool, MessengerError>;
}

/// Resolve a channel name to an id, logging (not propagating) lookup errors.
pub async fn channel_id_by_name(messenger: &dyn Messenger, name: &str) -> Option<u64> {
    match messenger.find_channel_id(name).await {
        Ok(Some(id)) => Some(id),
        Ok(None) => {
            tracing::warn!(channel = name, "Channel not found");
            None
        }
        Err(e) => {
            tracing::error!(channel = name, "Channel lookup failed: {e}");
            None
        }
    }
}

/// [`Messenger`] backed by serenity's HTTP client and gateway cache.
#[derive(Clone)]
pub struct SerenityMessenger {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityMessenger {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    fn channel(id: u64) -> Result<ChannelId, MessengerError> {
        if id == 0 {
            return Err(MessengerError::NotFound("channel 0".into()));
        }
        Ok(ChannelId::new(id))
    }

    fn message(id: u64) -> Result<MessageId, MessengerError> {
        if id == 0 {
            return Err(MessengerError::NotFound("message 0".into()));
        }
        Ok(MessageId::new(id))
    }
}

#[async_trait]
impl Messenger for SerenityMessenger {
    async fn find_channel_id(&self, name: &str) -> Result<Option<u64>, MessengerError> {
        let guilds = self.http.get_guilds(None, None).await?;
        for guild in guilds {
            let channels = match guild.id.channels(&self.http).await {
                Ok(channels) => channels,
                Err(e) => {
                    tracing::warn!(guild_id = %guild.id, "Failed to list guild channels: {e}");
                    continue;
                }
            };
            if let Some(channel) = channels
                .values()
                .find(|c| c.kind == ChannelType::Text && c.name == name)
            {
                return Ok(Some(channel.id.get()));
            }
        }
        Ok(None)
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<u64, MessengerError> {
        let message = Self::channel(channel_id)?.say(&self.http, content).await?;
        Ok(message.id.get())
    }

    async fn send_embed(&self, channel_id: u64, embed: EmbedMessage) -> Result<u64, MessengerError> {
        let message = Self::channel(channel_id)?
            .send_message(&self.http, CreateMessage::new().embed(embed.into()))
            .await?;
        Ok(message.id.get())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), MessengerError> {
        Self::channel(channel_id)?
            .delete_message(&self.http, Self::message(message_id)?)
            .await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), MessengerError> {
        Self::channel(channel_id)?
            .create_reaction(
                &self.http,
                Self::message(message_id)?,
                ReactionType::Unicode(emoji.to_string()),
            )
            .await?;
        Ok(())
    }

    async fn reactors(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<HashSet<u64>, MessengerError> {
        let users = Self::channel(channel_id)?
            .reaction_users(
                &self.http,
                Self::message(message_id)?,
                ReactionType::Unicode(emoji.to_string()),
                Some(MAX_REACTORS_PER_EMOJI),
                None::<UserId>,
            )
            .await?;
        Ok(users
            .into_iter()
            .filter(|u| !u.bot)
            .map(|u| u.id.get())
            .collect())
    }

    async fn can_send(&self, channel_id: u64) -> Result<bool, MessengerError> {
        let channel_id = Self::channel(channel_id)?;
        let bot_id = self.cache.current_user().id;
        let channel: GuildChannel = self
            .cache
            .channel(channel_id)
            .map(|c| GuildChannel::clone(&c))
            .ok_or_else(|| MessengerError::NotFound(format!("cached channel {channel_id}")))?;
        let permissions = channel.permissions_for_user(&self.cache, bot_id)?;
        Ok(permissions.view_channel() && permissions.send_messages())
    }
}
