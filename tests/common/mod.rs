// Shared fixtures for the integration tests: an in-memory Discord double
// and database helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use clan_helper::db::{Database, NewLogRecord};
use clan_helper::discord::{EmbedMessage, Messenger, MessengerError};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { channel_id: u64, message_id: u64, content: String },
    Embed { channel_id: u64, message_id: u64, embed: EmbedMessage },
}

impl Sent {
    pub fn channel_id(&self) -> u64 {
        match self {
            Sent::Text { channel_id, .. } | Sent::Embed { channel_id, .. } => *channel_id,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Sent::Text { content, .. } => Some(content),
            Sent::Embed { .. } => None,
        }
    }
}

#[derive(Default)]
struct State {
    channels: HashMap<String, u64>,
    read_only: HashSet<u64>,
    sent: Vec<Sent>,
    deleted: Vec<(u64, u64)>,
    reactions_added: Vec<(u64, String)>,
    reactors: HashMap<(u64, String), HashSet<u64>>,
    failing_sends: HashSet<String>,
    send_failures_left: u32,
}

/// Records every outbound call. Message ids are handed out sequentially
/// starting at 1000.
pub struct FakeMessenger {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1000),
        }
    }

    pub fn with_channel(self, name: &str, id: u64) -> Self {
        self.state.lock().unwrap().channels.insert(name.to_string(), id);
        self
    }

    pub fn read_only(self, channel_id: u64) -> Self {
        self.state.lock().unwrap().read_only.insert(channel_id);
        self
    }

    /// Sends whose content contains `needle` always fail.
    pub fn failing_sends_containing(self, needle: &str) -> Self {
        self.state.lock().unwrap().failing_sends.insert(needle.to_string());
        self
    }

    /// The next `n` sends fail regardless of content.
    pub fn failing_next_sends(self, n: u32) -> Self {
        self.fail_next_sends(n);
        self
    }

    pub fn fail_next_sends(&self, n: u32) {
        self.state.lock().unwrap().send_failures_left = n;
    }

    /// Reactions the bot seeded on `message_id`, in order.
    pub fn reactions_on(&self, message_id: u64) -> Vec<String> {
        self.reactions_added()
            .into_iter()
            .filter(|(id, _)| *id == message_id)
            .map(|(_, emoji)| emoji)
            .collect()
    }

    pub fn set_reactors(&self, message_id: u64, emoji: &str, users: &[u64]) {
        self.state
            .lock()
            .unwrap()
            .reactors
            .insert((message_id, emoji.to_string()), users.iter().copied().collect());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.channel_id() == channel_id)
            .collect()
    }

    pub fn deleted(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn reactions_added(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().reactions_added.clone()
    }

    fn record(&self, channel_id: u64, content: &str, sent: impl FnOnce(u64) -> Sent) -> Result<u64, MessengerError> {
        let mut state = self.state.lock().unwrap();
        if state.send_failures_left > 0 {
            state.send_failures_left -= 1;
            return Err(MessengerError::NotFound(format!("channel {channel_id}")));
        }
        if state.failing_sends.iter().any(|needle| content.contains(needle.as_str())) {
            return Err(MessengerError::NotFound(format!("channel {channel_id}")));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        state.sent.push(sent(message_id));
        Ok(message_id)
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn find_channel_id(&self, name: &str) -> Result<Option<u64>, MessengerError> {
        Ok(self.state.lock().unwrap().channels.get(name).copied())
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<u64, MessengerError> {
        self.record(channel_id, content, |message_id| Sent::Text {
            channel_id,
            message_id,
            content: content.to_string(),
        })
    }

    async fn send_embed(&self, channel_id: u64, embed: EmbedMessage) -> Result<u64, MessengerError> {
        let description = embed.description.clone();
        self.record(channel_id, &description, |message_id| Sent::Embed {
            channel_id,
            message_id,
            embed,
        })
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), MessengerError> {
        self.state.lock().unwrap().deleted.push((channel_id, message_id));
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), MessengerError> {
        self.state
            .lock()
            .unwrap()
            .reactions_added
            .push((message_id, emoji.to_string()));
        Ok(())
    }

    async fn reactors(
        &self,
        _channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<HashSet<u64>, MessengerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reactors
            .get(&(message_id, emoji.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn can_send(&self, channel_id: u64) -> Result<bool, MessengerError> {
        Ok(!self.state.lock().unwrap().read_only.contains(&channel_id))
    }
}

pub async fn memory_db() -> Arc<Database> {
    Arc::new(Database::new("sqlite::memory:").await.unwrap())
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn log_line(member: &str, message: &str, timestamp: DateTime<Utc>) -> NewLogRecord {
    NewLogRecord {
        clan_name: "KlutzCo".into(),
        member_name: member.into(),
        message: message.into(),
        timestamp,
    }
}
