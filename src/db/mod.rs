// Database access layer (SQLite via sqlx): the clan-log outbox and the
// references to the last message posted per (kind, channel).

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Channel recorded for log lines that predate per-record routing.
pub const DEFAULT_CHANNEL_NAME: &str = "testing-ground";

/// Kind of bot-authored message whose id is remembered per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Daily,
    Weekly,
    BossSummary,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Daily => "daily",
            MessageKind::Weekly => "weekly",
            MessageKind::BossSummary => "bosssummary",
        }
    }
}

/// A clan log line as parsed from the upstream API, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogRecord {
    pub clan_name: String,
    pub member_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A stored clan log line waiting in (or already relayed from) the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: i64,
    pub clan_name: String,
    pub member_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub sent: bool,
    pub channel_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct LogRecordRow {
    id: i64,
    clan_name: String,
    member_username: String,
    message: String,
    timestamp: String,
    message_sent: i64,
    channel_name: String,
}

impl From<LogRecordRow> for LogRecord {
    fn from(row: LogRecordRow) -> Self {
        LogRecord {
            id: row.id,
            clan_name: row.clan_name,
            member_name: row.member_username,
            message: row.message,
            timestamp: parse_stored_timestamp(&row.timestamp),
            sent: row.message_sent != 0,
            channel_name: row.channel_name,
        }
    }
}

/// Whether an insert created a row or hit the natural-key unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Timestamps are written as second-precision RFC3339 so the unique index
/// compares identical text for identical instants.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_stored_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return ts.and_utc();
    }
    tracing::warn!(raw, "Unparsable stored timestamp, using the epoch");
    DateTime::<Utc>::default()
}

const CREATE_CLAN_MESSAGES: &str = r#"
    CREATE TABLE IF NOT EXISTS clan_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        clan_name TEXT NOT NULL,
        member_username TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp DATETIME NOT NULL,
        message_sent INTEGER NOT NULL DEFAULT 0,
        channel_name TEXT NOT NULL DEFAULT 'testing-ground'
    )
"#;

const CREATE_CLAN_MESSAGES_UNIQUE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_clan_messages_unique ON clan_messages (clan_name, member_username, message, timestamp)";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect using a sqlx connection string such as `sqlite::memory:`.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        Self::connect(options).await
    }

    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        // A single connection: sqlite allows one writer and every task shares it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        self.migrate_clan_messages().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_messages (
                type TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (type, channel_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create `clan_messages`, or bring a table written by an older release
    /// up to the current layout.
    async fn migrate_clan_messages(&self) -> Result<(), sqlx::Error> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('clan_messages')")
                .fetch_all(&self.pool)
                .await?;

        if columns.is_empty() {
            sqlx::query(CREATE_CLAN_MESSAGES).execute(&self.pool).await?;
            sqlx::query(CREATE_CLAN_MESSAGES_UNIQUE_INDEX)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let has = |name: &str| columns.iter().any(|c| c == name);

        if has("id") {
            if !has("channel_name") {
                tracing::info!("Adding channel_name column to clan_messages");
                sqlx::query(
                    "ALTER TABLE clan_messages ADD COLUMN channel_name TEXT NOT NULL DEFAULT 'testing-ground'",
                )
                .execute(&self.pool)
                .await?;
            }
            sqlx::query(CREATE_CLAN_MESSAGES_UNIQUE_INDEX)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        // Legacy table without a rowid key: rebuild it and copy the rows over.
        tracing::info!("Rebuilding legacy clan_messages table");
        let sent_expr = if has("message_sent") {
            "COALESCE(message_sent, 0)"
        } else {
            "0"
        };
        let channel_expr = if has("channel_name") {
            "COALESCE(channel_name, 'testing-ground')"
        } else {
            "'testing-ground'"
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(&CREATE_CLAN_MESSAGES.replace(
            "IF NOT EXISTS clan_messages",
            "clan_messages_new",
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX idx_clan_messages_new_unique ON clan_messages_new (clan_name, member_username, message, timestamp)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO clan_messages_new (clan_name, member_username, message, timestamp, message_sent, channel_name) \
             SELECT clan_name, member_username, message, timestamp, {sent_expr}, {channel_expr} FROM clan_messages"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query("DROP TABLE clan_messages")
            .execute(&mut *tx)
            .await?;
        sqlx::query("ALTER TABLE clan_messages_new RENAME TO clan_messages")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DROP INDEX idx_clan_messages_new_unique")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_CLAN_MESSAGES_UNIQUE_INDEX)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    // ── Clan log outbox ───────────────────────────────────────────────

    pub async fn insert_log_record(
        &self,
        record: &NewLogRecord,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO clan_messages (clan_name, member_username, message, timestamp, channel_name) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.clan_name)
        .bind(&record.member_name)
        .bind(&record.message)
        .bind(format_timestamp(&record.timestamp))
        .bind(DEFAULT_CHANNEL_NAME)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Up to `limit` unsent records, oldest first.
    pub async fn get_unsent_records(&self, limit: i64) -> Result<Vec<LogRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, LogRecordRow>(
            "SELECT id, clan_name, member_username, message, timestamp, message_sent, COALESCE(channel_name, 'testing-ground') AS channel_name \
             FROM clan_messages WHERE message_sent = 0 ORDER BY timestamp ASC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LogRecord::from).collect())
    }

    #[cfg(test)]
    pub async fn get_log_record(&self, id: i64) -> Result<Option<LogRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, LogRecordRow>(
            "SELECT id, clan_name, member_username, message, timestamp, message_sent, channel_name FROM clan_messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(LogRecord::from))
    }

    /// Flip the sent flag for every id in one statement.
    pub async fn mark_sent(&self, ids: &[i64]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("UPDATE clan_messages SET message_sent = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // ── Scheduled message references ──────────────────────────────────

    pub async fn get_last_message_ref(
        &self,
        kind: MessageKind,
        channel_id: u64,
    ) -> Result<Option<u64>, sqlx::Error> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT message_id FROM scheduled_messages WHERE type = ? AND channel_id = ?",
        )
        .bind(kind.as_str())
        .bind(channel_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(raw.and_then(|id| match id.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(kind = kind.as_str(), channel_id, raw = %id, "Ignoring malformed message id");
                None
            }
        }))
    }

    /// Remember `message_id` as the latest post of `kind` in the channel,
    /// replacing whatever was stored before.
    pub async fn set_last_message_ref(
        &self,
        kind: MessageKind,
        channel_id: u64,
        message_id: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO scheduled_messages (type, channel_id, message_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(channel_id.to_string())
        .bind(message_id.to_string())
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_last_message_ref(
        &self,
        kind: MessageKind,
        channel_id: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM scheduled_messages WHERE type = ? AND channel_id = ?")
            .bind(kind.as_str())
            .bind(channel_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
