// ABOUTME: SQLite persistence for the ttirc master - connections, messages, system keys
// ABOUTME: Reads desired connections and writes status, liveness, and disconnect events

use crate::error::{Result, StoreError};
use crate::ConnectionStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;
use ttirc_master_core::{
    ConnectionId, ConnectionSpec, ConnectionStatus, MessageType, MASTER_HEARTBEAT_KEY,
    MASTER_RUNNING_KEY, SYSTEM_CHANNEL, UNKNOWN_NICK,
};

/// Master store backed by the SQLite database shared with the web front-end
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    freshness_window: TimeDelta,
}

impl SqliteStore {
    /// Open or create the store at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(open_err)?;

        let store = Self {
            pool,
            freshness_window: TimeDelta::minutes(5),
        };
        store.init_schema().await.map_err(open_err)?;
        tracing::debug!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Override how recent a client heartbeat must be for non-permanent connections
    pub fn with_freshness_window(mut self, window: TimeDelta) -> Self {
        self.freshness_window = window;
        self
    }

    /// Initialize database schema
    async fn init_schema(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ttirc_users (
                id INTEGER PRIMARY KEY,
                login TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS ttirc_connections (
                id INTEGER PRIMARY KEY,
                owner_uid INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                visible INTEGER NOT NULL DEFAULT 1,
                permanent INTEGER NOT NULL DEFAULT 0,
                heartbeat TEXT,
                status INTEGER NOT NULL DEFAULT 0,
                active_nick TEXT,
                userhosts TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS ttirc_channels (
                connection_id INTEGER NOT NULL,
                channel TEXT NOT NULL,
                nicklist TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (connection_id, channel)
            );

            CREATE TABLE IF NOT EXISTS ttirc_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                incoming INTEGER NOT NULL,
                connection_id INTEGER NOT NULL,
                channel TEXT NOT NULL,
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                message_type INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_messages_connection ON ttirc_messages(connection_id, id);

            CREATE TABLE IF NOT EXISTS ttirc_system (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            INSERT OR IGNORE INTO ttirc_system (key, value) VALUES ('MASTER_RUNNING', 'false');
            INSERT OR IGNORE INTO ttirc_system (key, value) VALUES ('MASTER_HEARTBEAT', '');
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read a value from the system table
    pub async fn system_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM ttirc_system WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::unavailable("system_value"))?;
        Ok(row.map(|row| row.get("value")))
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn set_system_value(
        &self,
        key: &str,
        value: &str,
        operation: &'static str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ttirc_system (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(StoreError::unavailable(operation))?;
        Ok(())
    }
}

/// Naive layouts written by SQLite (`CURRENT_TIMESTAMP`, `datetime('now','subsec')`)
/// and by clients storing ISO 8601 without an offset. All are taken as UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a stored timestamp: RFC 3339, or one of the naive UTC layouts.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(raw, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

/// Heartbeat column value for a connection; an unreadable value counts as missing.
fn heartbeat_of(id: ConnectionId, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() && !raw.is_empty() {
        tracing::warn!(
            connection_id = %id,
            raw,
            "Unparseable connection heartbeat, treating as stale"
        );
    }
    parsed
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn list_eligible_connections(&self) -> Result<Vec<ConnectionSpec>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.enabled, c.visible, c.permanent, c.heartbeat,
                   u.id IS NOT NULL AS owner_valid
            FROM ttirc_connections c
            LEFT JOIN ttirc_users u ON u.id = c.owner_uid
            WHERE c.enabled = 1
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::unavailable("list_eligible_connections"))?;

        let now = Utc::now();
        let mut specs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = ConnectionId(row.get("id"));
            let heartbeat: Option<String> = row.get("heartbeat");
            let spec = ConnectionSpec {
                id,
                enabled: row.get::<i64, _>("enabled") != 0,
                visible: row.get::<i64, _>("visible") != 0,
                permanent: row.get::<i64, _>("permanent") != 0,
                owner_valid: row.get::<i64, _>("owner_valid") != 0,
                last_heartbeat: heartbeat_of(id, heartbeat.as_deref()),
            };
            if spec.is_eligible(now, self.freshness_window) {
                specs.push(spec);
            }
        }
        Ok(specs)
    }

    async fn active_nick(&self, id: ConnectionId) -> Result<String> {
        let row = sqlx::query("SELECT active_nick FROM ttirc_connections WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::unavailable("active_nick"))?;

        Ok(row
            .and_then(|row| row.get::<Option<String>, _>("active_nick"))
            .unwrap_or_else(|| UNKNOWN_NICK.to_string()))
    }

    async fn append_message(
        &self,
        id: ConnectionId,
        channel: &str,
        text: &str,
        incoming: bool,
        message_type: MessageType,
        sender_nick: &str,
    ) -> Result<()> {
        let sender = if !sender_nick.is_empty() {
            sender_nick.to_string()
        } else if channel == SYSTEM_CHANNEL {
            SYSTEM_CHANNEL.to_string()
        } else {
            self.active_nick(id).await?
        };

        sqlx::query(
            r#"
            INSERT INTO ttirc_messages (ts, incoming, connection_id, channel, sender, message, message_type)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(incoming)
        .bind(id.get())
        .bind(channel)
        .bind(&sender)
        .bind(text)
        .bind(message_type.code())
        .execute(&self.pool)
        .await
        .map_err(StoreError::unavailable("append_message"))?;
        Ok(())
    }

    async fn mark_disconnected(&self, id: ConnectionId) -> Result<()> {
        sqlx::query("UPDATE ttirc_connections SET status = ?, userhosts = '' WHERE id = ?")
            .bind(ConnectionStatus::Disconnected.code())
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(StoreError::unavailable("mark_disconnected"))?;
        Ok(())
    }

    async fn clear_channel_member_lists(&self, id: ConnectionId) -> Result<()> {
        sqlx::query("UPDATE ttirc_channels SET nicklist = '' WHERE connection_id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(StoreError::unavailable("clear_channel_member_lists"))?;
        Ok(())
    }

    async fn set_supervisor_alive(&self, alive: bool) -> Result<()> {
        let value = if alive { "true" } else { "false" };
        self.set_system_value(MASTER_RUNNING_KEY, value, "set_supervisor_alive")
            .await
    }

    async fn set_heartbeat_now(&self) -> Result<()> {
        self.set_system_value(
            MASTER_HEARTBEAT_KEY,
            &Utc::now().to_rfc3339(),
            "set_heartbeat_now",
        )
        .await
    }

    async fn reset_all(&self) -> Result<()> {
        let op = StoreError::unavailable;
        let mut tx = self.pool.begin().await.map_err(op("reset_all"))?;

        sqlx::query("UPDATE ttirc_connections SET status = ?, userhosts = ''")
            .bind(ConnectionStatus::Disconnected.code())
            .execute(&mut *tx)
            .await
            .map_err(op("reset_all"))?;
        sqlx::query("UPDATE ttirc_channels SET nicklist = ''")
            .execute(&mut *tx)
            .await
            .map_err(op("reset_all"))?;
        sqlx::query("UPDATE ttirc_system SET value = 'false' WHERE key = ?")
            .bind(MASTER_RUNNING_KEY)
            .execute(&mut *tx)
            .await
            .map_err(op("reset_all"))?;

        tx.commit().await.map_err(op("reset_all"))?;
        Ok(())
    }
}
