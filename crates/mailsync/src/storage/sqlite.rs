//! SQLite-based message store

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use rusqlite_migration::{M, Migrations};

use super::traits::{MARK_DELETED_BATCH_SIZE, MailStore};
use crate::models::{ClobberSet, EmailAddress, MessageId, MessageRecord, Recipients};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied and doubles as the schema version marker.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE messages (
                message_id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                sender TEXT NOT NULL,       -- JSON {"name", "email"}
                recipients TEXT NOT NULL,   -- JSON {"to", "cc", "bcc"}
                labels TEXT NOT NULL,       -- JSON array of label names
                subject TEXT,
                body TEXT,
                size INTEGER NOT NULL DEFAULT 0,
                timestamp INTEGER,          -- unix millis
                is_read INTEGER NOT NULL DEFAULT 0,
                is_outgoing INTEGER NOT NULL DEFAULT 0,
                last_indexed TEXT NOT NULL
            );

            CREATE INDEX idx_messages_timestamp ON messages(timestamp);
            "#,
        ),
        // Migration 2: Soft deletes
        M::up(
            r#"
            ALTER TABLE messages ADD COLUMN is_deleted INTEGER NOT NULL DEFAULT 0;

            CREATE INDEX idx_messages_is_deleted ON messages(is_deleted);
            "#,
        ),
    ])
}

/// Columns read back into a [`MessageRecord`], in select order
const SELECT_COLUMNS: &str = "message_id, thread_id, sender, recipients, labels, subject, body,
     size, timestamp, is_read, is_outgoing, is_deleted, last_indexed";

/// Build the upsert statement for a clobber set
///
/// Volatile fields are always taken from the incoming row; content fields
/// only when the caller names them.
fn upsert_sql(clobber: ClobberSet) -> String {
    let mut updates = vec![
        "is_read = excluded.is_read".to_string(),
        "labels = excluded.labels".to_string(),
        "last_indexed = excluded.last_indexed".to_string(),
        "is_deleted = 0".to_string(),
    ];
    updates.extend(
        clobber
            .iter()
            .map(|field| format!("{0} = excluded.{0}", field.name())),
    );

    format!(
        "INSERT INTO messages
         (message_id, thread_id, sender, recipients, labels, subject, body,
          size, timestamp, is_read, is_outgoing, is_deleted, last_indexed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12)
         ON CONFLICT(message_id) DO UPDATE SET
            {}",
        updates.join(",\n            ")
    )
}

/// A messages row before JSON columns are decoded
struct MessageRow {
    id: String,
    thread_id: String,
    sender: String,
    recipients: String,
    labels: String,
    subject: Option<String>,
    body: Option<String>,
    size: i64,
    timestamp: Option<i64>,
    is_read: bool,
    is_outgoing: bool,
    is_deleted: bool,
    last_indexed: String,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            sender: row.get(2)?,
            recipients: row.get(3)?,
            labels: row.get(4)?,
            subject: row.get(5)?,
            body: row.get(6)?,
            size: row.get(7)?,
            timestamp: row.get(8)?,
            is_read: row.get(9)?,
            is_outgoing: row.get(10)?,
            is_deleted: row.get(11)?,
            last_indexed: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<MessageRecord> {
        let sender: EmailAddress = serde_json::from_str(&self.sender)
            .with_context(|| format!("Invalid sender JSON for message {}", self.id))?;
        let recipients: Recipients = serde_json::from_str(&self.recipients)
            .with_context(|| format!("Invalid recipients JSON for message {}", self.id))?;
        let labels: BTreeSet<String> = serde_json::from_str(&self.labels)
            .with_context(|| format!("Invalid labels JSON for message {}", self.id))?;
        let last_indexed = DateTime::parse_from_rfc3339(&self.last_indexed)
            .map(|dt| dt.with_timezone(&Utc))
            .ok();

        Ok(MessageRecord {
            id: MessageId::new(self.id),
            thread_id: self.thread_id,
            sender,
            recipients,
            labels,
            subject: self.subject,
            body: self.body,
            size: u64::try_from(self.size).unwrap_or(0),
            timestamp: self.timestamp.and_then(DateTime::from_timestamp_millis),
            is_read: self.is_read,
            is_outgoing: self.is_outgoing,
            is_deleted: self.is_deleted,
            last_indexed,
        })
    }
}

/// SQLite-based message store
///
/// A single connection sits behind a mutex that is held for one statement or
/// transaction at a time; conflict resolution is left to SQLite's
/// `ON CONFLICT` clause.
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the store at `db_path` and bring its schema up to date
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets watermark reads proceed while workers write; NORMAL is
        // durable enough with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        conn.busy_timeout(Duration::from_secs(30))?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Current schema version (the user_version pragma)
    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.lock()?;
        let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    fn write_record(
        conn: &Connection,
        sql: &str,
        record: &MessageRecord,
        last_indexed: &str,
    ) -> Result<()> {
        let labels: Vec<&String> = record.labels.iter().collect();
        let mut stmt = conn.prepare_cached(sql)?;
        stmt.execute(params![
            record.id.as_str(),
            record.thread_id,
            serde_json::to_string(&record.sender)?,
            serde_json::to_string(&record.recipients)?,
            serde_json::to_string(&labels)?,
            record.subject,
            record.body,
            i64::try_from(record.size).unwrap_or(i64::MAX),
            record.timestamp.map(|ts| ts.timestamp_millis()),
            record.is_read,
            record.is_outgoing,
            last_indexed,
        ])
        .with_context(|| format!("Failed to upsert message {}", record.id))?;
        Ok(())
    }

    fn query_ids(&self, sql: &str) -> Result<HashSet<MessageId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|id| id.map(MessageId::new))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn query_watermark(&self, sql: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let millis: Option<i64> = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}

impl MailStore for SqliteMailStore {
    fn upsert(&self, record: &MessageRecord, clobber: ClobberSet) -> Result<()> {
        let sql = upsert_sql(clobber);
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        Self::write_record(&conn, &sql, record, &now)
    }

    fn upsert_batch(&self, records: &[MessageRecord], clobber: ClobberSet) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let sql = upsert_sql(clobber);
        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            Self::write_record(&tx, &sql, record, &now)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn active_ids(&self) -> Result<HashSet<MessageId>> {
        self.query_ids("SELECT message_id FROM messages WHERE is_deleted = 0")
    }

    fn all_ids(&self) -> Result<HashSet<MessageId>> {
        self.query_ids("SELECT message_id FROM messages")
    }

    fn deleted_ids(&self) -> Result<HashSet<MessageId>> {
        self.query_ids("SELECT message_id FROM messages WHERE is_deleted = 1")
    }

    fn mark_deleted(&self, ids: &[MessageId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut changed = 0;

        // Bounded batches keep each statement under SQLite's bound-parameter limit
        for chunk in ids.chunks(MARK_DELETED_BATCH_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE messages SET is_deleted = 1, last_indexed = ?
                 WHERE is_deleted = 0 AND message_id IN ({})",
                placeholders
            );
            let values = std::iter::once(now.as_str()).chain(chunk.iter().map(MessageId::as_str));
            changed += tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;
        Ok(changed)
    }

    fn first_indexed_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        self.query_watermark("SELECT MIN(timestamp) FROM messages WHERE timestamp IS NOT NULL")
    }

    fn last_indexed_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        self.query_watermark("SELECT MAX(timestamp) FROM messages WHERE timestamp IS NOT NULL")
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<MessageRecord>> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {} FROM messages WHERE message_id = ?", SELECT_COLUMNS),
                [id.as_str()],
                MessageRow::from_row,
            )
            .optional()?
        };

        row.map(MessageRow::into_record).transpose()
    }

    fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
