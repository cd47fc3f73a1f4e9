//! Storage trait definitions

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{ClobberSet, MessageId, MessageRecord};

/// Maximum number of IDs bound into one soft-delete statement
pub const MARK_DELETED_BATCH_SIZE: usize = 100;

/// Trait for the mirrored message store
///
/// Implementations must tolerate concurrent upserts to distinct IDs from
/// several worker threads.
///
/// # Conflict policy
///
/// Upserts are keyed on the message ID. When a row already exists:
/// - `is_read`, `labels` are taken from the incoming record, `last_indexed`
///   is set to the write time and `is_deleted` is reset to false;
/// - content fields keep their stored value unless named in `clobber`.
pub trait MailStore: Send + Sync {
    /// Insert or update a message
    fn upsert(&self, record: &MessageRecord, clobber: ClobberSet) -> Result<()>;

    /// Insert or update many messages in one write, same semantics as [`MailStore::upsert`]
    fn upsert_batch(&self, records: &[MessageRecord], clobber: ClobberSet) -> Result<()>;

    /// IDs of all messages not marked deleted
    fn active_ids(&self) -> Result<HashSet<MessageId>>;

    /// IDs of every stored message
    fn all_ids(&self) -> Result<HashSet<MessageId>>;

    /// IDs of messages marked deleted
    fn deleted_ids(&self) -> Result<HashSet<MessageId>>;

    /// Set the soft-delete flag on the given messages, returning how many rows changed
    fn mark_deleted(&self, ids: &[MessageId]) -> Result<usize>;

    /// Earliest non-null message timestamp
    fn first_indexed_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Latest non-null message timestamp
    fn last_indexed_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Get a message by ID
    fn get_message(&self, id: &MessageId) -> Result<Option<MessageRecord>>;

    /// Count stored messages, deleted ones included
    fn count(&self) -> Result<usize>;
}
