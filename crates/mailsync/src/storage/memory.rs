//! In-memory storage implementation
//!
//! Applies the same conflict policy as the SQLite store. Used by engine tests
//! that don't need a database file.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use super::traits::MailStore;
use crate::models::{ClobberSet, ContentField, MessageId, MessageRecord};

/// In-memory implementation of MailStore
///
/// Uses a HashMap protected by an RwLock for thread-safe access.
#[derive(Default)]
pub struct InMemoryMailStore {
    messages: RwLock<HashMap<MessageId, MessageRecord>>,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<MessageId, MessageRecord>>> {
        self.messages
            .read()
            .map_err(|_| anyhow!("message map lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<MessageId, MessageRecord>>> {
        self.messages
            .write()
            .map_err(|_| anyhow!("message map lock poisoned"))
    }

    fn merge(
        messages: &mut HashMap<MessageId, MessageRecord>,
        record: &MessageRecord,
        clobber: ClobberSet,
        now: DateTime<Utc>,
    ) {
        let Some(existing) = messages.get_mut(&record.id) else {
            let mut fresh = record.clone();
            fresh.is_deleted = false;
            fresh.last_indexed = Some(now);
            messages.insert(fresh.id.clone(), fresh);
            return;
        };

        existing.is_read = record.is_read;
        existing.labels = record.labels.clone();
        existing.last_indexed = Some(now);
        existing.is_deleted = false;

        for field in clobber.iter() {
            match field {
                ContentField::ThreadId => existing.thread_id = record.thread_id.clone(),
                ContentField::Sender => existing.sender = record.sender.clone(),
                ContentField::Recipients => existing.recipients = record.recipients.clone(),
                ContentField::Subject => existing.subject = record.subject.clone(),
                ContentField::Body => existing.body = record.body.clone(),
                ContentField::Size => existing.size = record.size,
                ContentField::Timestamp => existing.timestamp = record.timestamp,
                ContentField::IsOutgoing => existing.is_outgoing = record.is_outgoing,
            }
        }
    }

    fn ids_where(&self, keep: impl Fn(&MessageRecord) -> bool) -> Result<HashSet<MessageId>> {
        Ok(self
            .read()?
            .values()
            .filter(|record| keep(record))
            .map(|record| record.id.clone())
            .collect())
    }
}

impl MailStore for InMemoryMailStore {
    fn upsert(&self, record: &MessageRecord, clobber: ClobberSet) -> Result<()> {
        let mut messages = self.write()?;
        Self::merge(&mut messages, record, clobber, Utc::now());
        Ok(())
    }

    fn upsert_batch(&self, records: &[MessageRecord], clobber: ClobberSet) -> Result<()> {
        let now = Utc::now();
        let mut messages = self.write()?;
        for record in records {
            Self::merge(&mut messages, record, clobber, now);
        }
        Ok(())
    }

    fn active_ids(&self) -> Result<HashSet<MessageId>> {
        self.ids_where(|record| !record.is_deleted)
    }

    fn all_ids(&self) -> Result<HashSet<MessageId>> {
        self.ids_where(|_| true)
    }

    fn deleted_ids(&self) -> Result<HashSet<MessageId>> {
        self.ids_where(|record| record.is_deleted)
    }

    fn mark_deleted(&self, ids: &[MessageId]) -> Result<usize> {
        let now = Utc::now();
        let mut messages = self.write()?;
        let mut changed = 0;
        for id in ids {
            if let Some(record) = messages.get_mut(id)
                && !record.is_deleted
            {
                record.is_deleted = true;
                record.last_indexed = Some(now);
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn first_indexed_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read()?.values().filter_map(|r| r.timestamp).min())
    }

    fn last_indexed_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read()?.values().filter_map(|r| r.timestamp).max())
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<MessageRecord>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}
