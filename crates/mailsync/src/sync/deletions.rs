//! Reconciliation of stored messages against a full remote ID snapshot

use std::collections::HashSet;

use anyhow::Result;
use log::info;

use crate::models::MessageId;
use crate::storage::MailStore;

/// Soft-deletes stored messages that no longer exist remotely
pub struct DeletionDetector<'a> {
    store: &'a dyn MailStore,
}

impl<'a> DeletionDetector<'a> {
    pub fn new(store: &'a dyn MailStore) -> Self {
        Self { store }
    }

    /// Mark every active stored message missing from `remote_ids` as deleted
    ///
    /// `remote_ids` must be a complete listing; a partial one would delete
    /// live messages. Returns the number of messages newly marked.
    pub fn detect(&self, remote_ids: &HashSet<MessageId>) -> Result<usize> {
        let active = self.store.active_ids()?;
        if active.is_empty() {
            info!("No active messages stored, skipping deletion detection");
            return Ok(0);
        }

        let mut newly_deleted: Vec<MessageId> =
            active.difference(remote_ids).cloned().collect();
        if newly_deleted.is_empty() {
            info!("No deleted messages detected");
            return Ok(0);
        }
        newly_deleted.sort();

        let marked = self.store.mark_deleted(&newly_deleted)?;
        info!(
            "Marked {} of {} stored messages as deleted",
            marked,
            active.len()
        );

        let reappeared = self
            .store
            .deleted_ids()?
            .intersection(remote_ids)
            .count();
        if reappeared > 0 {
            info!(
                "{} previously deleted messages exist remotely again \
                 and will be restored when next fetched",
                reappeared
            );
        }

        Ok(marked)
    }
}
