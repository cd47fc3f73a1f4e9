//! Sync engine for mirroring a remote mailbox into the store
//!
//! Every operation is idempotent: an interrupted run can simply be repeated.

mod deletions;
mod engine;
mod fetcher;
mod report;

use std::fmt;
use std::time::Duration;

use crate::config::SyncSettings;
use crate::models::{ClobberSet, MessageId};

pub use deletions::DeletionDetector;
pub use engine::{Listing, SyncEngine, SyncError, query_windows};
pub use fetcher::{
    FetchError, FetchOutcome, FetchStatus, Fetcher, RetryPolicy, Sleeper, ThreadSleeper,
};
pub use report::{Completion, RunReport};

/// What a run does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Fetch messages newer than the newest and older than the oldest stored
    Incremental,
    /// List everything, reconcile deletions, fetch everything
    Full,
    /// List everything and reconcile deletions without fetching content
    Deletions,
    /// Fetch one message by ID
    Single(MessageId),
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => f.write_str("incremental"),
            SyncMode::Full => f.write_str("full"),
            SyncMode::Deletions => f.write_str("deletions"),
            SyncMode::Single(id) => write!(f, "single message {}", id),
        }
    }
}

/// Options for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Number of concurrent fetch workers (at least 1)
    pub workers: usize,
    pub page_size: usize,
    pub retry: RetryPolicy,
    /// Content fields to overwrite when a message is already stored
    pub clobber: ClobberSet,
    pub progress_interval: usize,
    pub collection_log_interval: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for SyncOptions {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
            page_size: settings.page_size.max(1),
            retry: RetryPolicy {
                max_attempts: settings.max_attempts.max(1),
                delay: settings.retry_delay(),
            },
            clobber: ClobberSet::empty(),
            progress_interval: settings.progress_interval.max(1),
            collection_log_interval: settings.collection_log_interval.max(1),
        }
    }
}

impl SyncOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_clobber(mut self, clobber: ClobberSet) -> Self {
        self.clobber = clobber;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.retry = RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        };
        self
    }
}
