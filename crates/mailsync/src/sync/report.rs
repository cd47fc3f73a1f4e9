//! Per-run outcome summary

use std::fmt;

use super::SyncMode;
use super::fetcher::{FetchOutcome, FetchStatus};
use crate::models::MessageId;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every candidate reached a terminal state
    Clean,
    /// Cancellation cut listing or fetching short
    Cancelled,
}

/// Statistics from one sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub mode: SyncMode,
    /// Distinct IDs selected for fetching
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Messages newly soft-deleted by this run
    pub deletions_marked: usize,
    pub failed_ids: Vec<MessageId>,
    pub completion: Completion,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            candidates: 0,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            deletions_marked: 0,
            failed_ids: Vec::new(),
            completion: Completion::Clean,
            duration_ms: 0,
        }
    }

    /// IDs that reached a provider call or a terminal failure
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// IDs with any outcome so far
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub(crate) fn record(&mut self, outcome: &FetchOutcome) {
        match &outcome.status {
            FetchStatus::Succeeded => self.succeeded += 1,
            FetchStatus::Failed(_) => {
                self.failed += 1;
                self.failed_ids.push(outcome.id.clone());
            }
            FetchStatus::Cancelled => self.cancelled += 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sync: {} candidates, {} succeeded, {} failed, {} cancelled, \
             {} marked deleted in {}ms",
            self.mode,
            self.candidates,
            self.succeeded,
            self.failed,
            self.cancelled,
            self.deletions_marked,
            self.duration_ms
        )
    }
}
