//! Sync orchestration: query windows, pagination, dispatch and reporting

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use log::{info, warn};

use super::deletions::DeletionDetector;
use super::fetcher::{Fetcher, Sleeper, ThreadSleeper};
use super::report::{Completion, RunReport};
use super::{SyncMode, SyncOptions};
use crate::cancel::CancellationToken;
use crate::decode::MessageDecoder;
use crate::models::{LabelMap, MessageId};
use crate::provider::{MailProvider, ProviderConnector, ProviderError, Query};
use crate::storage::MailStore;

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to open provider session: {0}")]
    Session(#[source] ProviderError),
    #[error("failed to list labels: {0}")]
    Labels(#[source] ProviderError),
    #[error("failed to list messages for query '{query}': {source}")]
    Listing {
        query: String,
        #[source]
        source: ProviderError,
    },
    #[error("store operation failed: {0:#}")]
    Store(#[from] anyhow::Error),
    #[error("failed to start fetch workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// IDs collected from one or more query windows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Deduplicated, in first-seen order
    pub ids: Vec<MessageId>,
    /// False when cancellation stopped pagination early
    pub complete: bool,
}

impl Listing {
    pub fn id_set(&self) -> HashSet<MessageId> {
        self.ids.iter().cloned().collect()
    }
}

/// Query windows for a listing run
///
/// Full runs use one unbounded window. Incremental runs look after the newest
/// and before the oldest stored timestamp, or fall back to one unbounded
/// window when nothing with a timestamp is stored yet.
pub fn query_windows(
    provider: &dyn MailProvider,
    store: &dyn MailStore,
    mode: &SyncMode,
) -> anyhow::Result<Vec<Query>> {
    if *mode != SyncMode::Incremental {
        return Ok(vec![provider.build_query(None, None)]);
    }

    let last = store.last_indexed_timestamp()?;
    let first = store.first_indexed_timestamp()?;

    let mut windows = Vec::new();
    if let Some(last) = last {
        windows.push(provider.build_query(Some(last), None));
    }
    if let Some(first) = first {
        windows.push(provider.build_query(None, Some(first)));
    }
    if windows.is_empty() {
        windows.push(provider.build_query(None, None));
    }
    Ok(windows)
}

/// Drives one sync run against a provider and store
pub struct SyncEngine<'a> {
    connector: &'a dyn ProviderConnector,
    store: &'a dyn MailStore,
    decoder: &'a dyn MessageDecoder,
    sleeper: &'a dyn Sleeper,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        connector: &'a dyn ProviderConnector,
        store: &'a dyn MailStore,
        decoder: &'a dyn MessageDecoder,
        options: SyncOptions,
    ) -> Self {
        Self {
            connector,
            store,
            decoder,
            sleeper: &THREAD_SLEEPER,
            options,
        }
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run one sync
    ///
    /// Per-message failures are reported, not returned. Only session,
    /// listing and store failures abort the run. Cancellation yields a
    /// partial report with [`Completion::Cancelled`].
    pub fn run(&self, mode: SyncMode, token: &CancellationToken) -> Result<RunReport, SyncError> {
        let start = Instant::now();
        let mut report = RunReport::new(mode.clone());
        info!(
            "Starting {} sync via {} with {} workers",
            mode,
            self.connector.name(),
            self.options.workers
        );

        let mut session = self.connector.connect().map_err(SyncError::Session)?;

        let listing_complete = match &mode {
            SyncMode::Single(id) => {
                let labels = session.list_labels().map_err(SyncError::Labels)?;
                drop(session);
                report.candidates = 1;
                self.dispatch(vec![id.clone()], &labels, token, &mut report)?;
                true
            }
            SyncMode::Deletions => {
                let windows = query_windows(session.as_ref(), self.store, &mode)?;
                let listing = self.collect_ids(session.as_mut(), &windows, token)?;
                drop(session);
                report.deletions_marked = self.reconcile(&listing)?;
                listing.complete
            }
            SyncMode::Full | SyncMode::Incremental => {
                let labels = session.list_labels().map_err(SyncError::Labels)?;
                info!("Loaded {} labels", labels.len());

                let windows = query_windows(session.as_ref(), self.store, &mode)?;
                let listing = self.collect_ids(session.as_mut(), &windows, token)?;
                drop(session);

                if mode == SyncMode::Full {
                    report.deletions_marked = self.reconcile(&listing)?;
                }

                report.candidates = listing.ids.len();
                self.dispatch(listing.ids, &labels, token, &mut report)?;
                listing.complete
            }
        };

        report.completion = if listing_complete && report.cancelled == 0 {
            Completion::Clean
        } else {
            Completion::Cancelled
        };
        report.duration_ms = start.elapsed().as_millis() as u64;

        match report.completion {
            Completion::Clean => info!("Sync complete: {}", report),
            Completion::Cancelled => warn!("Sync cancelled before completion: {}", report),
        }
        Ok(report)
    }

    /// Page through every window, unioning IDs in first-seen order
    ///
    /// Cancellation discards the remaining pages but keeps what was collected.
    pub fn collect_ids(
        &self,
        provider: &mut dyn MailProvider,
        windows: &[Query],
        token: &CancellationToken,
    ) -> Result<Listing, SyncError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let interval = self.options.collection_log_interval.max(1);

        for query in windows {
            info!("Listing messages for query '{}'", query);
            let mut page_token: Option<String> = None;

            loop {
                if token.is_cancelled() {
                    info!(
                        "Listing cancelled, continuing with {} collected message IDs",
                        ids.len()
                    );
                    return Ok(Listing {
                        ids,
                        complete: false,
                    });
                }

                let page = provider
                    .list_messages(query, page_token.as_deref(), self.options.page_size)
                    .map_err(|source| SyncError::Listing {
                        query: query.to_string(),
                        source,
                    })?;

                for id in page.ids {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                        if ids.len() % interval == 0 {
                            info!("Collected {} message IDs", ids.len());
                        }
                    }
                }

                match page.next_page_token {
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }
        }

        info!("Collected {} message IDs in total", ids.len());
        Ok(Listing {
            ids,
            complete: true,
        })
    }

    /// Run deletion detection over a listing, if it is a full snapshot
    fn reconcile(&self, listing: &Listing) -> Result<usize, SyncError> {
        if !listing.complete {
            warn!("Listing was cut short by cancellation, skipping deletion detection");
            return Ok(0);
        }
        Ok(DeletionDetector::new(self.store).detect(&listing.id_set())?)
    }

    fn dispatch(
        &self,
        ids: Vec<MessageId>,
        labels: &LabelMap,
        token: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<(), SyncError> {
        if ids.is_empty() {
            info!("No messages to fetch");
            return Ok(());
        }

        let total = ids.len();
        let interval = self.options.progress_interval.max(1);
        info!("Fetching {} messages", total);

        let fetcher = Fetcher::new(self.connector, self.store, self.decoder, self.sleeper)
            .workers(self.options.workers)
            .retry(self.options.retry)
            .clobber(self.options.clobber);

        let tally = Mutex::new(report);
        fetcher.fetch(ids, labels, token, &|outcome| {
            let mut tally = tally.lock().unwrap_or_else(PoisonError::into_inner);
            tally.record(&outcome);
            let done = tally.completed();
            if done % interval == 0 || done == total {
                info!(
                    "Progress: {}/{} messages ({} succeeded, {} failed)",
                    done, total, tally.succeeded, tally.failed
                );
            }
        })?;
        Ok(())
    }
}
