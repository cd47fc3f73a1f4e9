//! Concurrent message fetcher
//!
//! A rayon pool of N workers pulls IDs from a shared queue. Each worker owns
//! its own provider session, so no lock is held across a network call.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, warn};

use crate::cancel::CancellationToken;
use crate::decode::{DecodeError, MessageDecoder};
use crate::models::{ClobberSet, LabelMap, MessageId};
use crate::provider::{MailProvider, ProviderConnector, ProviderError};
use crate::storage::MailStore;

/// Per-message failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetching message {id} failed: {source}")]
    Provider {
        id: MessageId,
        #[source]
        source: ProviderError,
    },
    #[error("decoding message {id} failed: {source}")]
    Decode {
        id: MessageId,
        #[source]
        source: DecodeError,
    },
    #[error("storing message {id} failed: {message}")]
    Store { id: MessageId, message: String },
    #[error("no provider session for message {id}: {source}")]
    Session {
        id: MessageId,
        #[source]
        source: ProviderError,
    },
}

impl FetchError {
    pub fn id(&self) -> &MessageId {
        match self {
            FetchError::Provider { id, .. }
            | FetchError::Decode { id, .. }
            | FetchError::Store { id, .. }
            | FetchError::Session { id, .. } => id,
        }
    }
}

/// Terminal state of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Succeeded,
    Failed(FetchError),
    Cancelled,
}

/// Exactly one per dispatched ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub id: MessageId,
    pub status: FetchStatus,
    /// Provider calls made for this ID
    pub attempts: u32,
}

/// Blocking delay between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-delay retry for transient errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per message, first try included
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Fetches, decodes and stores messages with bounded parallelism
pub struct Fetcher<'a> {
    connector: &'a dyn ProviderConnector,
    store: &'a dyn MailStore,
    decoder: &'a dyn MessageDecoder,
    sleeper: &'a dyn Sleeper,
    retry: RetryPolicy,
    clobber: ClobberSet,
    workers: usize,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        connector: &'a dyn ProviderConnector,
        store: &'a dyn MailStore,
        decoder: &'a dyn MessageDecoder,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            connector,
            store,
            decoder,
            sleeper,
            retry: RetryPolicy::default(),
            clobber: ClobberSet::empty(),
            workers: 4,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn clobber(mut self, clobber: ClobberSet) -> Self {
        self.clobber = clobber;
        self
    }

    /// Fetch every ID, delivering one outcome per ID to `sink`
    ///
    /// `sink` is called from worker threads. Returns once every ID has an
    /// outcome.
    pub fn fetch(
        &self,
        ids: Vec<MessageId>,
        labels: &LabelMap,
        token: &CancellationToken,
        sink: &(dyn Fn(FetchOutcome) + Sync),
    ) -> Result<(), rayon::ThreadPoolBuildError> {
        if ids.is_empty() {
            return Ok(());
        }

        let workers = self.workers.min(ids.len());
        let queue = Mutex::new(VecDeque::from(ids));
        let session_error: Mutex<Option<ProviderError>> = Mutex::new(None);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fetch-worker-{}", i))
            .build()?;

        pool.scope(|scope| {
            for worker in 0..workers {
                let queue = &queue;
                let session_error = &session_error;
                scope.spawn(move |_| {
                    self.run_worker(worker, queue, session_error, labels, token, sink)
                });
            }
        });

        // Only reachable when every worker failed to open a session
        let leftover: Vec<MessageId> = queue
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into();
        if !leftover.is_empty() {
            let reason = session_error
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .unwrap_or_else(|| ProviderError::Connection("no session available".to_string()));
            for id in leftover {
                let status = if token.is_cancelled() {
                    FetchStatus::Cancelled
                } else {
                    error!("Failed to fetch message {}: {}", id, reason);
                    FetchStatus::Failed(FetchError::Session {
                        id: id.clone(),
                        source: reason.clone(),
                    })
                };
                sink(FetchOutcome {
                    id,
                    status,
                    attempts: 0,
                });
            }
        }

        Ok(())
    }

    fn run_worker(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<MessageId>>,
        session_error: &Mutex<Option<ProviderError>>,
        labels: &LabelMap,
        token: &CancellationToken,
        sink: &(dyn Fn(FetchOutcome) + Sync),
    ) {
        let mut session: Option<Box<dyn MailProvider>> = None;

        loop {
            let Some(id) = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
            else {
                break;
            };

            if token.is_cancelled() {
                sink(FetchOutcome {
                    id,
                    status: FetchStatus::Cancelled,
                    attempts: 0,
                });
                continue;
            }

            // Sessions open lazily so a cancelled run never connects
            if session.is_none() {
                match self.connector.connect() {
                    Ok(provider) => session = Some(provider),
                    Err(e) => {
                        error!("Worker {} could not open a session: {}", worker, e);
                        queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push_front(id);
                        session_error
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert(e);
                        return;
                    }
                }
            }
            sink(self.fetch_one(&mut session, id, labels, token));
        }
    }

    /// The worker's session, reopening it if a previous call lost it
    fn session<'s>(
        &self,
        session: &'s mut Option<Box<dyn MailProvider>>,
    ) -> Result<&'s mut (dyn MailProvider + 'static), ProviderError> {
        if session.is_none() {
            *session = Some(self.connector.connect()?);
            debug!("Reopened {} session", self.connector.name());
        }
        session
            .as_deref_mut()
            .ok_or_else(|| ProviderError::Connection("no session available".to_string()))
    }

    /// Fetch, decode and store one message, retrying transient errors
    ///
    /// A timeout or connection error drops the session; the next attempt
    /// reconnects, and a failed reconnect counts as that attempt's error.
    fn fetch_one(
        &self,
        session: &mut Option<Box<dyn MailProvider>>,
        id: MessageId,
        labels: &LabelMap,
        token: &CancellationToken,
    ) -> FetchOutcome {
        let mut attempts = 0;

        loop {
            if token.is_cancelled() {
                return FetchOutcome {
                    id,
                    status: FetchStatus::Cancelled,
                    attempts,
                };
            }

            attempts += 1;
            let result = self
                .session(session)
                .and_then(|provider| provider.get_message(&id));
            let error = match result {
                Ok(raw) => {
                    let status = self.store_message(&id, &raw, labels);
                    return FetchOutcome {
                        id,
                        status,
                        attempts,
                    };
                }
                Err(e) => e,
            };
            if error.is_session_lost() {
                warn!("Session lost while fetching message {}: {}", id, error);
                *session = None;
            }

            if !error.is_transient() || attempts >= self.retry.max_attempts {
                error!(
                    "Failed to fetch message {} after {} attempt(s): {}",
                    id, attempts, error
                );
                return FetchOutcome {
                    status: FetchStatus::Failed(FetchError::Provider {
                        id: id.clone(),
                        source: error,
                    }),
                    id,
                    attempts,
                };
            }

            warn!(
                "Transient error fetching message {} (attempt {}/{}): {}; retrying in {:?}",
                id, attempts, self.retry.max_attempts, error, self.retry.delay
            );
            if token.is_cancelled() {
                return FetchOutcome {
                    id,
                    status: FetchStatus::Cancelled,
                    attempts,
                };
            }
            self.sleeper.sleep(self.retry.delay);
        }
    }

    fn store_message(
        &self,
        id: &MessageId,
        raw: &crate::provider::RawMessage,
        labels: &LabelMap,
    ) -> FetchStatus {
        let record = match self.decoder.decode(raw, labels) {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to decode message {}: {}", id, e);
                return FetchStatus::Failed(FetchError::Decode {
                    id: id.clone(),
                    source: e,
                });
            }
        };

        match self.store.upsert(&record, self.clobber) {
            Ok(()) => {
                debug!("Stored message {}", id);
                FetchStatus::Succeeded
            }
            Err(e) => {
                error!("Failed to store message {}: {:#}", id, e);
                FetchStatus::Failed(FetchError::Store {
                    id: id.clone(),
                    message: format!("{:#}", e),
                })
            }
        }
    }
}
