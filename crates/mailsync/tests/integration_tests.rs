//! Integration tests for the mailsync crate
//!
//! These tests drive the sync engine end to end against an in-process fake
//! mailbox and a SQLite store in a temp directory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::prelude::*;
use chrono::{DateTime, Utc};
use mailsync::gmail::api::{GmailMessage, Header, MessageBody, MessagePayload};
use mailsync::models::{ClobberSet, ContentField, LabelMap, MessageId};
use mailsync::provider::{
    MailProvider, MessagePage, ProviderConnector, ProviderError, Query, RawMessage,
};
use mailsync::storage::{InMemoryMailStore, MailStore, SqliteMailStore};
use mailsync::sync::{Completion, Sleeper, SyncEngine, SyncError, SyncMode, SyncOptions};
use mailsync::{CancellationToken, StandardDecoder};
use tempfile::TempDir;

/// Base timestamp for fake messages (2024-01-01T00:00:00Z)
const BASE_MILLIS: i64 = 1_704_067_200_000;

/// Helper to create a Gmail-shaped message
fn make_message(id: &str, body: &str, hour: i64, labels: &[&str]) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        label_ids: Some(labels.iter().map(|l| l.to_string()).collect()),
        snippet: String::new(),
        internal_date: Some((BASE_MILLIS + hour * 3_600_000).to_string()),
        size_estimate: Some(body.len() as u64),
        payload: Some(MessagePayload {
            headers: Some(vec![
                Header {
                    name: "From".to_string(),
                    value: "Sender <sender@example.com>".to_string(),
                },
                Header {
                    name: "Subject".to_string(),
                    value: format!("Subject {}", id),
                },
            ]),
            body: Some(MessageBody {
                size: Some(body.len() as u32),
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(body)),
            }),
            parts: None,
            mime_type: Some("text/plain".to_string()),
        }),
    }
}

/// Scripted behaviour for one message ID
#[derive(Clone, Copy)]
enum Failure {
    /// Fail transiently this many times, then succeed
    Transient(u32),
    /// Always fail transiently
    AlwaysTransient,
    /// Fail with a 404
    Permanent,
}

/// In-process mailbox shared by every fake session
#[derive(Default)]
struct FakeMailbox {
    messages: Mutex<BTreeMap<MessageId, GmailMessage>>,
    failures: Mutex<HashMap<MessageId, Failure>>,
    calls: Mutex<HashMap<MessageId, u32>>,
    get_calls: AtomicUsize,
    pages_listed: AtomicUsize,
    queries: Mutex<Vec<String>>,
    fail_listing: bool,
    /// Fail every listing call after this many pages succeeded
    fail_listing_after_pages: Option<usize>,
    fail_labels: bool,
    /// Cancel `token` once this many pages were listed
    cancel_after_pages: Option<usize>,
    /// Cancel `token` once this many messages were fetched
    cancel_after_gets: Option<usize>,
    token: CancellationToken,
}

impl FakeMailbox {
    fn put(&self, message: GmailMessage) {
        self.messages
            .lock()
            .unwrap()
            .insert(MessageId::new(&message.id), message);
    }

    fn remove(&self, id: &str) {
        self.messages.lock().unwrap().remove(&MessageId::new(id));
    }

    fn fail(&self, id: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(MessageId::new(id), failure);
    }

    fn calls_for(&self, id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&MessageId::new(id))
            .copied()
            .unwrap_or(0)
    }
}

struct FakeSession {
    mailbox: Arc<FakeMailbox>,
}

impl MailProvider for FakeSession {
    fn authenticate(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn list_labels(&mut self) -> Result<LabelMap, ProviderError> {
        if self.mailbox.fail_labels {
            return Err(ProviderError::Status {
                code: 500,
                message: "labels unavailable".to_string(),
            });
        }
        let mut labels = LabelMap::new();
        labels.insert("INBOX", "INBOX");
        labels.insert("UNREAD", "UNREAD");
        labels.insert("Label_1", "Receipts");
        Ok(labels)
    }

    fn get_message(&mut self, id: &MessageId) -> Result<RawMessage, ProviderError> {
        let fetched = self.mailbox.get_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt = {
            let mut calls = self.mailbox.calls.lock().unwrap();
            let count = calls.entry(id.clone()).or_default();
            *count += 1;
            *count
        };
        if self.mailbox.cancel_after_gets.is_some_and(|limit| fetched >= limit) {
            self.mailbox.token.cancel();
        }

        match self.mailbox.failures.lock().unwrap().get(id).copied() {
            Some(Failure::AlwaysTransient) => return Err(ProviderError::Timeout),
            Some(Failure::Transient(n)) if attempt <= n => {
                return Err(ProviderError::Status {
                    code: 503,
                    message: "backend unavailable".to_string(),
                });
            }
            Some(Failure::Permanent) => return Err(ProviderError::NotFound(id.to_string())),
            _ => {}
        }

        self.mailbox
            .messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .map(RawMessage::Gmail)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    fn list_messages(
        &mut self,
        query: &Query,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessagePage, ProviderError> {
        let listed = self.mailbox.pages_listed.load(Ordering::SeqCst);
        if self.mailbox.fail_listing
            || self.mailbox.fail_listing_after_pages.is_some_and(|limit| listed >= limit)
        {
            return Err(ProviderError::Status {
                code: 500,
                message: "listing unavailable".to_string(),
            });
        }
        self.mailbox
            .queries
            .lock()
            .unwrap()
            .push(query.as_str().to_string());

        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let ids: Vec<MessageId> = self.mailbox.messages.lock().unwrap().keys().cloned().collect();
        let page: Vec<MessageId> = ids.iter().skip(offset).take(page_size).cloned().collect();
        let next = offset + page.len();

        let listed = self.mailbox.pages_listed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.mailbox.cancel_after_pages.is_some_and(|limit| listed >= limit) {
            self.mailbox.token.cancel();
        }

        Ok(MessagePage {
            ids: page,
            next_page_token: (next < ids.len()).then(|| next.to_string()),
        })
    }

    fn build_query(&self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Query {
        let mut terms = Vec::new();
        if let Some(after) = after {
            terms.push(format!("after:{}", after.timestamp()));
        }
        if let Some(before) = before {
            terms.push(format!("before:{}", before.timestamp()));
        }
        Query::new(terms.join(" "))
    }
}

struct FakeConnector {
    mailbox: Arc<FakeMailbox>,
}

impl ProviderConnector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn MailProvider>, ProviderError> {
        Ok(Box::new(FakeSession {
            mailbox: Arc::clone(&self.mailbox),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Records backoff sleeps instead of sleeping
#[derive(Default)]
struct CountingSleeper {
    sleeps: AtomicUsize,
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Helper to create a SQLite store in a temp directory
fn create_test_store() -> (SqliteMailStore, TempDir) {
    let dir = TempDir::new().unwrap();
    // Use .test.sqlite extension to clearly distinguish from production databases
    let store = SqliteMailStore::new(dir.path().join("messages.test.sqlite")).unwrap();
    (store, dir)
}

fn options() -> SyncOptions {
    SyncOptions::default()
        .with_workers(3)
        .with_retry(3, Duration::from_millis(1))
}

struct Harness {
    mailbox: Arc<FakeMailbox>,
    connector: FakeConnector,
    decoder: StandardDecoder,
    sleeper: CountingSleeper,
}

impl Harness {
    fn new(mailbox: FakeMailbox) -> Self {
        let mailbox = Arc::new(mailbox);
        Self {
            connector: FakeConnector {
                mailbox: Arc::clone(&mailbox),
            },
            mailbox,
            decoder: StandardDecoder::new(),
            sleeper: CountingSleeper::default(),
        }
    }

    fn with_messages(count: usize) -> Self {
        let harness = Self::new(FakeMailbox::default());
        for i in 0..count {
            harness.mailbox.put(make_message(
                &format!("m{:03}", i),
                "original body",
                i as i64,
                &["INBOX"],
            ));
        }
        harness
    }

    fn engine<'a>(&'a self, store: &'a dyn MailStore, options: SyncOptions) -> SyncEngine<'a> {
        SyncEngine::new(&self.connector, store, &self.decoder, options).with_sleeper(&self.sleeper)
    }

    fn sleeps(&self) -> usize {
        self.sleeper.sleeps.load(Ordering::SeqCst)
    }
}

fn ids(ids: &[&str]) -> HashSet<MessageId> {
    ids.iter().map(|id| MessageId::new(*id)).collect()
}

#[test]
fn test_full_sync_stores_every_message() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(25);

    let report = harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.candidates, 25);
    assert_eq!(report.succeeded, 25);
    assert_eq!(report.failed, 0);
    assert_eq!(report.attempted(), 25);
    assert_eq!(report.completion, Completion::Clean);
    assert_eq!(store.count().unwrap(), 25);

    let stored = store.get_message(&MessageId::new("m007")).unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("original body"));
    assert_eq!(stored.thread_id, "thread-m007");
    assert_eq!(stored.sender.email, "sender@example.com");
    assert!(stored.labels.contains("INBOX"));
    assert!(stored.is_read);
}

#[test]
fn test_repeated_sync_is_idempotent() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(10);
    let engine = harness.engine(&store, options());

    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();
    let mut first = store.get_message(&MessageId::new("m003")).unwrap().unwrap();

    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();
    let mut second = store.get_message(&MessageId::new("m003")).unwrap().unwrap();

    assert_eq!(store.count().unwrap(), 10);
    assert_eq!(store.active_ids().unwrap().len(), 10);
    first.last_indexed = None;
    second.last_indexed = None;
    assert_eq!(first, second);
}

#[test]
fn test_resync_preserves_content_but_updates_labels() {
    let (store, _dir) = create_test_store();
    let harness = Harness::new(FakeMailbox::default());
    harness
        .mailbox
        .put(make_message("m1", "A", 1, &["INBOX", "UNREAD"]));
    let engine = harness.engine(&store, options());
    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();

    harness.mailbox.put(make_message("m1", "B", 1, &["Label_1"]));
    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();

    let stored = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("A"));
    assert_eq!(stored.labels.iter().collect::<Vec<_>>(), vec!["Receipts"]);
    assert!(stored.is_read);
}

#[test]
fn test_clobber_overwrites_named_content() {
    let (store, _dir) = create_test_store();
    let harness = Harness::new(FakeMailbox::default());
    harness.mailbox.put(make_message("m1", "A", 1, &["INBOX"]));
    harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    harness.mailbox.put(make_message("m1", "B", 1, &["INBOX"]));
    let clobber = ClobberSet::empty().with(ContentField::Body);
    harness
        .engine(&store, options().with_clobber(clobber))
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    let stored = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
    assert_eq!(stored.body.as_deref(), Some("B"));
    assert_eq!(stored.subject.as_deref(), Some("Subject m1"));
}

#[test]
fn test_full_sync_marks_deleted_and_resurrects() {
    let (store, _dir) = create_test_store();
    let harness = Harness::new(FakeMailbox::default());
    for id in ["a", "b", "c"] {
        harness.mailbox.put(make_message(id, "body", 1, &["INBOX"]));
    }
    let engine = harness.engine(&store, options());
    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();

    harness.mailbox.remove("b");
    let report = engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();
    assert_eq!(report.deletions_marked, 1);
    assert_eq!(store.deleted_ids().unwrap(), ids(&["b"]));
    assert_eq!(store.active_ids().unwrap(), ids(&["a", "c"]));
    let deleted = store.get_message(&MessageId::new("b")).unwrap().unwrap();
    assert_eq!(deleted.body.as_deref(), Some("body"));

    harness.mailbox.put(make_message("b", "body", 1, &["INBOX"]));
    let report = engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();
    assert_eq!(report.deletions_marked, 0);
    assert!(store.deleted_ids().unwrap().is_empty());
    assert_eq!(store.active_ids().unwrap().len(), 3);
}

#[test]
fn test_deletions_mode_fetches_no_content() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(5);
    let engine = harness.engine(&store, options());
    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();
    let fetched_before = harness.mailbox.get_calls.load(Ordering::SeqCst);

    harness.mailbox.remove("m001");
    harness.mailbox.remove("m004");
    let report = engine
        .run(SyncMode::Deletions, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.deletions_marked, 2);
    assert_eq!(report.candidates, 0);
    assert_eq!(harness.mailbox.get_calls.load(Ordering::SeqCst), fetched_before);
    assert_eq!(store.deleted_ids().unwrap(), ids(&["m001", "m004"]));
}

#[test]
fn test_incremental_sync_does_not_detect_deletions() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(3);
    let engine = harness.engine(&store, options());
    engine.run(SyncMode::Full, &CancellationToken::new()).unwrap();

    harness.mailbox.remove("m000");
    let report = engine
        .run(SyncMode::Incremental, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.deletions_marked, 0);
    assert!(store.deleted_ids().unwrap().is_empty());
}

#[test]
fn test_incremental_windows_follow_watermarks() {
    let store = InMemoryMailStore::new();
    let harness = Harness::with_messages(3);
    let engine = harness.engine(&store, options());

    engine
        .run(SyncMode::Incremental, &CancellationToken::new())
        .unwrap();
    assert_eq!(*harness.mailbox.queries.lock().unwrap(), vec![String::new()]);
    harness.mailbox.queries.lock().unwrap().clear();

    engine
        .run(SyncMode::Incremental, &CancellationToken::new())
        .unwrap();
    let first = BASE_MILLIS / 1000;
    let last = first + 2 * 3600;
    assert_eq!(
        *harness.mailbox.queries.lock().unwrap(),
        vec![format!("after:{}", last), format!("before:{}", first)]
    );
}

#[test]
fn test_transient_errors_are_retried_until_success() {
    let store = InMemoryMailStore::new();
    let harness = Harness::new(FakeMailbox::default());
    harness.mailbox.put(make_message("flaky", "body", 1, &[]));
    harness.mailbox.fail("flaky", Failure::Transient(2));

    let report = harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(harness.mailbox.calls_for("flaky"), 3);
    assert_eq!(harness.sleeps(), 2);
}

#[test]
fn test_retry_cap_fails_the_message() {
    let store = InMemoryMailStore::new();
    let harness = Harness::new(FakeMailbox::default());
    harness.mailbox.put(make_message("slow", "body", 1, &[]));
    harness.mailbox.put(make_message("fine", "body", 2, &[]));
    harness.mailbox.fail("slow", Failure::AlwaysTransient);

    let report = harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(harness.mailbox.calls_for("slow"), 3);
    assert_eq!(harness.sleeps(), 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed_ids, vec![MessageId::new("slow")]);
    assert_eq!(report.completion, Completion::Clean);
    assert!(store.get_message(&MessageId::new("slow")).unwrap().is_none());
}

#[test]
fn test_permanent_errors_are_not_retried() {
    let store = InMemoryMailStore::new();
    let harness = Harness::new(FakeMailbox::default());
    harness.mailbox.put(make_message("gone", "body", 1, &[]));
    harness.mailbox.fail("gone", Failure::Permanent);

    let report = harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(harness.mailbox.calls_for("gone"), 1);
    assert_eq!(harness.sleeps(), 0);
    assert_eq!(report.failed, 1);
}

#[test]
fn test_decode_failure_is_a_per_message_failure() {
    let store = InMemoryMailStore::new();
    let harness = Harness::new(FakeMailbox::default());
    let mut broken = make_message("broken", "body", 1, &[]);
    broken.payload = None;
    harness.mailbox.put(broken);
    harness.mailbox.put(make_message("ok", "body", 2, &[]));

    let report = harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.failed_ids, vec![MessageId::new("broken")]);
    assert_eq!(report.succeeded, 1);
    assert_eq!(harness.mailbox.calls_for("broken"), 1);
}

#[test]
fn test_cancellation_bounds_in_flight_fetches() {
    let store = InMemoryMailStore::new();
    let workers = 3;
    let harness = Harness::new(FakeMailbox {
        cancel_after_gets: Some(5),
        ..Default::default()
    });
    for i in 0..60 {
        harness
            .mailbox
            .put(make_message(&format!("m{:03}", i), "body", i, &[]));
    }

    let token = harness.mailbox.token.clone();
    let report = harness
        .engine(&store, options().with_workers(workers))
        .run(SyncMode::Full, &token)
        .unwrap();

    let fetched = harness.mailbox.get_calls.load(Ordering::SeqCst);
    assert!(fetched >= 5);
    assert!(fetched < 5 + workers, "fetched {} messages", fetched);
    assert_eq!(report.completion, Completion::Cancelled);
    assert_eq!(report.candidates, 60);
    assert_eq!(report.completed(), 60);
    assert!(report.cancelled >= 60 - fetched);
    assert_eq!(store.count().unwrap(), report.succeeded);
}

#[test]
fn test_pagination_collects_every_page() {
    let store = InMemoryMailStore::new();
    let harness = Harness::with_messages(7);
    let mut options = options();
    options.page_size = 2;

    let report = harness
        .engine(&store, options)
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(harness.mailbox.pages_listed.load(Ordering::SeqCst), 4);
    assert_eq!(report.candidates, 7);
    assert_eq!(store.count().unwrap(), 7);
}

#[test]
fn test_cancelled_listing_keeps_collected_ids_and_skips_deletions() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(6);
    harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    // "m005" disappears remotely, but the next listing is cut short
    let harness = Harness::new(FakeMailbox {
        cancel_after_pages: Some(1),
        ..Default::default()
    });
    for i in 0..5 {
        harness
            .mailbox
            .put(make_message(&format!("m{:03}", i), "body", i, &[]));
    }
    let token = harness.mailbox.token.clone();
    let mut options = options();
    options.page_size = 2;

    let report = harness
        .engine(&store, options)
        .run(SyncMode::Full, &token)
        .unwrap();

    assert_eq!(harness.mailbox.pages_listed.load(Ordering::SeqCst), 1);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.cancelled, 2);
    assert_eq!(report.deletions_marked, 0);
    assert_eq!(report.completion, Completion::Cancelled);
    assert!(store.deleted_ids().unwrap().is_empty());
}

#[test]
fn test_listing_failure_is_fatal() {
    let store = InMemoryMailStore::new();
    let harness = Harness::new(FakeMailbox {
        fail_listing: true,
        ..Default::default()
    });

    let result = harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new());

    assert!(matches!(result, Err(SyncError::Listing { .. })));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_partial_listing_marks_nothing_deleted() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(6);
    harness
        .engine(&store, options())
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    // The first page lists fine, then the mailbox stops answering
    let harness = Harness::new(FakeMailbox {
        fail_listing_after_pages: Some(1),
        ..Default::default()
    });
    for i in 0..6 {
        harness
            .mailbox
            .put(make_message(&format!("m{:03}", i), "body", i, &[]));
    }
    let mut options = options();
    options.page_size = 2;

    let result = harness
        .engine(&store, options)
        .run(SyncMode::Full, &CancellationToken::new());

    assert!(matches!(result, Err(SyncError::Listing { .. })));
    assert_eq!(harness.mailbox.pages_listed.load(Ordering::SeqCst), 1);
    assert!(store.deleted_ids().unwrap().is_empty());
}

#[test]
fn test_label_failure_is_fatal() {
    let store = InMemoryMailStore::new();
    let harness = Harness::new(FakeMailbox {
        fail_labels: true,
        ..Default::default()
    });
    harness.mailbox.put(make_message("m1", "body", 1, &[]));

    let result = harness
        .engine(&store, options())
        .run(SyncMode::Incremental, &CancellationToken::new());

    assert!(matches!(result, Err(SyncError::Labels(_))));
    assert_eq!(harness.mailbox.get_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_single_message_mode() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(4);

    let report = harness
        .engine(&store, options())
        .run(
            SyncMode::Single(MessageId::new("m002")),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(harness.mailbox.pages_listed.load(Ordering::SeqCst), 0);
    assert_eq!(store.all_ids().unwrap(), ids(&["m002"]));
}

#[test]
fn test_single_message_mode_reports_missing_message() {
    let store = InMemoryMailStore::new();
    let harness = Harness::with_messages(1);

    let report = harness
        .engine(&store, options())
        .run(
            SyncMode::Single(MessageId::new("nope")),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_ids, vec![MessageId::new("nope")]);
}

#[test]
fn test_concurrent_workers_write_to_sqlite() {
    let (store, _dir) = create_test_store();
    let harness = Harness::with_messages(120);

    let report = harness
        .engine(&store, options().with_workers(8))
        .run(SyncMode::Full, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.succeeded, 120);
    assert_eq!(store.count().unwrap(), 120);
    assert_eq!(
        store.first_indexed_timestamp().unwrap().unwrap().timestamp_millis(),
        BASE_MILLIS
    );
    assert_eq!(
        store.last_indexed_timestamp().unwrap().unwrap().timestamp_millis(),
        BASE_MILLIS + 119 * 3_600_000
    );
}
