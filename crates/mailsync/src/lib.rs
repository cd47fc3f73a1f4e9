//! Mailsync crate - incremental mailbox mirroring into SQLite
//!
//! This crate provides:
//! - Domain models (MessageRecord, EmailAddress, clobber sets)
//! - Gmail API and IMAP providers behind one `MailProvider` trait
//! - Decoding of Gmail JSON and RFC 822 messages
//! - A SQLite message store with soft deletes and watermarks
//! - The sync engine: query windows, concurrent fetch, deletion detection

pub mod cancel;
pub mod config;
pub mod decode;
pub mod gmail;
pub mod imap;
pub mod models;
pub mod provider;
pub mod storage;
pub mod sync;

pub use crate::cancel::CancellationToken;
pub use crate::config::{GmailCredentials, ImapSettings, MirrorConfig, SyncSettings};
pub use crate::decode::{DecodeError, MessageDecoder, StandardDecoder};
pub use crate::gmail::{GmailAuth, GmailClient, GmailConnector};
pub use crate::imap::{ImapConnector, ImapProvider};
pub use crate::models::{
    ClobberSet, ContentField, EmailAddress, LabelMap, MessageId, MessageRecord, Recipients,
};
pub use crate::provider::{
    MailProvider, MessagePage, ProviderConnector, ProviderError, Query, RawMessage,
};
pub use crate::storage::{InMemoryMailStore, MailStore, SqliteMailStore};
pub use crate::sync::{
    Completion, DeletionDetector, FetchError, FetchOutcome, FetchStatus, Fetcher, RetryPolicy,
    RunReport, Sleeper, SyncEngine, SyncError, SyncMode, SyncOptions, ThreadSleeper,
};

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "messages.db";
