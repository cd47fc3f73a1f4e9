//! Mail provider abstraction
//!
//! A provider is a stateful session against one remote mailbox. Sessions are
//! not shared between threads: each fetch worker opens its own through a
//! [`ProviderConnector`].

use std::fmt;

use chrono::{DateTime, Utc};

use crate::gmail::api::GmailMessage;
use crate::models::{LabelMap, MessageId};

/// Error from a provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("HTTP status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("IMAP error: {0}")]
    Imap(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("malformed response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether a retry has a chance of succeeding
    ///
    /// Timeouts, connection failures, rate limiting and 5xx responses are
    /// transient; everything else fails the message immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Connection(_) => true,
            ProviderError::Status { code, .. } => *code == 429 || *code >= 500,
            ProviderError::Imap(_)
            | ProviderError::Auth(_)
            | ProviderError::NotFound(_)
            | ProviderError::Parse(_) => false,
        }
    }

    /// Whether the session that produced this error is no longer usable
    pub fn is_session_lost(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Connection(_))
    }
}

/// Provider-specific search query built by [`MailProvider::build_query`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(String);

impl Query {
    pub fn new(query: impl Into<String>) -> Self {
        Self(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<all>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// One page of message IDs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<MessageId>,
    /// Token for the next page; `None` on the last page
    pub next_page_token: Option<String>,
}

/// Undecoded message content as returned by a provider
#[derive(Debug, Clone)]
pub enum RawMessage {
    /// Gmail API `format=full` message
    Gmail(GmailMessage),
    /// RFC 822 bytes with the IMAP folder and flags they were found with
    Rfc822 {
        id: MessageId,
        bytes: Vec<u8>,
        folder: String,
        flags: Vec<String>,
    },
}

/// A session against a remote mailbox
pub trait MailProvider {
    /// Establish credentials for this session
    fn authenticate(&mut self) -> Result<(), ProviderError>;

    /// Map of label ID to label name
    fn list_labels(&mut self) -> Result<LabelMap, ProviderError>;

    /// Fetch the raw content of one message
    fn get_message(&mut self, id: &MessageId) -> Result<RawMessage, ProviderError>;

    /// List one page of message IDs matching `query`
    fn list_messages(
        &mut self,
        query: &Query,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessagePage, ProviderError>;

    /// Build a query for messages after and/or before the given times
    ///
    /// With neither bound the query matches every message.
    fn build_query(&self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Query;
}

/// Opens authenticated provider sessions
pub trait ProviderConnector: Send + Sync {
    /// Open a new session and authenticate it
    fn connect(&self) -> Result<Box<dyn MailProvider>, ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}
