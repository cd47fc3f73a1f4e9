//! Message model representing one mirrored mailbox message

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (provider-assigned)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an email address from a string like "John Doe <john@example.com>"
    ///
    /// Surrounding quotes on the display name are dropped and the address is
    /// lowercased.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim().trim_matches('"').trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_lowercase(),
            };
        }

        Self {
            name: None,
            email: s.to_lowercase(),
        }
    }

    /// Parse a comma-separated address list, dropping entries without an address
    pub fn parse_list(s: &str) -> Vec<Self> {
        s.split(',')
            .map(Self::parse)
            .filter(|addr| !addr.email.is_empty())
            .collect()
    }
}

/// Recipients keyed by role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    #[serde(default)]
    pub to: Vec<EmailAddress>,
    #[serde(default)]
    pub cc: Vec<EmailAddress>,
    #[serde(default)]
    pub bcc: Vec<EmailAddress>,
}

impl Recipients {
    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }
}

/// One mirrored message, as decoded from the provider or read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Provider message ID (primary key)
    pub id: MessageId,
    /// Conversation grouping key
    pub thread_id: String,
    pub sender: EmailAddress,
    pub recipients: Recipients,
    /// Human-readable label names
    pub labels: BTreeSet<String>,
    pub subject: Option<String>,
    /// Plain-text rendering of the primary content part
    pub body: Option<String>,
    /// Approximate size in bytes
    pub size: u64,
    /// When the message was sent/received; absent for malformed messages
    pub timestamp: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_outgoing: bool,
    /// Soft-delete flag
    pub is_deleted: bool,
    /// Time of the most recent write; `None` until the record is stored
    pub last_indexed: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Create a new record builder
    pub fn builder(id: impl Into<MessageId>) -> MessageRecordBuilder {
        MessageRecordBuilder::new(id.into())
    }
}

/// Builder for creating MessageRecord instances
pub struct MessageRecordBuilder {
    record: MessageRecord,
}

impl MessageRecordBuilder {
    fn new(id: MessageId) -> Self {
        Self {
            record: MessageRecord {
                thread_id: id.as_str().to_string(),
                id,
                sender: EmailAddress::default(),
                recipients: Recipients::default(),
                labels: BTreeSet::new(),
                subject: None,
                body: None,
                size: 0,
                timestamp: None,
                is_read: false,
                is_outgoing: false,
                is_deleted: false,
                last_indexed: None,
            },
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.record.thread_id = thread_id.into();
        self
    }

    pub fn sender(mut self, sender: EmailAddress) -> Self {
        self.record.sender = sender;
        self
    }

    pub fn recipients(mut self, recipients: Recipients) -> Self {
        self.record.recipients = recipients;
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.record.recipients.to = to;
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.record.subject = Some(subject.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.record.body = Some(body.into());
        self
    }

    pub fn maybe_subject(mut self, subject: Option<String>) -> Self {
        self.record.subject = subject;
        self
    }

    pub fn maybe_body(mut self, body: Option<String>) -> Self {
        self.record.body = body;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.record.size = size;
        self
    }

    pub fn timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn is_read(mut self, is_read: bool) -> Self {
        self.record.is_read = is_read;
        self
    }

    pub fn is_outgoing(mut self, is_outgoing: bool) -> Self {
        self.record.is_outgoing = is_outgoing;
        self
    }

    pub fn build(self) -> MessageRecord {
        self.record
    }
}
