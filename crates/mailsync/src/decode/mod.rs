//! Conversion of raw provider content into [`MessageRecord`]s

mod gmail;
mod rfc822;

use chrono::{DateTime, Utc};
use mailparse::MailAddr;

use crate::models::{EmailAddress, LabelMap, MessageId, MessageRecord};
use crate::provider::RawMessage;

pub use gmail::decode_gmail_message;
pub use rfc822::decode_rfc822_message;

/// A message whose content could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("message {id} has no payload")]
    MissingPayload { id: MessageId },
    #[error("message {id} is malformed: {reason}")]
    Malformed { id: MessageId, reason: String },
}

/// Decodes raw provider content
///
/// Shared read-only by every fetch worker.
pub trait MessageDecoder: Send + Sync {
    fn decode(&self, raw: &RawMessage, labels: &LabelMap) -> Result<MessageRecord, DecodeError>;
}

/// Decoder for both Gmail JSON and RFC 822 content
#[derive(Debug, Clone, Default)]
pub struct StandardDecoder {
    /// Account address; RFC 822 messages from it are outgoing
    self_address: Option<String>,
}

impl StandardDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_self_address(address: impl Into<String>) -> Self {
        Self {
            self_address: Some(address.into().to_lowercase()),
        }
    }
}

impl MessageDecoder for StandardDecoder {
    fn decode(&self, raw: &RawMessage, labels: &LabelMap) -> Result<MessageRecord, DecodeError> {
        match raw {
            RawMessage::Gmail(message) => decode_gmail_message(message, labels),
            RawMessage::Rfc822 {
                id,
                bytes,
                folder,
                flags,
            } => decode_rfc822_message(
                id,
                bytes,
                folder,
                flags,
                labels,
                self.self_address.as_deref(),
            ),
        }
    }
}

/// Parse an address list header value
///
/// Falls back to a plain comma split when the value isn't valid RFC 5322.
pub(crate) fn parse_addresses(value: &str) -> Vec<EmailAddress> {
    let value = value.trim();
    if value.is_empty() {
        return Vec::new();
    }

    match mailparse::addrparse(value) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![info.clone()],
                MailAddr::Group(group) => group.addrs.clone(),
            })
            .filter(|info| !info.addr.trim().is_empty())
            .map(|info| EmailAddress {
                name: info
                    .display_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                email: info.addr.trim().to_lowercase(),
            })
            .collect(),
        Err(_) => EmailAddress::parse_list(value),
    }
}

/// Parse a single sender header value
pub(crate) fn parse_sender(value: &str) -> EmailAddress {
    parse_addresses(value)
        .into_iter()
        .next()
        .unwrap_or_else(|| EmailAddress::parse(value))
}

/// Parse an RFC 2822 `Date` header value
pub(crate) fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    mailparse::dateparse(value)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Render HTML as plain text
pub(crate) fn html_to_text(html: &str) -> String {
    nanohtml2text::html2text(html)
}
