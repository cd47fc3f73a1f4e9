//! Gmail API message decoding
//!
//! Converts `format=full` Gmail API messages to [`MessageRecord`]s.

use base64::prelude::*;
use chrono::{DateTime, Utc};

use super::{DecodeError, html_to_text, parse_addresses, parse_date_header, parse_sender};
use crate::gmail::api::{GmailMessage, MessagePart, MessagePayload};
use crate::models::{EmailAddress, LabelMap, MessageId, MessageRecord, Recipients, SystemLabel};

/// Decode a Gmail API message
///
/// The timestamp comes from `internalDate`, falling back to the `Date`
/// header. Read and outgoing state come from the `UNREAD` and `SENT` labels.
pub fn decode_gmail_message(
    message: &GmailMessage,
    labels: &LabelMap,
) -> Result<MessageRecord, DecodeError> {
    let id = MessageId::new(&message.id);
    let payload = message
        .payload
        .as_ref()
        .ok_or_else(|| DecodeError::MissingPayload { id: id.clone() })?;

    let sender = extract_header(payload, "From")
        .map(parse_sender)
        .unwrap_or_else(EmailAddress::default);

    let recipients = Recipients {
        to: extract_header(payload, "To").map(parse_addresses).unwrap_or_default(),
        cc: extract_header(payload, "Cc").map(parse_addresses).unwrap_or_default(),
        bcc: extract_header(payload, "Bcc").map(parse_addresses).unwrap_or_default(),
    };

    let timestamp = parse_internal_date(message)?
        .or_else(|| extract_header(payload, "Date").and_then(parse_date_header));

    let label_ids = message.label_ids.as_deref().unwrap_or_default();
    let (is_read, is_outgoing) = if message.label_ids.is_some() {
        (
            !label_ids.iter().any(|l| l == SystemLabel::UNREAD),
            label_ids.iter().any(|l| l == SystemLabel::SENT),
        )
    } else {
        (false, false)
    };

    Ok(MessageRecord::builder(id)
        .thread_id(&message.thread_id)
        .sender(sender)
        .recipients(recipients)
        .labels(labels.resolve(label_ids))
        .maybe_subject(extract_header(payload, "Subject").map(str::to_string))
        .maybe_body(extract_body(payload))
        .size(message.size_estimate.unwrap_or(0))
        .timestamp(timestamp)
        .is_read(is_read)
        .is_outgoing(is_outgoing)
        .build())
}

/// `internalDate` is epoch milliseconds as a string
fn parse_internal_date(message: &GmailMessage) -> Result<Option<DateTime<Utc>>, DecodeError> {
    let Some(raw) = message.internal_date.as_deref() else {
        return Ok(None);
    };
    let millis: i64 = raw.parse().map_err(|_| DecodeError::Malformed {
        id: MessageId::new(&message.id),
        reason: format!("invalid internalDate '{}'", raw),
    })?;
    Ok(DateTime::from_timestamp_millis(millis))
}

/// Extract a header value by name
fn extract_header<'a>(payload: &'a MessagePayload, name: &str) -> Option<&'a str> {
    payload
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn is_mime(mime_type: Option<&String>, expected: &str) -> bool {
    mime_type.is_some_and(|m| m.starts_with(expected))
}

/// Plain-text rendering of the primary content part
///
/// Prefers a text/plain part; HTML is converted to text.
fn extract_body(payload: &MessagePayload) -> Option<String> {
    // Single-part message
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref())
        && let Some(text) = decode_base64_body(data)
    {
        return Some(if is_mime(payload.mime_type.as_ref(), "text/html") {
            html_to_text(&text)
        } else {
            text
        });
    }

    let parts = payload.parts.as_deref()?;
    if let Some(text) = find_part(parts, "text/plain") {
        return Some(text);
    }
    find_part(parts, "text/html").map(|html| html_to_text(&html))
}

/// Recursively search message parts for the first decodable part of `mime`
fn find_part(parts: &[MessagePart], mime: &str) -> Option<String> {
    for part in parts {
        let is_attachment = part.filename.as_deref().is_some_and(|f| !f.is_empty());
        if !is_attachment
            && is_mime(part.mime_type.as_ref(), mime)
            && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        if let Some(nested) = &part.parts
            && let Some(text) = find_part(nested, mime)
        {
            return Some(text);
        }
    }

    None
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
fn decode_base64_body(data: &str) -> Option<String> {
    let decoders: [&base64::engine::GeneralPurpose; 4] = [
        &BASE64_URL_SAFE_NO_PAD,
        &BASE64_URL_SAFE,
        &BASE64_STANDARD,
        &BASE64_STANDARD_NO_PAD,
    ];

    decoders.iter().find_map(|decoder| {
        decoder
            .decode(data)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    })
}
