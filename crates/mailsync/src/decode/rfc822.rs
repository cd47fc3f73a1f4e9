//! RFC 822 message decoding (IMAP)

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use super::{DecodeError, html_to_text, parse_addresses, parse_date_header, parse_sender};
use crate::models::{EmailAddress, LabelMap, MessageId, MessageRecord, Recipients};

/// IMAP flag marking a message as read
const SEEN_FLAG: &str = "\\Seen";

/// Decode raw RFC 822 bytes fetched from `folder`
///
/// The thread ID is the first `References` entry, else `In-Reply-To`, else
/// the message's own ID. A message sent from `self_address` is outgoing.
pub fn decode_rfc822_message(
    id: &MessageId,
    bytes: &[u8],
    folder: &str,
    flags: &[String],
    labels: &LabelMap,
    self_address: Option<&str>,
) -> Result<MessageRecord, DecodeError> {
    let parsed = mailparse::parse_mail(bytes).map_err(|e| DecodeError::Malformed {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    let headers = &parsed.headers;

    let sender = headers
        .get_first_value("From")
        .map(|from| parse_sender(&from))
        .unwrap_or_else(EmailAddress::default);

    let recipients = Recipients {
        to: address_header(&parsed, "To"),
        cc: address_header(&parsed, "Cc"),
        bcc: address_header(&parsed, "Bcc"),
    };

    let thread_id = headers
        .get_first_value("References")
        .and_then(|refs| first_message_ref(&refs))
        .or_else(|| {
            headers
                .get_first_value("In-Reply-To")
                .and_then(|reply| first_message_ref(&reply))
        })
        .unwrap_or_else(|| id.as_str().to_string());

    let is_outgoing = self_address.is_some_and(|me| !sender.email.is_empty() && sender.email == me);
    let is_read = flags.iter().any(|f| f.eq_ignore_ascii_case(SEEN_FLAG));
    let folder_ids = [folder.to_string()];

    Ok(MessageRecord::builder(id.clone())
        .thread_id(thread_id)
        .sender(sender)
        .recipients(recipients)
        .labels(labels.resolve(&folder_ids))
        .maybe_subject(headers.get_first_value("Subject"))
        .maybe_body(extract_body(&parsed))
        .size(bytes.len() as u64)
        .timestamp(
            headers
                .get_first_value("Date")
                .and_then(|date| parse_date_header(&date)),
        )
        .is_read(is_read)
        .is_outgoing(is_outgoing)
        .build())
}

fn address_header(parsed: &ParsedMail<'_>, name: &str) -> Vec<EmailAddress> {
    parsed
        .headers
        .get_all_values(name)
        .iter()
        .flat_map(|value| parse_addresses(value))
        .collect()
}

/// First `<...>` token of a References / In-Reply-To value
fn first_message_ref(value: &str) -> Option<String> {
    let start = value.find('<')?;
    let end = start + value[start..].find('>')?;
    Some(value[start..=end].to_string())
}

/// First inline text part, plain preferred over HTML
fn extract_body(parsed: &ParsedMail<'_>) -> Option<String> {
    let inline_text = |mime: &'static str| {
        parsed.parts().find_map(move |part| {
            if part.ctype.mimetype != mime
                || part.get_content_disposition().disposition == DispositionType::Attachment
            {
                return None;
            }
            part.get_body().ok()
        })
    };

    inline_text("text/plain").or_else(|| inline_text("text/html").map(|html| html_to_text(&html)))
}
