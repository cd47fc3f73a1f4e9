//! IMAP provider
//!
//! Folders play the role of labels and the `Message-ID` header is the
//! message ID. Listing walks every selectable folder in name order; the page
//! token records `<folder index>:<offset>` into the folder's sorted UID list.

use std::net::TcpStream;

use ::imap::Session;
use ::imap::types::NameAttribute;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use mailparse::MailHeaderMap;
use native_tls::{TlsConnector, TlsStream};

use crate::config::ImapSettings;
use crate::models::{LabelMap, MessageId};
use crate::provider::{
    MailProvider, MessagePage, ProviderConnector, ProviderError, Query, RawMessage,
};

type TlsSession = Session<TlsStream<TcpStream>>;

/// Date format IMAP SEARCH expects (`01-Jan-2024`)
const IMAP_DATE_FORMAT: &str = "%d-%b-%Y";

/// Build an IMAP SEARCH criteria string from time bounds
///
/// IMAP dates have one-day granularity, so the window is widened to whole
/// days; re-fetching a few messages is harmless.
pub fn build_imap_query(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Query {
    let mut terms = Vec::new();
    if let Some(after) = after {
        terms.push(format!("SINCE {}", after.format(IMAP_DATE_FORMAT)));
    }
    if let Some(before) = before {
        terms.push(format!("BEFORE {}", before.format(IMAP_DATE_FORMAT)));
    }
    if terms.is_empty() {
        terms.push("ALL".to_string());
    }
    Query::new(terms.join(" "))
}

/// Position in a multi-folder listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub folder: usize,
    pub offset: usize,
}

impl PageCursor {
    pub fn parse(token: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::Parse(format!("invalid IMAP page token '{}'", token));
        let (folder, offset) = token.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            folder: folder.parse().map_err(|_| invalid())?,
            offset: offset.parse().map_err(|_| invalid())?,
        })
    }

    pub fn token(&self) -> String {
        format!("{}:{}", self.folder, self.offset)
    }
}

fn map_imap_error(err: ::imap::Error) -> ProviderError {
    match err {
        ::imap::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => ProviderError::Timeout,
        ::imap::Error::Io(e) => ProviderError::Connection(e.to_string()),
        ::imap::Error::ConnectionLost => ProviderError::Connection("connection lost".to_string()),
        ::imap::Error::Tls(e) => ProviderError::Connection(e.to_string()),
        ::imap::Error::TlsHandshake(e) => ProviderError::Connection(e.to_string()),
        ::imap::Error::Parse(e) => ProviderError::Parse(e.to_string()),
        other => ProviderError::Imap(other.to_string()),
    }
}

/// A folder deleted between LIST and EXAMINE gets a NO response
///
/// Any other failure means the listing cannot be trusted to be complete.
fn is_missing_folder(err: &::imap::Error) -> bool {
    matches!(err, ::imap::Error::No(_))
}

/// Quote a string for use inside a SEARCH criteria
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One logged-in IMAP session
pub struct ImapProvider {
    session: TlsSession,
    folders: Option<Vec<String>>,
}

impl ImapProvider {
    fn new(session: TlsSession) -> Self {
        Self {
            session,
            folders: None,
        }
    }

    /// Selectable folder names, sorted; listed once per session
    fn folders(&mut self) -> Result<Vec<String>, ProviderError> {
        if let Some(folders) = &self.folders {
            return Ok(folders.clone());
        }

        let names = self
            .session
            .list(None, Some("*"))
            .map_err(map_imap_error)?;
        let mut folders: Vec<String> = names
            .iter()
            .filter(|name| {
                !name
                    .attributes()
                    .iter()
                    .any(|attr| matches!(attr, NameAttribute::NoSelect))
            })
            .map(|name| name.name().to_string())
            .collect();
        folders.sort();
        folders.dedup();

        self.folders = Some(folders.clone());
        Ok(folders)
    }

    fn select(&mut self, folder: &str) -> Result<(), ProviderError> {
        self.session
            .examine(folder)
            .map(|_| ())
            .map_err(map_imap_error)
    }

    /// Message-ID header values for the given UIDs, in UID order
    fn message_ids_for(&mut self, uids: &[u32]) -> Result<Vec<MessageId>, ProviderError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let fetches = self
            .session
            .uid_fetch(&uid_set, "(UID RFC822.HEADER)")
            .map_err(map_imap_error)?;

        let mut found: Vec<(u32, MessageId)> = fetches
            .iter()
            .filter_map(|fetch| {
                let uid = fetch.uid?;
                let header = fetch.header()?;
                let (headers, _) = mailparse::parse_headers(header).ok()?;
                match headers.get_first_value("Message-ID") {
                    Some(id) if !id.trim().is_empty() => Some((uid, MessageId::new(id.trim()))),
                    _ => {
                        debug!("UID {} has no Message-ID header, skipping", uid);
                        None
                    }
                }
            })
            .collect();
        found.sort_by_key(|(uid, _)| *uid);

        Ok(found.into_iter().map(|(_, id)| id).collect())
    }
}

impl MailProvider for ImapProvider {
    fn authenticate(&mut self) -> Result<(), ProviderError> {
        // Login happens in the connector; this only checks the session is alive
        self.session.noop().map_err(map_imap_error)
    }

    fn list_labels(&mut self) -> Result<LabelMap, ProviderError> {
        Ok(self
            .folders()?
            .into_iter()
            .map(|folder| (folder.clone(), folder))
            .collect())
    }

    fn get_message(&mut self, id: &MessageId) -> Result<RawMessage, ProviderError> {
        let criteria = format!("HEADER Message-ID {}", quote(id.as_str()));

        for folder in self.folders()? {
            self.select(&folder)?;
            let uids = self.session.uid_search(&criteria).map_err(map_imap_error)?;
            let Some(uid) = uids.into_iter().min() else {
                continue;
            };

            let fetches = self
                .session
                .uid_fetch(uid.to_string(), "(UID FLAGS BODY.PEEK[])")
                .map_err(map_imap_error)?;
            let fetch = fetches
                .iter()
                .find(|f| f.uid == Some(uid))
                .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
            let bytes = fetch
                .body()
                .ok_or_else(|| ProviderError::Parse(format!("no body returned for {}", id)))?
                .to_vec();
            let flags = fetch.flags().iter().map(|f| f.to_string()).collect();

            return Ok(RawMessage::Rfc822 {
                id: id.clone(),
                bytes,
                folder,
                flags,
            });
        }

        Err(ProviderError::NotFound(id.to_string()))
    }

    fn list_messages(
        &mut self,
        query: &Query,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessagePage, ProviderError> {
        let page_size = page_size.max(1);
        let mut cursor = page_token
            .map(PageCursor::parse)
            .transpose()?
            .unwrap_or_default();
        let folders = self.folders()?;
        let criteria = if query.is_empty() { "ALL" } else { query.as_str() };
        let mut ids = Vec::new();

        while cursor.folder < folders.len() && ids.len() < page_size {
            let folder = &folders[cursor.folder];
            match self.session.examine(folder) {
                Ok(_) => {}
                Err(e) if is_missing_folder(&e) => {
                    warn!("Skipping folder '{}': {}", folder, e);
                    cursor = PageCursor {
                        folder: cursor.folder + 1,
                        offset: 0,
                    };
                    continue;
                }
                Err(e) => return Err(map_imap_error(e)),
            }

            let mut uids: Vec<u32> = self
                .session
                .uid_search(criteria)
                .map_err(map_imap_error)?
                .into_iter()
                .collect();
            uids.sort_unstable();

            let batch: Vec<u32> = uids
                .iter()
                .skip(cursor.offset)
                .take(page_size - ids.len())
                .copied()
                .collect();
            cursor.offset += batch.len();
            ids.extend(self.message_ids_for(&batch)?);

            if cursor.offset < uids.len() {
                // Page filled mid-folder
                return Ok(MessagePage {
                    ids,
                    next_page_token: Some(cursor.token()),
                });
            }

            cursor = PageCursor {
                folder: cursor.folder + 1,
                offset: 0,
            };
        }

        let next_page_token = (cursor.folder < folders.len()).then(|| cursor.token());
        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    fn build_query(&self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Query {
        build_imap_query(after, before)
    }
}

impl Drop for ImapProvider {
    fn drop(&mut self) {
        if let Err(e) = self.session.logout() {
            debug!("IMAP logout failed: {}", e);
        }
    }
}

/// Opens IMAP-over-TLS sessions for one account
pub struct ImapConnector {
    settings: ImapSettings,
    password: String,
}

impl ImapConnector {
    pub fn new(settings: ImapSettings, password: String) -> Self {
        Self { settings, password }
    }

    /// The account address, used to recognise outgoing mail
    pub fn username(&self) -> &str {
        &self.settings.username
    }
}

impl ProviderConnector for ImapConnector {
    fn connect(&self) -> Result<Box<dyn MailProvider>, ProviderError> {
        let server = self.settings.server.as_str();
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        let client = ::imap::connect((server, self.settings.port), server, &tls)
            .map_err(map_imap_error)?;
        let session = client
            .login(&self.settings.username, &self.password)
            .map_err(|(e, _client)| ProviderError::Auth(e.to_string()))?;

        debug!("IMAP session opened for {}", self.settings.username);
        Ok(Box::new(ImapProvider::new(session)))
    }

    fn name(&self) -> &str {
        "imap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_query_with_bounds() {
        let after = Utc.with_ymd_and_hms(2024, 3, 5, 13, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(
            build_imap_query(Some(after), None).as_str(),
            "SINCE 05-Mar-2024"
        );
        assert_eq!(
            build_imap_query(Some(after), Some(before)).as_str(),
            "SINCE 05-Mar-2024 BEFORE 01-Apr-2024"
        );
    }

    #[test]
    fn test_build_query_unbounded_matches_all() {
        assert_eq!(build_imap_query(None, None).as_str(), "ALL");
    }

    #[test]
    fn test_page_cursor_roundtrip() {
        let cursor = PageCursor::parse("2:500").unwrap();
        assert_eq!(cursor, PageCursor { folder: 2, offset: 500 });
        assert_eq!(cursor.token(), "2:500");
    }

    #[test]
    fn test_page_cursor_rejects_garbage() {
        assert!(matches!(
            PageCursor::parse("501"),
            Err(ProviderError::Parse(_))
        ));
        assert!(PageCursor::parse("a:b").is_err());
    }

    #[test]
    fn test_only_no_response_skips_a_folder() {
        assert!(is_missing_folder(&::imap::Error::No(
            "[NONEXISTENT] Unknown Mailbox".to_string()
        )));
        assert!(!is_missing_folder(&::imap::Error::ConnectionLost));
        assert!(!is_missing_folder(&::imap::Error::Bad(
            "command unknown".to_string()
        )));
        assert!(!is_missing_folder(&::imap::Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe"
        ))));
    }

    #[test]
    fn test_lost_connection_is_transient() {
        assert!(map_imap_error(::imap::Error::ConnectionLost).is_transient());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("<a\"b@x>"), "\"<a\\\"b@x>\"");
    }
}
