//! Gmail API HTTP client
//!
//! Provides methods for listing and fetching messages from the Gmail API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use super::GmailAuth;
use super::api::{GmailMessage, ListLabelsResponse, ListMessagesResponse};
use crate::models::{LabelMap, MessageId};
use crate::provider::{
    MailProvider, MessagePage, ProviderConnector, ProviderError, Query, RawMessage,
};

/// Per-request timeout for Gmail API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a Gmail search query from time bounds (`after:<secs> before:<secs>`)
pub fn build_gmail_query(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Query {
    let mut terms = Vec::new();
    if let Some(after) = after {
        terms.push(format!("after:{}", after.timestamp()));
    }
    if let Some(before) = before {
        terms.push(format!("before:{}", before.timestamp()));
    }
    Query::new(terms.join(" "))
}

/// Gmail API session
///
/// Each session owns its own HTTP agent (connection pool); the OAuth token
/// is shared through [`GmailAuth`].
pub struct GmailClient {
    auth: Arc<GmailAuth>,
    agent: ureq::Agent,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1/users/me";

    /// Create a new Gmail client
    pub fn new(auth: Arc<GmailAuth>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Self {
            auth,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn bearer(&self) -> Result<String, ProviderError> {
        let token = self
            .auth
            .get_access_token()
            .map_err(|e| ProviderError::Auth(format!("{:#}", e)))?;
        Ok(format!("Bearer {}", token))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let bearer = self.bearer()?;
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", &bearer)
            .call()
            .map_err(|e| map_ureq_error(e, url))?;

        response.body_mut().read_json().map_err(|e| match e {
            ureq::Error::Json(e) => ProviderError::Parse(e.to_string()),
            other => map_ureq_error(other, url),
        })
    }
}

impl MailProvider for GmailClient {
    fn authenticate(&mut self) -> Result<(), ProviderError> {
        self.bearer().map(|_| ())
    }

    fn list_labels(&mut self) -> Result<LabelMap, ProviderError> {
        let url = format!("{}/labels", Self::BASE_URL);
        let response: ListLabelsResponse = self.get_json(&url)?;
        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|label| (label.id, label.name))
            .collect())
    }

    fn get_message(&mut self, id: &MessageId) -> Result<RawMessage, ProviderError> {
        let url = format!(
            "{}/messages/{}?format=full",
            Self::BASE_URL,
            urlencoding::encode(id.as_str())
        );
        let message: GmailMessage = self.get_json(&url).map_err(|e| match e {
            ProviderError::Status { code: 404, .. } => ProviderError::NotFound(id.to_string()),
            other => other,
        })?;
        Ok(RawMessage::Gmail(message))
    }

    fn list_messages(
        &mut self,
        query: &Query,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessagePage, ProviderError> {
        let mut url = format!(
            "{}/messages?maxResults={}",
            Self::BASE_URL,
            page_size.clamp(1, 500)
        );
        if !query.is_empty() {
            url.push_str(&format!("&q={}", urlencoding::encode(query.as_str())));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response: ListMessagesResponse = self.get_json(&url)?;
        let ids: Vec<MessageId> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageId::new(m.id))
            .collect();
        debug!(
            "Listed {} message IDs for query '{}' (estimate: {:?})",
            ids.len(),
            query,
            response.result_size_estimate
        );

        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    fn build_query(&self, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Query {
        build_gmail_query(after, before)
    }
}

/// Classify a ureq failure
fn map_ureq_error(err: ureq::Error, url: &str) -> ProviderError {
    match err {
        ureq::Error::StatusCode(code) => ProviderError::Status {
            code,
            message: format!("GET {}", url),
        },
        ureq::Error::Timeout(_) => ProviderError::Timeout,
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => ProviderError::Timeout,
        ureq::Error::BadUri(uri) => ProviderError::Parse(format!("bad URI: {}", uri)),
        other => ProviderError::Connection(other.to_string()),
    }
}

/// Opens Gmail sessions sharing one OAuth token
pub struct GmailConnector {
    auth: Arc<GmailAuth>,
}

impl GmailConnector {
    pub fn new(auth: GmailAuth) -> Self {
        Self {
            auth: Arc::new(auth),
        }
    }
}

impl ProviderConnector for GmailConnector {
    fn connect(&self) -> Result<Box<dyn MailProvider>, ProviderError> {
        let mut client = GmailClient::new(Arc::clone(&self.auth));
        client.authenticate()?;
        Ok(Box::new(client))
    }

    fn name(&self) -> &str {
        "gmail"
    }
}
