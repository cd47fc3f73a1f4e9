//! Configuration loading for the mirror
//!
//! Two files live in the config directory (`~/.config/mail-mirror/`):
//! - `mirror.json` with sync tuning and IMAP account settings
//! - `google-credentials.json` with Gmail OAuth client credentials
//!
//! Every `mirror.json` key is optional. Secrets may also come from the
//! environment.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Sync settings filename in the config directory
pub const MIRROR_CONFIG_FILE: &str = "mirror.json";

/// Credentials filename in the config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Environment variable that overrides the configured IMAP password
const IMAP_PASSWORD_ENV: &str = "IMAP_PASSWORD";

/// Top-level `mirror.json` contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    #[serde(flatten)]
    pub sync: SyncSettings,
    pub imap: Option<ImapSettings>,
}

/// Tuning for one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Number of concurrent fetch workers
    pub workers: usize,
    /// Page size requested from the provider when listing IDs
    pub page_size: usize,
    /// Attempts per message, first try included
    pub max_attempts: u32,
    /// Fixed delay between attempts on a transient error
    pub retry_delay_secs: u64,
    /// Log fetch progress every N completed messages
    pub progress_interval: usize,
    /// Log listing progress every N collected IDs
    pub collection_log_interval: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            page_size: 500,
            max_attempts: 3,
            retry_delay_secs: 5,
            progress_interval: 50,
            collection_log_interval: 100,
        }
    }
}

impl SyncSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// IMAP account settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapSettings {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_imap_port() -> u16 {
    993
}

impl ImapSettings {
    /// Password from `IMAP_PASSWORD`, else from the config file
    pub fn resolve_password(&self) -> Result<String> {
        if let Ok(password) = std::env::var(IMAP_PASSWORD_ENV)
            && !password.is_empty()
        {
            return Ok(password);
        }
        self.password
            .clone()
            .with_context(|| format!("No IMAP password configured (set {})", IMAP_PASSWORD_ENV))
    }
}

impl MirrorConfig {
    /// Load `mirror.json` from the config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        config::load_json_or_default(MIRROR_CONFIG_FILE)
    }

    /// Parse a config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse mirror config JSON")
    }
}

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format (installed app)
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials from `google-credentials.json` in the config
    /// directory, falling back to `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET`
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }
}
