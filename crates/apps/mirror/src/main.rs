//! mail-mirror - mirror a Gmail or IMAP mailbox into a local SQLite database
//!
//! This is the command-line entry point for the sync engine.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use mailsync::{
    CancellationToken, Completion, GmailAuth, GmailConnector, GmailCredentials, ImapConnector,
    MirrorConfig, ProviderConnector, SqliteMailStore, StandardDecoder, SyncEngine,
    SyncOptions,
};

mod cli;

use cli::{Args, ProviderKind};

/// Exit status after an interrupted run, as a shell reports SIGINT
const INTERRUPTED_EXIT: u8 = 130;

fn main() -> Result<ExitCode> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = cli::parse_args(std::env::args().skip(1))?;
    let Some(mode) = args.command.mode() else {
        println!("{}", cli::USAGE);
        return Ok(ExitCode::SUCCESS);
    };

    let mirror = MirrorConfig::load().context("Failed to load mirror config")?;
    let data_dir = resolve_data_dir(&args)?;
    info!("Using data directory {}", data_dir.display());

    let store = SqliteMailStore::new(data_dir.join(mailsync::DATABASE_FILE))
        .context("Failed to open message store")?;

    let mut options = SyncOptions::from(&mirror.sync).with_clobber(args.clobber);
    if let Some(workers) = args.workers {
        options = options.with_workers(workers);
    }

    let (connector, decoder) = build_provider(&args, &mirror, &data_dir)?;

    let token = CancellationToken::new();
    install_interrupt_handler(token.clone())?;

    let engine = SyncEngine::new(connector.as_ref(), &store, &decoder, options);
    let report = engine.run(mode, &token).context("Sync failed")?;

    if report.failed > 0 {
        warn!(
            "{} messages failed to sync: {}",
            report.failed,
            report
                .failed_ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(match report.completion {
        Completion::Clean => ExitCode::SUCCESS,
        Completion::Cancelled => ExitCode::from(INTERRUPTED_EXIT),
    })
}

/// `--data-dir`, else the config directory
fn resolve_data_dir(args: &Args) -> Result<PathBuf> {
    match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
            Ok(dir.clone())
        }
        None => config::init(),
    }
}

fn build_provider(
    args: &Args,
    mirror: &MirrorConfig,
    data_dir: &Path,
) -> Result<(Box<dyn ProviderConnector>, StandardDecoder)> {
    let kind = args.provider.unwrap_or(if mirror.imap.is_some() {
        ProviderKind::Imap
    } else {
        ProviderKind::Gmail
    });

    match kind {
        ProviderKind::Gmail => {
            let credentials = match GmailCredentials::load() {
                Ok(credentials) => credentials,
                Err(e) => {
                    if let Some(path) = config::config_path("google-credentials.json") {
                        warn!(
                            "To configure Gmail access, either:\n\
                             1. Place your Google OAuth credentials at: {}\n\
                             2. Or set GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
                            path.display()
                        );
                    }
                    return Err(e.context("Gmail credentials not found"));
                }
            };
            let auth = GmailAuth::new(credentials, data_dir);
            Ok((Box::new(GmailConnector::new(auth)), StandardDecoder::new()))
        }
        ProviderKind::Imap => {
            let Some(settings) = mirror.imap.clone() else {
                bail!(
                    "No IMAP account configured; add an \"imap\" section to {}",
                    mailsync::config::MIRROR_CONFIG_FILE
                );
            };
            let password = settings.resolve_password()?;
            let connector = ImapConnector::new(settings, password);
            let decoder = StandardDecoder::with_self_address(connector.username());
            Ok((Box::new(connector), decoder))
        }
    }
}

/// First Ctrl-C cancels the run, a second one exits immediately
fn install_interrupt_handler(token: CancellationToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;

    std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        return;
                    }
                    if token.is_cancelled() {
                        warn!("Interrupted again, exiting immediately");
                        std::process::exit(i32::from(INTERRUPTED_EXIT));
                    }
                    warn!("Interrupted, finishing in-flight messages (Ctrl-C again to exit now)");
                    token.cancel();
                }
            })
        })
        .context("Failed to spawn interrupt handler")?;

    Ok(())
}

