//! Command-line parsing

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use mailsync::{ClobberSet, MessageId, SyncMode};

pub const USAGE: &str = "\
Usage: mail-mirror <command> [options]

Commands:
  sync [--full-sync]                 Mirror new messages (or everything with --full-sync)
  sync-message --message-id <id>     Fetch a single message
  sync-deleted-messages              Mark messages deleted remotely

Options:
  --data-dir <path>                  Directory holding messages.db and tokens
  --provider <gmail|imap>            Mail provider (default: imap if configured, else gmail)
  --workers <n>                      Concurrent fetch workers
  --clobber <field>...               Content fields to overwrite on re-fetch
  -h, --help                         Show this help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gmail,
    Imap,
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gmail" => Ok(Self::Gmail),
            "imap" => Ok(Self::Imap),
            other => bail!("unknown provider '{}' (expected gmail or imap)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Sync { full: bool },
    SyncMessage { id: MessageId },
    SyncDeletedMessages,
    Help,
}

impl Command {
    pub fn mode(&self) -> Option<SyncMode> {
        match self {
            Command::Sync { full: true } => Some(SyncMode::Full),
            Command::Sync { full: false } => Some(SyncMode::Incremental),
            Command::SyncMessage { id } => Some(SyncMode::Single(id.clone())),
            Command::SyncDeletedMessages => Some(SyncMode::Deletions),
            Command::Help => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub command: Command,
    pub data_dir: Option<PathBuf>,
    pub provider: Option<ProviderKind>,
    pub workers: Option<usize>,
    pub clobber: ClobberSet,
}

/// Parse arguments, excluding the program name
pub fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();

    let command = match args.next().as_deref() {
        None | Some("-h") | Some("--help") => Command::Help,
        Some("sync") => Command::Sync { full: false },
        Some("sync-message") => Command::SyncMessage {
            id: MessageId::new(""),
        },
        Some("sync-deleted-messages") => Command::SyncDeletedMessages,
        Some(other) => bail!("unknown command '{}'\n\n{}", other, USAGE),
    };

    let mut parsed = Args {
        command,
        data_dir: None,
        provider: None,
        workers: None,
        clobber: ClobberSet::empty(),
    };
    let mut message_id: Option<MessageId> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.command = Command::Help,
            "--full-sync" => match &mut parsed.command {
                Command::Sync { full } => *full = true,
                _ => bail!("--full-sync only applies to the sync command"),
            },
            "--message-id" => message_id = Some(MessageId::new(value(&mut args, "--message-id")?)),
            "--data-dir" => parsed.data_dir = Some(PathBuf::from(value(&mut args, "--data-dir")?)),
            "--provider" => parsed.provider = Some(value(&mut args, "--provider")?.parse()?),
            "--workers" => {
                let raw = value(&mut args, "--workers")?;
                let workers: usize = raw
                    .parse()
                    .with_context(|| format!("invalid worker count '{}'", raw))?;
                if workers == 0 {
                    bail!("--workers must be at least 1");
                }
                parsed.workers = Some(workers);
            }
            "--clobber" => {
                let mut fields = Vec::new();
                while let Some(next) = args.next_if(|a| !a.starts_with('-')) {
                    fields.push(next);
                }
                if fields.is_empty() {
                    bail!("--clobber requires at least one field");
                }
                for field in ClobberSet::parse(&fields)?.iter() {
                    parsed.clobber = parsed.clobber.with(field);
                }
            }
            other => bail!("unexpected argument '{}'\n\n{}", other, USAGE),
        }
    }

    if let Command::SyncMessage { id } = &mut parsed.command {
        *id = message_id.ok_or_else(|| anyhow!("sync-message requires --message-id <id>"))?;
    } else if message_id.is_some() {
        bail!("--message-id only applies to the sync-message command");
    }

    Ok(parsed)
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}
