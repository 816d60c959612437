//! `lostfound`: command-line client for the campus lost-and-found chat.
//!
//! Drives the client core against a live backend. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/lostfound/config.toml`).
//!
//! ```bash
//! # Sync the signed-in identity with the backend
//! lostfound --api-base https://lostfound.example.edu --token "$TOKEN" \
//!     --user-id user_123 --email an.nguyen@hcmut.edu.vn whoami
//!
//! # List conversations mentioning a backpack
//! LOSTFOUND_API_BASE=https://lostfound.example.edu LOSTFOUND_TOKEN=... \
//!     lostfound chats --filter balo
//!
//! # Follow a conversation; each stdin line is sent as a message
//! lostfound open c_42
//! ```

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use lostfound::api::http::HttpBackend;
use lostfound::auth::StaticTokenProvider;
use lostfound::chat::EngineEvent;
use lostfound::config::{CliArgs, ClientConfig, Command};
use lostfound::display::{chat_preview, chat_title, format_time, item_label, sender_label};
use lostfound::session::ChatSession;
use lostfound::sync::{IdentitySync, SyncOutcome};
use lostfound_proto::model::{ChatId, ItemId};

type Session = ChatSession<HttpBackend, StaticTokenProvider>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("lostfound starting");

    let Some(command) = cli.command.clone() else {
        eprintln!("no command given, see --help");
        return ExitCode::FAILURE;
    };

    let result = run(command, &config).await;
    tracing::info!("lostfound exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so they never interleave with conversation output.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("lostfound.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &ClientConfig) -> io::Result<()> {
    let base_url = config.api_base_url.as_deref().ok_or_else(|| {
        io::Error::other("no backend configured: pass --api-base or set [api] base_url")
    })?;
    let backend = Arc::new(
        HttpBackend::new(base_url, config.request_timeout).map_err(io::Error::other)?,
    );
    let tokens = Arc::new(
        config
            .token
            .clone()
            .map_or_else(StaticTokenProvider::signed_out, StaticTokenProvider::new),
    );

    match command {
        Command::Whoami => whoami(config, backend, tokens).await,
        Command::Profile => {
            let (session, _events) = ChatSession::new(backend, tokens, config.engine_config());
            let profile = session
                .profile()
                .await
                .ok_or_else(|| io::Error::other("could not load profile (see log)"))?;
            println!("{}", profile.full_name);
            if let Some(avatar) = profile.avatar_url {
                println!("{avatar}");
            }
            Ok(())
        }
        Command::Chats { filter } => {
            let (session, _events) = ChatSession::new(backend, tokens, config.engine_config());
            session.refresh().await;
            session.set_search(filter.unwrap_or_default());
            let now = chrono::Local::now();
            for chat in session.visible_chats() {
                let when = chat
                    .last_message
                    .as_ref()
                    .map_or_else(String::new, |m| format_time(&m.created_at, &now));
                println!(
                    "{}\t{} ({})\t{}\t{}",
                    chat.id,
                    chat_title(&chat),
                    item_label(&chat),
                    chat_preview(&chat),
                    when
                );
            }
            Ok(())
        }
        Command::Open { chat_id } => {
            let (session, events) = ChatSession::new(backend, tokens, config.engine_config());
            session.open_on_load(ChatId::new(chat_id.as_str()));
            session.focus().await;
            if session.selected().is_none() {
                return Err(io::Error::other(format!("conversation {chat_id} not found")));
            }
            follow(&session, events).await
        }
        Command::Start { item_id } => {
            let (session, events) = ChatSession::new(backend, tokens, config.engine_config());
            session
                .open_item_chat(&ItemId::new(item_id.as_str()))
                .await
                .ok_or_else(|| io::Error::other("could not start conversation (see log)"))?;
            follow(&session, events).await
        }
    }
}

async fn whoami(
    config: &ClientConfig,
    backend: Arc<HttpBackend>,
    tokens: Arc<StaticTokenProvider>,
) -> io::Result<()> {
    let identity = config.identity();
    let sync = IdentitySync::new(backend, Arc::clone(&tokens), config.domain_policy());
    match sync.on_identity(identity.as_ref()).await {
        SyncOutcome::Synced | SyncOutcome::AlreadySynced => {
            if let Some(identity) = identity {
                println!("{} <{}>", identity.id, identity.email);
            }
            Ok(())
        }
        SyncOutcome::Rejected => {
            tokens.clear();
            Err(io::Error::other(
                "account is not from an allowed domain, signed out",
            ))
        }
        SyncOutcome::NoIdentity => Err(io::Error::other(
            "no identity configured: pass --user-id and --email",
        )),
        SyncOutcome::TokenUnavailable => Err(io::Error::other(
            "no token: pass --token or set LOSTFOUND_TOKEN",
        )),
        SyncOutcome::InFlight | SyncOutcome::Failed => {
            Err(io::Error::other("identity sync failed (see log)"))
        }
    }
}

/// Print the open conversation as it grows and send each stdin line.
async fn follow(session: &Session, mut events: mpsc::Receiver<EngineEvent>) -> io::Result<()> {
    let me = session.current_user().await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(EngineEvent::MessagesLoaded { .. } | EngineEvent::MessagesAppended { .. }) => {
                    let messages = session.messages();
                    let now = chrono::Local::now();
                    for message in messages.iter().skip(printed) {
                        println!(
                            "[{}] {}: {}",
                            format_time(&message.created_at, &now),
                            sender_label(message, me.as_ref()),
                            message.content
                        );
                    }
                    printed = messages.len();
                }
                Some(EngineEvent::ScrollToEnd { .. }) => {}
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    session.set_draft(line);
                    if session.can_send() {
                        if let Err(e) = session.send().await {
                            eprintln!("send failed: {e}");
                        }
                    }
                }
                None => break,
            },
        }
    }

    session.back();
    Ok(())
}
