//! Command-line chat client.
//!
//! Every subcommand goes through the same facade a graphical client would
//! use, against a live chat server.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chat_sync::config::{AppConfig, ConfigArgs};
use chat_sync::model::{Message, MessageId, MessageStatus, RemoteId, ReportFile, SessionId};
use chat_sync::prefs::{FilePreferences, MemoryPreferences, PreferenceStore};
use chat_sync::remote::HttpBackend;
use chat_sync::sync::{LoadOutcome, SendOutcome};
use chat_sync::upload::UploadOutcome;
use chat_sync::{ChatContext, InteractionFacade};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List sessions, most recent first
    Sessions,
    /// Create a session
    New,
    /// Print the messages of a session
    Show { session: String },
    /// Send a message and print the reply
    Send { session: String, text: Vec<String> },
    /// Rename a session
    Rename { session: String, title: Vec<String> },
    /// Delete a session
    Delete {
        session: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Regenerate an assistant message
    Regenerate { session: String, message: String },
    /// Upload a PDF or DOCX report, into a new session unless one is given
    Upload {
        path: PathBuf,
        #[arg(long)]
        session: Option<String>,
    },
    /// Copy a message to the clipboard
    Copy { session: String, message: String },
    /// Toggle the persisted sidebar state
    ToggleSidebar,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    // Initialize tracing (M-LOG-STRUCTURED)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        name: "client.config.loaded",
        base_url = %config.backend.base_url,
        authenticated = config.backend.token.is_some(),
        "Configuration loaded"
    );

    let backend = HttpBackend::new(config.backend.settings())?.with_unauthorized_hook(|| {
        eprintln!("Not signed in or token expired; obtain a new token and retry.");
    });
    let prefs: Arc<dyn PreferenceStore> = match &config.preferences.path {
        Some(path) => Arc::new(FilePreferences::new(path)),
        None => Arc::new(MemoryPreferences::new()),
    };
    let facade = InteractionFacade::new(
        Arc::new(backend),
        ChatContext::new(prefs),
        config.chat.clone(),
    );

    if let LoadOutcome::Failed(e) = facade.bootstrap().await {
        bail!("could not load sessions: {e}");
    }

    run(&facade, cli.command).await
}

async fn run(facade: &InteractionFacade, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Sessions => {
            if let Some(user) = facade.context().user() {
                println!("Signed in as {}", user.full_name.as_deref().unwrap_or(&user.username));
            }
            for session in facade.sessions() {
                println!(
                    "{:>6}  {}  {}",
                    session.id,
                    session.updated_at.format("%Y-%m-%d %H:%M"),
                    session.title
                );
            }
        }
        Command::New => {
            let session = facade.create_session().await?;
            println!("Created session {} ({})", session.id, session.title);
        }
        Command::Show { session } => {
            open(facade, &session).await?;
            print_messages(&facade.messages());
        }
        Command::Send { session, text } => {
            open(facade, &session).await?;
            match facade.send_message(&text.join(" ")).await? {
                SendOutcome::Replied(reply) => println!("{}", reply.content),
                SendOutcome::Failed(e) => bail!("message not answered: {e}"),
            }
        }
        Command::Rename { session, title } => {
            let id = SessionId::from(session.as_str());
            if let Some(renamed) = facade.rename_session(&id, title.join(" ")).await? {
                println!("Renamed session {} to {}", renamed.id, renamed.title);
            }
        }
        Command::Delete { session, yes } => {
            let target = facade.request_delete(&SessionId::from(session.as_str()))?;
            if !yes {
                facade.cancel_delete();
                bail!("refusing to delete \"{}\" without --yes", target.title);
            }
            facade.delete_session().await?;
            println!("Deleted session {} ({})", target.id, target.title);
        }
        Command::Regenerate { session, message } => {
            open(facade, &session).await?;
            let id = MessageId::Remote(RemoteId::from(message.as_str()));
            match facade.regenerate_message(&id).await? {
                Some(reply) => println!("{}", reply.content),
                None => bail!("message {message} not found in session {session}"),
            }
        }
        Command::Upload { path, session } => {
            if let Some(session) = session {
                open(facade, &session).await?;
            } else {
                facade.clear_selection();
            }
            let file = ReportFile::from_path(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            match facade.upload_report(&file).await? {
                UploadOutcome::Uploaded {
                    session_id,
                    created_session,
                    ..
                } => {
                    if created_session {
                        println!("Created session {session_id}");
                    }
                    print_messages(&facade.messages());
                }
                UploadOutcome::Failed(e) => bail!("upload failed: {e}"),
            }
        }
        Command::Copy { session, message } => {
            open(facade, &session).await?;
            let id = MessageId::Remote(RemoteId::from(message.as_str()));
            let method = facade.copy_message(&id).await?;
            info!(name: "client.copied", method = ?method, "Message copied");
        }
        Command::ToggleSidebar => {
            let collapsed = facade.toggle_sidebar().await;
            println!("Sidebar {}", if collapsed { "collapsed" } else { "expanded" });
        }
    }
    Ok(())
}

async fn open(facade: &InteractionFacade, session: &str) -> anyhow::Result<()> {
    let id = SessionId::from(session);
    match facade.select_session(&id).await? {
        LoadOutcome::Failed(e) => bail!("could not load session {session}: {e}"),
        _ => Ok(()),
    }
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        let marker = match message.status {
            MessageStatus::Failed => " (not delivered)",
            MessageStatus::Pending => " (sending)",
            MessageStatus::Confirmed | MessageStatus::Notice => "",
        };
        println!("[{}] {}{}:", message.id, message.role, marker);
        println!("{}\n", message.content);
    }
}
