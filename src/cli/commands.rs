use crate::config::{Config, load_config};
use crate::feed::ChangeFeed;
use crate::identity::{Hs256TokenService, Identity, TokenService, resolve_identity};
use crate::session::SessionContext;
use crate::store::{MessageStoreClient, SendOutcome};
use crate::sync::{InboxState, InboxSyncService, ViewState};
use crate::thread::{build_thread, latest_per_correspondent};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "atelier-messaging")]
#[command(about = "Atelier direct messaging", version)]
pub struct Cli {
    /// Alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in: mint a session token and persist the session
    Login {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
    },
    /// Clear the persisted session
    Logout,
    /// One-shot inbox listing: latest message per correspondent
    Inbox,
    /// One-shot conversation view, oldest first
    Thread { partner: String },
    /// Send a message to a partner (defaults to the selected conversation)
    Send {
        #[arg(long)]
        to: Option<String>,
        message: String,
    },
    /// Run the sync loop and stream inbox updates until Ctrl-C
    Watch,
    /// Show session status
    Status,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Login { user_id, username } => cmd_login(&config, user_id, username).await,
        Commands::Logout => cmd_logout(),
        Commands::Inbox => cmd_inbox(&config).await,
        Commands::Thread { partner } => cmd_thread(&config, &partner).await,
        Commands::Send { to, message } => cmd_send(&config, to, &message).await,
        Commands::Watch => cmd_watch(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

fn token_service(config: &Config) -> Result<Hs256TokenService> {
    Ok(Hs256TokenService::new(
        &config.auth.token_secret,
        config.auth.token_ttl_secs,
    )?)
}

fn open_session() -> Result<SessionContext> {
    SessionContext::open(SessionContext::default_path()?)
}

/// Resolve the caller from the persisted session, recording the identity on
/// the context for the rest of the command.
async fn current_identity(config: &Config, session: &SessionContext) -> Result<Identity> {
    let tokens = token_service(config)?;
    let identity = resolve_identity(&tokens, session.token().as_deref())
        .await
        .context("not signed in; run `atelier-messaging login` first")?;
    session.set_identity(identity.clone());
    Ok(identity)
}

async fn cmd_login(config: &Config, user_id: String, username: String) -> Result<()> {
    let tokens = token_service(config)?;
    let identity = Identity { user_id, username };
    let token = tokens.issue(&identity).await?;
    let session = open_session()?;
    session.login(token, identity.clone())?;
    println!("Signed in as {} ({})", identity.username, identity.user_id);
    Ok(())
}

fn cmd_logout() -> Result<()> {
    let session = open_session()?;
    session.clear()?;
    println!("Signed out");
    Ok(())
}

async fn cmd_inbox(config: &Config) -> Result<()> {
    let session = open_session()?;
    let identity = current_identity(config, &session).await?;
    let client = MessageStoreClient::new(&config.backend);

    let result = client.fetch_all(&identity).await?;
    let mut entries = latest_per_correspondent(&result.messages, &identity.user_id);
    entries.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

    if entries.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {} [{}]: {}",
            entry.sent_at.format("%Y-%m-%d %H:%M"),
            entry.sender_name,
            entry.sender_id,
            entry.body
        );
    }
    Ok(())
}

async fn cmd_thread(config: &Config, partner: &str) -> Result<()> {
    let session = open_session()?;
    let identity = current_identity(config, &session).await?;
    session.select_partner(partner)?;
    let client = MessageStoreClient::new(&config.backend);

    let result = client.fetch_all(&identity).await?;
    let thread = build_thread(&result.messages, &identity.user_id, partner);

    if thread.is_empty() {
        println!("No messages with {} yet.", partner);
        return Ok(());
    }
    for msg in thread {
        let who = if msg.sender_id == identity.user_id {
            "me"
        } else {
            msg.sender_name.as_str()
        };
        println!("{}  {}: {}", msg.sent_at.format("%H:%M"), who, msg.body);
    }
    Ok(())
}

async fn cmd_send(config: &Config, to: Option<String>, message: &str) -> Result<()> {
    let session = open_session()?;
    let identity = current_identity(config, &session).await?;

    let partner = match to {
        Some(partner) => {
            session.select_partner(&partner)?;
            partner
        }
        None => match session.partner_id() {
            Some(partner) => partner,
            None => bail!("no conversation selected; pass --to <user-id>"),
        },
    };

    let client = MessageStoreClient::new(&config.backend);
    match client
        .send(&identity, &partner, &identity.username, message)
        .await?
    {
        SendOutcome::Sent(thread) => {
            println!("Sent. Conversation now has {} messages.", thread.len());
        }
        SendOutcome::Skipped => {
            println!("Nothing to send.");
        }
    }
    Ok(())
}

async fn cmd_watch(config: &Config) -> Result<()> {
    let session = Arc::new(open_session()?);
    let tokens: Arc<dyn TokenService> = Arc::new(token_service(config)?);
    let client = Arc::new(MessageStoreClient::new(&config.backend));
    let feed = Arc::new(ChangeFeed::new(&config.backend));

    let service = InboxSyncService::new(
        client,
        feed,
        session.clone(),
        tokens,
        Duration::from_secs(config.sync.poll_interval_secs),
        config.sync.feed_enabled,
    );
    let mut rx = service.subscribe_state();
    service.start().await?;

    println!("Watching inbox (Ctrl-C to stop)...");
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow().clone();
                if let Some(identity) = session.identity() {
                    print_snapshot(&state, &identity.user_id);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    service.stop().await;
    Ok(())
}

fn print_snapshot(state: &InboxState, user_id: &str) {
    match &state.view {
        ViewState::Unauthenticated => println!("-- signed out --"),
        ViewState::Loading => println!("-- loading --"),
        ViewState::Ready | ViewState::ThreadOpen(_) => {
            let entries = latest_per_correspondent(&state.messages, user_id);
            println!(
                "-- {} conversations, {} messages --",
                entries.len(),
                state.messages.len()
            );
            if let Some(err) = &state.last_error {
                println!("   (refresh failing: {})", err);
            }
        }
    }
}

async fn cmd_status(config: &Config) -> Result<()> {
    let session = open_session()?;
    let Some(_token) = session.token() else {
        println!("Not signed in.");
        return Ok(());
    };
    match current_identity(config, &session).await {
        Ok(identity) => {
            println!("Signed in as {} ({})", identity.username, identity.user_id);
            if let Some(partner) = session.partner_id() {
                println!("Selected conversation: {}", partner);
            }
        }
        Err(_) => {
            println!("Session token present but expired or invalid; sign in again.");
        }
    }
    Ok(())
}
