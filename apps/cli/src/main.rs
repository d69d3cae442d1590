use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use murmur_api::{ChatApi, HttpChatApi, Session, User};
use murmur_config::ClientConfig;
use murmur_sync::{SessionHandle, SessionSnapshot, Synchronizer, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Terminal client for the Murmur messaging service")]
#[command(version)]
struct Cli {
    /// Configuration file, overrides MURMUR_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer credential issued by the auth service
    #[arg(long, env = "MURMUR_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "MURMUR_USER_ID")]
    user_id: String,

    #[arg(long, env = "MURMUR_USER_NAME", default_value = "")]
    user_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session
    Chat,
    /// Print the conversation list and exit
    Conversations,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing()?;

    let cli = Cli::parse();
    let config =
        murmur_config::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    let name = if cli.user_name.is_empty() {
        cli.user_id.clone()
    } else {
        cli.user_name.clone()
    };
    let session = Arc::new(Session::with_user(User::new(
        cli.user_id.clone(),
        name,
        cli.token.clone(),
    )));
    let api = Arc::new(
        HttpChatApi::new(&config.server, session.clone())
            .context("failed to build message service client")?,
    );

    match cli.command {
        Commands::Conversations => list_conversations(api.as_ref(), &cli.user_id).await,
        Commands::Chat => chat(config, session, api).await,
    }
}

async fn list_conversations(api: &dyn ChatApi, user_id: &str) -> Result<()> {
    let conversations = api
        .fetch_conversations()
        .await
        .context("failed to fetch conversations")?;

    if conversations.is_empty() {
        println!("{}", "No conversations yet".dimmed());
    }
    for conversation in conversations {
        println!(
            "{}  {}",
            conversation.id.dimmed(),
            conversation.title_for(user_id).bold()
        );
    }
    Ok(())
}

async fn chat(config: ClientConfig, session: Arc<Session>, api: Arc<HttpChatApi>) -> Result<()> {
    let connector = Arc::new(
        WebSocketConnector::new(&config.server).context("invalid socket configuration")?,
    );
    let (handle, task) = Synchronizer::start(session, config, api, connector)
        .await
        .context("failed to start session")?;
    info!("connected; type /help for commands");

    let renderer = tokio::spawn(render(handle.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if !run_command(&handle, line.trim()).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await.ok();
    renderer.abort();
    task.await.context("synchronizer task failed")?;
    Ok(())
}

/// Returns `false` when the session should end
async fn run_command(handle: &SessionHandle, line: &str) -> bool {
    let (command, argument) = line
        .split_once(' ')
        .map_or((line, ""), |(command, argument)| (command, argument.trim()));

    let result = match command {
        "" => Ok(()),
        "/quit" => return false,
        "/help" => {
            println!("/chats  /open <id>  /search <name>  /start <user id>  /quit");
            Ok(())
        }
        "/chats" => {
            print_conversations(&handle.snapshot());
            Ok(())
        }
        "/open" => handle.select_conversation(argument).await.map(|_| ()),
        "/start" => handle.start_conversation(argument).await.map(|_| ()),
        "/search" => handle.search_users(argument).await.map(|users| {
            for user in users {
                println!("{}  {}", user.id.dimmed(), user.name);
            }
        }),
        _ => {
            if let Err(err) = handle.input_changed() {
                warn!(error = %err, "failed to report input");
            }
            handle.send_message(line).await.map(|_| ())
        }
    };

    if let Err(err) = result {
        eprintln!("{}", err.to_string().red());
    }
    true
}

fn print_conversations(snapshot: &SessionSnapshot) {
    for summary in &snapshot.conversations {
        let marker = if summary.active { ">" } else { " " };
        let presence = if summary.online {
            "online".green()
        } else {
            "offline".dimmed()
        };
        println!(
            "{marker} {}  {}  {presence}",
            summary.id.dimmed(),
            summary.title.bold()
        );
    }
}

async fn render(handle: SessionHandle) {
    let mut watch = handle.watch();
    let mut shown_conversation: Option<String> = None;
    let mut shown_messages = 0;
    let mut shown_typing: Option<String> = None;

    loop {
        let snapshot = watch.borrow_and_update().clone();

        if snapshot.active_conversation != shown_conversation {
            shown_conversation = snapshot.active_conversation.clone();
            shown_messages = 0;
            if let Some(summary) = snapshot.active_summary() {
                println!("{} {}", "==".dimmed(), summary.title.bold());
            }
        }

        if snapshot.messages.len() < shown_messages {
            shown_messages = 0;
        }
        for view in &snapshot.messages[shown_messages..] {
            let author = if view.own {
                "you".cyan()
            } else {
                view.message.sender.name.as_str().yellow()
            };
            println!("{author}: {}", view.message.text);
        }
        shown_messages = snapshot.messages.len();

        let typing = snapshot.typing_indicator();
        if typing != shown_typing {
            if let Some(line) = &typing {
                println!("{}", line.italic().dimmed());
            }
            shown_typing = typing;
        }

        if watch.changed().await.is_err() {
            break;
        }
    }
}
