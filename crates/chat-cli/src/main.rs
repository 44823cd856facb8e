//! Terminal chat client.
//!
//! Run with: cargo run -p chat-cli -- --user alice --peer bob
//!
//! Configuration via .env file or environment variables:
//!   DEVNEXTDOOR_DATABASE_URL        - SQLite URL (default: sqlite:devnextdoor.db?mode=rwc)
//!   CHAT_DUPLICATE_QUERY_WINDOW_MS  - Store-side duplicate look-back (default: 3000)
//!   CHAT_DUPLICATE_MATCH_WINDOW_MS  - Store-side duplicate match window (default: 2000)
//!   CHAT_SEND_THROTTLE_MS           - Client-side repeat throttle (default: 2000)
//!   RUST_LOG                        - Log filter (default: info)
//!
//! Lines typed on stdin are sent to the peer. `/read` marks the peer's
//! messages as read, `/quit` leaves.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chat_core::{ChatConfig, ChatSession, ConversationListProvider, Message, SendReport, SessionObserver};
use chat_store::{Conversation, SqliteBackend};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "devnextdoor-chat")]
#[command(about = "Chat with another developer from the terminal")]
struct Args {
    /// SQLite database URL
    #[arg(long, env = "DEVNEXTDOOR_DATABASE_URL", default_value = "sqlite:devnextdoor.db?mode=rwc")]
    database: String,

    /// Logged-in username
    #[arg(long)]
    user: String,

    /// Username to chat with
    #[arg(long)]
    peer: Option<String>,

    /// Print the user's conversations before chatting
    #[arg(long)]
    list: bool,
}

/// What the terminal has already shown of the open conversation.
#[derive(Debug, Default)]
struct FeedView {
    printed: HashSet<String>,
    read: HashSet<String>,
}

impl FeedView {
    /// Lines to print for a full feed delivery: messages not shown yet, and
    /// a receipt for each of `me`'s messages that became read since.
    fn render(&mut self, me: &str, messages: &[Message]) -> Vec<String> {
        let mut lines = Vec::new();
        for message in messages {
            let receipt = message.sender_id == me && message.read;
            if self.printed.insert(message.id.clone()) {
                let marker = if receipt { " ✓" } else { "" };
                lines.push(format!(
                    "[{}] {}: {}{}",
                    format_time(message.sent_at),
                    message.sender_id,
                    message.content,
                    marker
                ));
                if receipt {
                    self.read.insert(message.id.clone());
                }
            } else if receipt && self.read.insert(message.id.clone()) {
                lines.push(format!("  ✓ read: {}", message.content));
            }
        }
        lines
    }
}

/// Prints feed changes and surfaced send failures.
#[derive(Debug)]
struct TerminalObserver {
    me: String,
    view: Mutex<FeedView>,
}

impl TerminalObserver {
    fn new(me: &str) -> Self {
        Self {
            me: me.to_string(),
            view: Mutex::new(FeedView::default()),
        }
    }
}

impl SessionObserver for TerminalObserver {
    fn on_messages_updated(&self, messages: &[Message]) {
        let lines = match self.view.lock() {
            Ok(mut view) => view.render(&self.me, messages),
            Err(poisoned) => poisoned.into_inner().render(&self.me, messages),
        };
        for line in lines {
            println!("{}", line);
        }
    }

    fn on_send_result(&self, report: &SendReport) {
        if report.should_surface() {
            eprintln!("! message not sent ({:?})", report.error);
        }
    }
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_conversations(me: &str, conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for conversation in conversations {
        let other = conversation.other_participant(me).unwrap_or("?");
        if conversation.has_messages() {
            println!(
                "{:<20} [{}] {}: {}",
                other,
                format_time(conversation.last_message_at),
                conversation.last_message_sender,
                conversation.last_message_text
            );
        } else {
            println!("{:<20} (no messages)", other);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ChatConfig::from_env()?;
    let backend = Arc::new(SqliteBackend::open(&args.database).await?);

    if args.list || args.peer.is_none() {
        let provider = ConversationListProvider::new(Arc::clone(&backend));
        let conversations = provider.list_for_user(&args.user).await?;
        print_conversations(&args.user, &conversations);
    }

    let Some(peer) = args.peer else {
        return Ok(());
    };

    let observer = Arc::new(TerminalObserver::new(&args.user));
    let session = ChatSession::with_config(args.user.as_str(), Arc::clone(&backend), observer, config)?;
    let conversation = session.open(&peer).await?;
    info!(conversation_id = %conversation.id, "Chatting with {}", peer);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/read" => {
                let changed = session.mark_read().await?;
                println!("marked {} message(s) read", changed);
            }
            // Failures are already reported through the observer.
            _ => {
                let _ = session.send(&line).await;
            }
        }
    }

    session.close().await;
    backend.database().close().await;
    Ok(())
}
