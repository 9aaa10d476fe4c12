//! Command-line commands
//!
//! One-shot commands over the conversation buffer:
//!   history [--session ID] [--json]
//!   add --user TEXT [--ai TEXT] [--session ID]
//!   clear [--session ID]

use anyhow::{Context, bail};
use cm_core::{ChatTurn, ConversationBuffer, History, Message, MessageFormat};
use tracing::info;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Execute a command against the configured memory
    Command(Command),
    /// Show help
    Help,
    /// Show version
    Version,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    History { session: Option<String>, json: bool },
    Add {
        user: String,
        ai: Option<String>,
        session: Option<String>,
    },
    Clear { session: Option<String> },
}

/// Parse command line arguments (without the program name)
pub fn parse_args(args: &[String]) -> anyhow::Result<RunMode> {
    let mut iter = args.iter();
    let Some(first) = iter.next() else {
        return Ok(RunMode::Help);
    };

    let name = match first.as_str() {
        "--help" | "-h" | "help" => return Ok(RunMode::Help),
        "--version" | "-v" => return Ok(RunMode::Version),
        name => name,
    };

    let mut session = None;
    let mut json = false;
    let mut user = None;
    let mut ai = None;

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--session" | "-s" => session = Some(value_of(arg, iter.next())?),
            "--json" => json = true,
            "--user" | "-u" => user = Some(value_of(arg, iter.next())?),
            "--ai" | "-a" => ai = Some(value_of(arg, iter.next())?),
            "--help" | "-h" => return Ok(RunMode::Help),
            other => bail!("Unknown argument: {}", other),
        }
    }

    let command = match name {
        "history" => Command::History { session, json },
        "add" => Command::Add {
            user: user.context("add requires --user TEXT")?,
            ai,
            session,
        },
        "clear" => Command::Clear { session },
        other => bail!("Unknown command: {} (see --help)", other),
    };

    Ok(RunMode::Command(command))
}

fn value_of(flag: &str, value: Option<&String>) -> anyhow::Result<String> {
    value
        .cloned()
        .with_context(|| format!("{} requires a value", flag))
}

/// Print help message
pub fn print_help() {
    println!("cm-gateway - Chat memory gateway");
    println!();
    println!("Usage:");
    println!("  cm-gateway history [--session ID] [--json]       Show a session's history");
    println!("  cm-gateway add --user TEXT [--ai TEXT] [--session ID]");
    println!("                                                   Append one exchange");
    println!("  cm-gateway clear [--session ID]                  Delete a session's history");
    println!("  cm-gateway --help                                Show this help message");
    println!("  cm-gateway --version                             Show version");
    println!();
    println!("Environment Variables:");
    println!("  MEMORY_ENDPOINT              Connection string (mongodb://... or memory://...)");
    println!("  MEMORY_DATABASE              Database name (default: chat_memory)");
    println!("  MEMORY_COLLECTION            Collection name (default: chat_history)");
    println!("  MEMORY_SESSION_ID            Default session id (default: random UUID)");
    println!("  MEMORY_KEY                   History label (default: chat_history)");
    println!("  MEMORY_OPERATION_TIMEOUT_MS  Deadline per database operation");
    println!("  MEMORY_PROBE_TIMEOUT_MS      Liveness probe deadline (default: 2000)");
    println!("  MEMORY_CONNECT_RETRIES       Connection retries (default: 2)");
    println!("  MEMORY_RETRY_MIN_DELAY_MS    Minimum retry delay (default: 2000)");
    println!("  MEMORY_RETRY_MAX_DELAY_MS    Maximum retry delay (default: 5000)");
}

/// Execute a command and return what should be printed
pub async fn run_command(buffer: &ConversationBuffer, command: Command) -> anyhow::Result<String> {
    match command {
        Command::History { session, json } => {
            let format = if json {
                MessageFormat::Transport
            } else {
                MessageFormat::Rich
            };
            let history = buffer
                .get_messages(session.as_deref(), format, &[])
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read history: {}", e))?;

            if json {
                Ok(format!("{}\n", serde_json::to_string_pretty(&history)?))
            } else {
                Ok(render_history(buffer.memory_key(), history))
            }
        }
        Command::Add { user, ai, session } => {
            let mut turns = vec![ChatTurn::user(user)];
            turns.extend(ai.map(ChatTurn::api));

            buffer
                .add_messages(&turns, session.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to add messages: {}", e))?;

            let session = buffer.effective_session(session.as_deref());
            info!(session_id = session, count = turns.len(), "Stored exchange");
            Ok(format!("Stored {} message(s) in session {}\n", turns.len(), session))
        }
        Command::Clear { session } => {
            buffer
                .clear_messages(session.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to clear history: {}", e))?;

            let session = buffer.effective_session(session.as_deref());
            Ok(format!("Cleared session {}\n", session))
        }
    }
}

fn render_history(memory_key: &str, history: History) -> String {
    let messages: Vec<Message> = history.into_messages();
    if messages.is_empty() {
        return format!("{}: (empty)\n", memory_key);
    }

    let mut output = format!("{}:\n", memory_key);
    for message in &messages {
        output.push_str(&format!("[{}] {}\n", message.role(), message.content()));
    }
    output
}
