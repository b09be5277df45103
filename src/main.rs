//! Chatline - Entry Point
//!
//! Commands:
//! - login: authenticate and join the chat
//! - register: create an account and join the chat
//! - check: ask whether a username/email/nickname is taken
//! - history: print recent messages

use anyhow::Context;
use chatline::{ChatApp, Config, DuplicateField, LoginForm, MessageFeed, RegisterForm, SessionEvent};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "chatline", version, about = "Terminal chat client")]
struct Cli {
    /// HTTP API base URL (overrides CHAT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// WebSocket endpoint prefix (overrides CHAT_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Read settings from this dotenv file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Log as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and join the chat
    Login {
        #[arg(short, long, env = "CHAT_USERNAME")]
        username: String,
        #[arg(short, long, env = "CHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and join the chat
    Register {
        #[arg(long)]
        email: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        nickname: String,
        #[arg(short, long, env = "CHAT_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Check whether a value is already taken
    Check {
        /// username, email or nickname
        #[arg(short, long)]
        field: DuplicateField,
        #[arg(short, long)]
        value: String,
    },
    /// Print recent messages
    History {
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.env_file {
        Some(path) => Config::from_env_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            dotenvy::dotenv().ok();
            Config::from_env()?
        }
    };
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url);
    }
    if let Some(url) = &cli.ws_url {
        config.ws_url = url.trim_end_matches('/').to_string();
    }

    init_logging(cli.log_json)?;
    info!("Chatline v{}", env!("CARGO_PKG_VERSION"));

    let mut app = ChatApp::new(config)?;

    match cli.command {
        Command::Login { username, password } => {
            let events = app.login(&LoginForm::new(username, password)).await?;
            chat_loop(&mut app, events).await?;
        }
        Command::Register {
            email,
            username,
            nickname,
            password,
            confirm_password,
        } => {
            let form = RegisterForm {
                email,
                username,
                nickname,
                password,
                confirm_password,
            };
            let events = app.register(&form).await?;
            chat_loop(&mut app, events).await?;
        }
        Command::Check { field, value } => {
            let taken = app.api().check_duplicate(field, &value).await?;
            if taken {
                println!("{} '{}' is already taken", field.as_str(), value);
            } else {
                println!("{} '{}' is available", field.as_str(), value);
            }
        }
        Command::History { limit } => {
            let mut feed = MessageFeed::new(limit.max(1) as usize);
            feed.seed_history(&app.api().recent_messages(limit).await?, None);
            for entry in feed.iter() {
                println!("{}", entry);
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so they never interleave with the chat feed on stdout
fn init_logging(json: bool) -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        })
        .unwrap_or(Level::WARN);

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

async fn chat_loop(app: &mut ChatApp, mut events: mpsc::Receiver<SessionEvent>) -> anyhow::Result<()> {
    if let Some(user) = app.user() {
        println!(
            "Logged in as {}. Type a message (max {} chars), /who, /status, /quit.",
            user.username,
            app.composer().max_chars()
        );
    }
    for entry in app.feed().iter() {
        println!("{}", entry);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_count = None;
    let mut live = true;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(app, &line) {
                    break;
                }
            }
            event = events.recv(), if live => {
                let Some(event) = event else { break };
                render_event(app, &event, &mut last_count);
                if event.is_terminal() {
                    if !awaits_dismissal(&event, app.session_expired()) {
                        break;
                    }
                    println!("* this account logged in elsewhere; /dismiss or /quit to leave");
                    live = false;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.logout().await;
    Ok(())
}

/// Returns false when the user asked to leave
fn handle_input(app: &mut ChatApp, line: &str) -> bool {
    match line.trim() {
        "" => {}
        "/quit" | "/exit" => return false,
        "/who" => println!("* {} users online", app.user_count()),
        "/status" => match app.snapshot() {
            Some(s) => println!(
                "* {:?}, {} online, ban {}s, reconnect attempt {}",
                s.status, s.user_count, s.ban_remaining, s.reconnect_attempt
            ),
            None => println!("* no session"),
        },
        "/dismiss" => {
            if app.session_expired() {
                app.dismiss_session_expired();
                return false;
            }
            println!("* nothing to dismiss");
        }
        _ => match app.submit(line) {
            Ok(()) => {}
            Err(e) => println!("! {}", e),
        },
    }
    true
}

/// A session that ended because it expired stays on screen until acknowledged
fn awaits_dismissal(event: &SessionEvent, session_expired: bool) -> bool {
    session_expired && *event == SessionEvent::Closed
}

fn render_event(app: &mut ChatApp, event: &SessionEvent, last_count: &mut Option<u64>) {
    if let Some(entry) = app.apply(event) {
        println!("{}", entry);
        return;
    }

    match event {
        SessionEvent::Connected => println!("* connected"),
        SessionEvent::Disconnected { reason, .. } => println!("* disconnected: {}", reason),
        SessionEvent::Reconnecting { attempt, delay } => {
            println!("* reconnecting in {}ms (attempt {})", delay.as_millis(), attempt)
        }
        SessionEvent::UserCount(count) => {
            if *last_count != Some(*count) {
                println!("* {} users online", count);
                *last_count = Some(*count);
            }
        }
        SessionEvent::BanTick(left) if *left <= 5 || left % 10 == 0 => {
            println!("* chat ban: {}s left", left)
        }
        SessionEvent::GaveUp { attempts } => {
            println!("* gave up reconnecting after {} attempts", attempts)
        }
        SessionEvent::Closed => println!("* session closed"),
        _ => {}
    }
}
