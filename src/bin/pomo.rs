//! pomo - command-line control client for pomod
//!
//! Joins a session on a running daemon, sends one command and prints the
//! resulting timer state.
//!
//! # Usage
//!
//! ```text
//! pomo standup watch            # Follow a session until Ctrl+C
//! pomo standup start            # Start the countdown
//! pomo standup pause
//! pomo standup reset
//! pomo standup set 10:00        # Or a plain number of seconds
//! pomo standup preset short     # Jump to a preset: pomodoro, short, long
//! pomo standup presets 25:00 5:00 15:00
//! pomo --url ws://host:9000 standup watch
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pomo_core::{PresetKind, Presets, Seconds, TimerSnapshot};
use pomo_protocol::{ClientCommand, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the daemon to answer a command
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// pomo - control a shared session timer
#[derive(Parser, Debug)]
#[command(name = "pomo", version, about)]
struct Args {
    /// Daemon WebSocket URL
    #[arg(long, env = "POMO_URL", default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Session to join
    session: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print every update until interrupted
    Watch,
    /// Start the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Restore the last set time and stop
    Reset,
    /// Set the remaining time (seconds or MM:SS) and stop
    Set {
        /// New remaining time
        time: String,
    },
    /// Set the remaining time to one of the session's presets
    Preset {
        /// pomodoro, short or long
        kind: String,
    },
    /// Replace the session's presets
    Presets {
        /// Pomodoro length
        pomodoro: String,
        /// Short break length
        short_break: String,
        /// Long break length
        long_break: String,
    },
}

fn parse_time(input: &str) -> Result<Seconds> {
    Seconds::parse_clock(input)
        .with_context(|| format!("Invalid time '{input}' (expected seconds or MM:SS)"))
}

impl Action {
    /// Builds the command to send, given the state returned by the join.
    ///
    /// Returns `None` for actions that only observe.
    fn to_command(&self, joined: &TimerSnapshot) -> Result<Option<ClientCommand>> {
        let command = match self {
            Action::Watch => return Ok(None),
            Action::Start => ClientCommand::StartTimer,
            Action::Pause => ClientCommand::PauseTimer,
            Action::Reset => ClientCommand::ResetTimer,
            Action::Set { time } => ClientCommand::set_time(parse_time(time)?),
            Action::Preset { kind } => {
                let Some(kind) = PresetKind::parse(kind) else {
                    bail!("Unknown preset '{kind}' (expected pomodoro, short or long)");
                };
                ClientCommand::set_time(joined.presets.get(kind))
            }
            Action::Presets {
                pomodoro,
                short_break,
                long_break,
            } => ClientCommand::set_presets(Presets::new(
                parse_time(pomodoro)?,
                parse_time(short_break)?,
                parse_time(long_break)?,
            )),
        };
        Ok(Some(command))
    }
}

async fn send(ws: &mut WsStream, command: &ClientCommand) -> Result<()> {
    let json = serde_json::to_string(command)?;
    debug!(command = %json, "Sending");
    ws.send(Message::Text(json.into()))
        .await
        .context("Failed to send command")
}

/// Reads the next protocol message, skipping control frames.
///
/// Returns `None` when the daemon closes the connection.
async fn next_message(ws: &mut WsStream) -> Result<Option<ServerMessage>> {
    while let Some(frame) = ws.next().await {
        match frame.context("Connection error")? {
            Message::Text(text) => {
                let msg = serde_json::from_str(text.as_str())
                    .with_context(|| format!("Unexpected message from daemon: {}", text.as_str()))?;
                return Ok(Some(msg));
            }
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

/// Waits for the next snapshot, failing on an `error` reply.
async fn expect_snapshot(ws: &mut WsStream) -> Result<TimerSnapshot> {
    loop {
        let msg = timeout(REPLY_TIMEOUT, next_message(ws))
            .await
            .context("Timed out waiting for the daemon")??;

        match msg {
            Some(ServerMessage::Timer { timer }) => return Ok(timer),
            Some(ServerMessage::Error { message }) => bail!("{message}"),
            Some(ServerMessage::Pong) => continue,
            None => bail!("Daemon closed the connection"),
        }
    }
}

/// Folds one message into the outcome of a command followed by a ping.
///
/// The daemon handles a connection's messages in order, so everything the
/// command produced (its broadcast or its error) arrives before the pong.
/// Tick broadcasts may arrive in between and are superseded by later ones.
/// Returns the last snapshot once the pong arrives.
fn settle(last: &mut Option<TimerSnapshot>, msg: ServerMessage) -> Result<Option<TimerSnapshot>> {
    match msg {
        ServerMessage::Timer { timer } => {
            *last = Some(timer);
            Ok(None)
        }
        ServerMessage::Error { message } => bail!("{message}"),
        ServerMessage::Pong => match last.take() {
            Some(snapshot) => Ok(Some(snapshot)),
            None => bail!("Daemon sent no update for the command"),
        },
    }
}

/// Sends a command and waits for its outcome.
async fn apply(ws: &mut WsStream, command: &ClientCommand) -> Result<TimerSnapshot> {
    send(ws, command).await?;
    send(ws, &ClientCommand::Ping).await?;

    let mut last = None;
    loop {
        let msg = timeout(REPLY_TIMEOUT, next_message(ws))
            .await
            .context("Timed out waiting for the daemon")??;

        let Some(msg) = msg else {
            bail!("Daemon closed the connection");
        };
        if let Some(snapshot) = settle(&mut last, msg)? {
            return Ok(snapshot);
        }
    }
}

fn print_snapshot(snapshot: &TimerSnapshot) {
    match snapshot.presets.matching(snapshot.initial_time) {
        Some(kind) => println!("{} ({})", snapshot.status_line(), kind.label()),
        None => println!("{}", snapshot.status_line()),
    }
}

async fn watch(ws: &mut WsStream) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),

            msg = next_message(ws) => match msg? {
                Some(ServerMessage::Timer { timer }) => print_snapshot(&timer),
                Some(ServerMessage::Error { message }) => eprintln!("error: {message}"),
                Some(ServerMessage::Pong) => {}
                None => bail!("Daemon closed the connection"),
            },
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let (mut ws, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;

    send(&mut ws, &ClientCommand::join(args.session.as_str())).await?;
    let joined = expect_snapshot(&mut ws).await?;

    match args.action.to_command(&joined)? {
        Some(command) => print_snapshot(&apply(&mut ws, &command).await?),
        None => {
            print_snapshot(&joined);
            watch(&mut ws).await?;
        }
    }

    let _ = ws.close(None).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("pomo=warn".parse()?))
        .init();

    run(Args::parse()).await
}
