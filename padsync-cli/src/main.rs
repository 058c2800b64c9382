//! Padsync - headless collaborative document client
//!
//! Joins a document, appends every line read from stdin, and prints the
//! final text when stdin closes.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use padsync::{socket_uri, transport, ClientConfig, Session, SessionObserver, TextBuffer, TextEdit, UserInfo};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "padsync")]
#[command(about = "Join a collaborative text document from the terminal")]
struct Args {
    /// Document to join
    document: String,

    /// Server host and port
    #[arg(long, default_value = "localhost:3030")]
    host: String,

    /// Use wss:// instead of ws://
    #[arg(long)]
    secure: bool,

    /// Display name shown to other users
    #[arg(short, long)]
    name: Option<String>,

    /// Cursor color hue in degrees
    #[arg(long, default_value_t = 0)]
    hue: u32,

    /// Reconnect interval in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    reconnect_ms: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Logs session notifications.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_connected(&mut self) {
        info!("Connected to document");
    }

    fn on_disconnected(&mut self) {
        warn!("Disconnected, reconnecting");
    }

    fn on_desynchronized(&mut self) {
        warn!("Session is out of sync with the server; rejoin the document");
    }

    fn on_change_language(&mut self, language: &str) {
        info!(language, "Language changed");
    }

    fn on_change_users(&mut self, users: &BTreeMap<u64, UserInfo>) {
        let names: Vec<&str> = users.values().map(|u| u.name.as_str()).collect();
        info!(count = users.len(), ?names, "Users changed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let uri = socket_uri(&args.host, args.secure, &args.document);
    info!(%uri, "Joining document");

    let config = ClientConfig::new(uri).with_reconnect_interval(Duration::from_millis(args.reconnect_ms.max(1)));
    let session = Session::new(config, TextBuffer::new(), LogObserver);
    let (handle, task) = transport::spawn(session);

    if let Some(name) = args.name {
        handle.set_info(UserInfo::new(name, args.hue))?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if handle.edit(vec![TextEdit::append(format!("{}\n", line))]).is_err() {
            // The session stopped on its own.
            break;
        }
    }

    if let Err(e) = handle.dispose() {
        debug!("Session already stopped: {}", e);
    }
    let session = task.await.context("Session task failed")?;
    if let Some(warning) = session.exit_guard() {
        warn!("{}", warning);
    }
    print!("{}", session.text());
    Ok(())
}
