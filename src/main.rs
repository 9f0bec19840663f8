//! Console driver for the bridge
//!
//! Reads chat lines from stdin and prints room messages to stdout. A line is
//! treated as sent in the `--room` room unless it starts with `@<room>`:
//!
//! ```text
//! !ntfy subscribe ntfy.sh/alerts
//! @ops !ntfy sub ntfy.sh/deploys
//! @ops !ntfy list
//! ```

use std::sync::Arc;

use clap::Parser;
use ntfy_bridge::bridge::{Bridge, Command, execute};
use ntfy_bridge::config::{DEFAULT_CONFIG_PATH, Settings, load_config_from};
use ntfy_bridge::persistence::SubscriptionStore;
use ntfy_bridge::room::{ConsoleRooms, RoomSender};
use ntfy_bridge::transport::WebSocketSource;
use ntfy_bridge::utils::{Result, logging};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ntfy-bridge", about = "Relay ntfy topics into chat rooms")]
struct Cli {
    /// Config file to load, extension optional
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    /// Room that lines without an `@<room>` prefix are sent in
    #[arg(long, default_value = "console")]
    room: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    // wss connections need a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run(settings, &cli.room).await {
        error!("Bridge failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(settings: Settings, default_room: &str) -> Result<()> {
    let store = SubscriptionStore::open(&settings.storage.path)?;
    let source = Arc::new(WebSocketSource::new(&settings.listener));
    let bridge = Bridge::new(&settings, store, Arc::new(ConsoleRooms), source);

    let resumed = bridge.resume().await?;
    let prefix = bridge.settings().command_prefix.clone();
    info!(resumed, "bridge running, type `!{} help`", prefix);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "could not read stdin");
                break;
            }
        };

        let (room, text) = split_room(&line, default_room);
        let Some(command) = Command::parse(&prefix, text) else {
            continue;
        };
        let reply = execute(&bridge, room, command).await;
        if let Err(e) = ConsoleRooms.send(room, &reply).await {
            warn!(room_id = %room, error = %e, "could not print reply");
        }
    }

    bridge.shutdown().await;
    Ok(())
}

/// Split an optional leading `@room` off a console line.
fn split_room<'a>(line: &'a str, default_room: &'a str) -> (&'a str, &'a str) {
    match line.trim_start().strip_prefix('@') {
        Some(rest) => rest.split_once(char::is_whitespace).unwrap_or((rest, "")),
        None => (default_room, line),
    }
}
