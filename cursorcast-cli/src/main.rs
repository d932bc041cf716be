//! cursorcast — live cursor presence relay and terminal client.
//!
//! `cursorcast relay` runs the WebSocket relay; `cursorcast client` joins
//! it from a terminal, driving a cursor with typed commands and printing
//! the remote cursors as the renderer sees them.
//!
//! Settings come from flags, then `CURSORCAST_*` environment variables
//! (a `.env` file is loaded first), then built-in defaults.

mod input;
mod presence;

use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;

use cursorcast_collab::{ClientConfig, RelayServer, ServerConfig};
use presence::TerminalPresence;

#[derive(Debug, Parser)]
#[command(name = "cursorcast", version, about = "Live cursor presence relay and client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the presence relay.
    Relay {
        #[arg(long, env = "CURSORCAST_BIND", default_value = "127.0.0.1:9300")]
        bind: String,

        /// Seconds between full presence snapshots.
        #[arg(long, env = "CURSORCAST_SNAPSHOT_SECS", default_value_t = 5)]
        snapshot_secs: u64,

        #[arg(long, env = "CURSORCAST_BROADCAST_CAPACITY", default_value_t = 256)]
        broadcast_capacity: usize,

        #[arg(long, env = "CURSORCAST_MAX_MESSAGE_CHARS", default_value_t = 280)]
        max_message_chars: usize,
    },

    /// Join a relay from the terminal.
    Client {
        #[arg(long, env = "CURSORCAST_URL", default_value = "ws://127.0.0.1:9300")]
        url: String,

        #[arg(long, env = "CURSORCAST_NAME", default_value = cursorcast_collab::DEFAULT_NAME)]
        name: String,

        /// Initial location, e.g. `/pricing`.
        #[arg(long, env = "CURSORCAST_LOCATION")]
        location: Option<String>,

        /// Initial country/region flag.
        #[arg(long, env = "CURSORCAST_FLAG")]
        flag: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Relay {
            bind,
            snapshot_secs,
            broadcast_capacity,
            max_message_chars,
        } => {
            let config = ServerConfig {
                bind_addr: bind,
                snapshot_interval: Duration::from_secs(snapshot_secs),
                broadcast_capacity,
                max_message_chars,
                ..ServerConfig::default()
            };
            info!("Starting cursorcast relay...");
            RelayServer::new(config).run().await?;
        }

        Command::Client {
            url,
            name,
            location,
            flag,
        } => {
            let config = ClientConfig::new(url, name);
            let terminal = TerminalPresence::connect(&config).await?;
            terminal.set_status(location, flag).await?;
            terminal.run().await?;
        }
    }

    Ok(())
}
