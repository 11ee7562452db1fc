use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::Level;

use chatline_core::MessageStore;
use chatline_server::ServerConfig;
use chatline_store::{Database, SqliteMessageStore};
use chatline_telemetry::{init_telemetry, TelemetryConfig};

/// Real-time chat server: REST history plus WebSocket rooms.
#[derive(Parser, Debug)]
#[command(name = "chatline", version)]
struct Args {
    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 9091)]
    port: u16,

    /// SQLite database path. Defaults to ~/.chatline/chatline.db.
    #[arg(long, env = "CHATLINE_DB")]
    db: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, env = "CHATLINE_LOG", default_value = "info")]
    log_level: Level,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Also persist warn+ logs to this SQLite file.
    #[arg(long)]
    log_db: Option<PathBuf>,

    /// Outbound events buffered per connection.
    #[arg(long, default_value_t = 256)]
    max_send_queue: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig {
        log_level: args.log_level,
        json: args.json_logs,
        ..Default::default()
    };
    if let Some(path) = args.log_db {
        telemetry.log_to_sqlite = true;
        telemetry.log_db_path = path;
    }
    init_telemetry(telemetry);

    let db_path = args.db.unwrap_or_else(default_db_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(db));

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_send_queue: args.max_send_queue,
    };
    let handle = chatline_server::start(config, store)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "chatline ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn default_db_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".chatline")
        .join("chatline.db")
}
