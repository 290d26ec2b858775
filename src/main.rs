//! Lobby chat server - Entry Point
//!
//! Opens the message store, starts the ChatServer actor and accepts
//! WebSocket connections.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lobby_chat::{
    handle_connection, ChatServer, Config, MemoryStore, MessageStore, SessionContext, SqliteStore,
    StoreKind,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Missing .env is fine
    let _ = dotenv::dotenv();

    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=lobby_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lobby_chat=info")),
        )
        .init();

    // Bind address from command line overrides the environment
    let config = Config::from_env().with_addr(env::args().nth(1));

    let store: Arc<dyn MessageStore> = match config.store {
        StoreKind::Sqlite => {
            Arc::new(SqliteStore::connect(&config.database_url, config.max_db_connections).await?)
        }
        StoreKind::Memory => {
            info!("Using in-memory message store");
            Arc::new(MemoryStore::new())
        }
    };

    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket Chat Server listening on {}", config.addr);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx).run());

    info!("ChatServer actor started");

    let ctx = SessionContext {
        commands: cmd_tx,
        store,
        settings: config.session_settings(),
    };

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let ctx = ctx.clone();
                let outbound_buffer = config.outbound_buffer;

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx, outbound_buffer).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
