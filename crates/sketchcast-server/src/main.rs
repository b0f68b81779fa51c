//! SketchCast WebSocket Relay Server
//!
//! Rebroadcasts whole-surface drawing snapshots to every client in a room,
//! the publisher included, and hands the latest one to late joiners.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "user_id": "<session-id>", "room": "lobby" }
//! { "type": "update", "user_id": "<session-id>", "data_url": "data:image/png;base64,..." }
//! { "type": "leave" }
//! ```
//! An `update` with an empty `data_url` clears every surface in the room.

mod relay;
mod rooms;

use rooms::AppState;
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};

/// Environment variable holding the listen address.
const BIND_VAR: &str = "SKETCHCAST_BIND";
const DEFAULT_BIND: &str = "0.0.0.0:3030";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchcast_server=info,tower_http=info".into()),
        )
        .init();

    let bind = std::env::var(BIND_VAR).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid {} value {:?}: {}", BIND_VAR, bind, e);
            std::process::exit(1);
        }
    };

    let app = relay::router(Arc::new(AppState::new()));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("SketchCast relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
