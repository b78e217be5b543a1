//! Mirrors a live board and logs every change.
//!
//! This example shows how to:
//! 1. Install handlers before connecting, so the `INIT_STATE` snapshot is not missed
//! 2. Fold inbound messages into a local [`Board`]
//! 3. Watch connection state while the client reconnects on its own
//! 4. As an admin, move a member and broadcast the resulting `DROP_UPDATE`
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info cargo run --example board_viewer --features tracing -- ws://localhost:8080/ws
//! ```
//!
//! Act as the admin and move the first unassigned member into the first section:
//! ```sh
//! BOARD_ADMIN=1 RUST_LOG=info cargo run --example board_viewer --features tracing -- ws://localhost:8080/ws
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=board_viewer.log RUST_LOG=debug cargo run --example board_viewer --features tracing
//! ```

use std::fs::File;
use std::time::Duration;

use live_board::board::{Board, BoardMessage, Client, Location};
use live_board::ws::config::Config;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";
const DEFAULT_DURATION: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BOARD_ENDPOINT").ok())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
    let admin = std::env::var("BOARD_ADMIN").is_ok();
    let run_for = std::env::var("DURATION_SECS")
        .ok()
        .and_then(|secs| secs.parse().ok())
        .map_or(DEFAULT_DURATION, Duration::from_secs);

    let client = Client::new(&endpoint, Config::default())?;

    let (tx, mut rx) = mpsc::unbounded_channel::<BoardMessage>();
    client.on_message(move |message| drop(tx.send(message)));
    client.on_error(|e| warn!(error = %e, "transport error"));

    client.connect();
    info!(endpoint = %client.endpoint(), admin, "connecting to board");

    let mut state_rx = client.state_receiver();
    let mut board = Board::default();
    let mut moved = false;
    let deadline = Instant::now() + run_for;

    loop {
        tokio::select! {
            () = sleep_until(deadline) => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                info!(state = %*state_rx.borrow_and_update(), "connection state changed");
            }
            Some(message) = rx.recv() => {
                board.apply(&message);
                log_board(&board, &message);

                if admin && !moved && matches!(message, BoardMessage::InitState { .. }) {
                    moved = move_first_unassigned(&client, &mut board)?;
                }
            }
        }
    }

    client.disconnect();
    info!("disconnected");

    Ok(())
}

fn log_board(board: &Board, message: &BoardMessage) {
    if let Some(drag) = board.active_drag() {
        info!(
            message = message.tag(),
            member = %drag.item.name,
            x = drag.position.x,
            y = drag.position.y,
            "drag in progress"
        );
        return;
    }

    info!(
        message = message.tag(),
        sections = board.sections().len(),
        unassigned = board.unassigned().len(),
        last_updated = board.last_updated(),
        "board updated"
    );
    for section in board.sections() {
        let members: Vec<&str> = section.items.iter().map(|item| item.name.as_str()).collect();
        info!(section = %section.id, title = %section.title, members = ?members);
    }
}

/// Move the first unassigned member into the first section and broadcast it.
fn move_first_unassigned(client: &Client, board: &mut Board) -> anyhow::Result<bool> {
    let (Some(item), Some(section)) = (board.unassigned().first(), board.sections().first())
    else {
        info!("nothing to move");
        return Ok(false);
    };
    let (item_id, target) = (item.id, Location::section(section.id.clone()));

    let update = board.move_item(item_id, &target, 0)?;
    client.send(&update)?;
    info!(member = item_id, to = ?target, "moved member");

    Ok(true)
}
