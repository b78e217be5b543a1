#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Client for the shared live board.
//!
//! **Feature flag:** `board` (enabled by default)
//!
//! An admin drags member records between named sections; every change is
//! broadcast over a WebSocket so all connected viewers see the same board.
//!
//! # Messages
//!
//! - **`INIT_STATE`**: snapshot sent by the server when a viewer connects
//! - **`DRAG_UPDATE`**: position of a drag in progress
//! - **`DRAG_END`**: the drag ended without a drop
//! - **`DROP_UPDATE`**: authoritative full board after a drop or roster edit
//!
//! # Example
//!
//! ```rust, no_run
//! use live_board::board::{Board, Client, Location};
//! use live_board::ws::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new("ws://localhost:8080/ws", Config::default())?;
//!     client.connect();
//!
//!     let mut board = Board::default();
//!     // ... once connected and mirrored, an admin moves a member:
//!     if let Ok(update) = board.move_item(1, &Location::section("eng"), 0) {
//!         client.send(&update)?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod state;
pub mod types;

pub use client::{BoardParser, Client};
pub use state::{ActiveDrag, Board, Location};
pub use types::{BoardMessage, BoardState, Item, ItemId, Position, Section, SectionId};
