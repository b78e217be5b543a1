//! Core WebSocket infrastructure.
//!
//! This module provides a reconnecting connection manager that can be
//! specialized for different message formats through the [`MessageParser`] trait.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Owns one logical WebSocket connection, dispatches parsed
//!   messages to the current handler and reconnects with exponential backoff
//! - [`MessageParser`]: Trait for parsing incoming WebSocket messages
//!
//! # Example
//!
//! ```ignore
//! let connection = ConnectionManager::new(endpoint, Config::default(), JsonParser)?;
//! connection.on_message(|msg: MyMessage| println!("{msg:?}"));
//! connection.send(&MyMessage::Hello)?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub(crate) mod retry;
pub mod traits;

pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
