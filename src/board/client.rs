use std::sync::Arc;

use tokio::sync::watch;

use super::types::{BoardMessage, Item, Position, Section, parse_message};
use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::connection::ConnectionState;
use crate::ws::{ConnectionManager, MessageParser};

/// Parses board frames into [`BoardMessage`]s.
#[non_exhaustive]
#[derive(Clone, Debug, Default)]
pub struct BoardParser;

impl MessageParser<BoardMessage> for BoardParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<BoardMessage>> {
        parse_message(bytes)
    }
}

/// Client for the shared live board.
///
/// Wraps a [`ConnectionManager`] speaking the board wire format. Every viewer
/// installs a message handler and connects; the admin additionally broadcasts
/// drags and drops.
///
/// # Examples
///
/// ```rust, no_run
/// use live_board::board::{Board, Client};
/// use live_board::ws::config::Config;
/// use std::sync::{Arc, Mutex};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::new("ws://localhost:8080/ws", Config::default())?;
///     let board = Arc::new(Mutex::new(Board::default()));
///
///     let mirror = Arc::clone(&board);
///     client.on_message(move |message| {
///         if let Ok(mut board) = mirror.lock() {
///             board.apply(&message);
///         }
///     });
///     client.connect();
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Endpoint of the board WebSocket
    endpoint: String,
    /// Connection manager for the WebSocket
    connection: ConnectionManager<BoardMessage, BoardParser>,
}

impl Client {
    /// Create a board client for `endpoint`. The client starts disconnected.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        let connection = ConnectionManager::new(endpoint.to_owned(), config, BoardParser)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint: endpoint.to_owned(),
                connection,
            }),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Connect, unless already open or opening.
    pub fn connect(&self) {
        self.inner.connection.connect();
    }

    /// Close the connection normally and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    /// Reset the reconnection budget and connect immediately.
    pub fn reconnect(&self) {
        self.inner.connection.reconnect();
    }

    /// Replace the handler for inbound board messages.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(BoardMessage) + Send + Sync + 'static,
    {
        self.inner.connection.on_message(handler);
    }

    /// Replace the handler for transport errors.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.inner.connection.on_error(handler);
    }

    /// Send a message. Dropped when the connection is not open.
    pub fn send(&self, message: &BoardMessage) -> Result<()> {
        self.inner.connection.send(message)
    }

    /// Broadcast the position of an in-progress drag.
    pub fn broadcast_drag(&self, item: Item, position: Position) -> Result<()> {
        self.send(&BoardMessage::drag_update(item, position))
    }

    /// Broadcast the full board after a drop or roster edit.
    pub fn broadcast_drop(&self, sections: Vec<Section>, items: Vec<Item>) -> Result<()> {
        self.send(&BoardMessage::drop_update(sections, items))
    }

    /// Broadcast that the active drag ended without a drop.
    pub fn broadcast_drag_end(&self) -> Result<()> {
        self.send(&BoardMessage::DragEnd)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.state_receiver()
    }
}
