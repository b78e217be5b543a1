#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt::Debug;
use std::future::{Future, pending};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Sleep, sleep};
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::retry::RetrySchedule;
use super::traits::MessageParser;
use crate::{Result, error::Error};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type ConnectFuture = Pin<
    Box<dyn Future<Output = std::result::Result<(WsStream, Response), tungstenite::Error>> + Send>,
>;

/// Callback invoked with every well-formed inbound message.
pub type MessageHandler<M> = Arc<dyn Fn(M) + Send + Sync>;

/// Callback invoked with every transport error.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    /// A connection request is in flight
    Connecting,
    /// Connected and able to send
    Open,
    /// No connection, either never opened, torn down, or waiting to retry
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Single-slot holders for the caller's current handlers.
///
/// Dispatch reads the slot every time, so replacing a handler takes effect on
/// the next delivery without touching the socket.
struct Handlers<M> {
    message: RwLock<Option<MessageHandler<M>>>,
    error: RwLock<Option<ErrorHandler>>,
}

impl<M> Handlers<M> {
    fn new() -> Self {
        Self {
            message: RwLock::new(None),
            error: RwLock::new(None),
        }
    }

    fn message(&self) -> Option<MessageHandler<M>> {
        self.message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn error(&self) -> Option<ErrorHandler> {
        self.error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_message(&self, handler: Option<MessageHandler<M>>) {
        *self
            .message
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    fn set_error(&self, handler: Option<ErrorHandler>) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }
}

/// Requests from [`ConnectionManager`] handles to the connection task.
#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Reconnect,
    Send(String),
}

/// Manages one WebSocket connection: lifecycle, reconnection and dispatch.
///
/// All connection state (the socket, the attempt counter and the pending
/// reconnect timer) is owned by a single background task, so every reaction runs
/// serially. The handle only enqueues commands and never blocks.
///
/// - [`connect`](Self::connect) opens a connection unless one is open or opening,
///   or the attempt budget is spent
/// - Abnormal closures (any close code other than 1000, or none) schedule a retry
///   after an exponential backoff
/// - [`disconnect`](Self::disconnect) closes with code 1000 and cancels any retry
/// - [`reconnect`](Self::reconnect) resets the attempt budget and connects at once
///
/// # Type Parameters
///
/// - `M`: Message type that implements [`DeserializeOwned`]
/// - `P`: Parser type that implements [`MessageParser<M>`]
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new(
///     "wss://example.com/board".to_owned(),
///     Config::default(),
///     parser,
/// )?;
///
/// connection.on_message(|msg| println!("Received: {msg:?}"));
/// connection.connect();
/// ```
pub struct ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Send + 'static,
    P: MessageParser<M>,
{
    /// Sender channel for commands to the connection task
    command_tx: mpsc::UnboundedSender<Command>,
    /// Watch channel receiver for state changes
    state_rx: watch::Receiver<ConnectionState>,
    /// Handlers shared with the connection task
    handlers: Arc<Handlers<M>>,
    /// Phantom data for unused type parameters
    _phantom: PhantomData<P>,
}

impl<M, P> Clone for ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Send + 'static,
    P: MessageParser<M>,
{
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            state_rx: self.state_rx.clone(),
            handlers: Arc::clone(&self.handlers),
            _phantom: PhantomData,
        }
    }
}

impl<M, P> ConnectionManager<M, P>
where
    M: DeserializeOwned + Debug + Send + 'static,
    P: MessageParser<M>,
{
    /// Create a new connection manager and start its connection task.
    ///
    /// The manager starts [`Closed`](ConnectionState::Closed); call
    /// [`connect`](Self::connect) once handlers are installed. The endpoint must
    /// be a `ws://` or `wss://` URL. Must be called within a Tokio runtime.
    pub fn new(endpoint: String, config: Config, parser: P) -> Result<Self> {
        let url = Url::parse(&endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(WsError::InvalidEndpoint(endpoint).into());
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let handlers = Arc::new(Handlers::new());

        let task = ConnectionTask {
            endpoint,
            parser,
            handlers: Arc::clone(&handlers),
            state_tx,
            retry: RetrySchedule::new(config.reconnect),
            socket: None,
            retry_timer: None,
        };

        tokio::spawn(task.run(command_rx));

        Ok(Self {
            command_tx,
            state_rx,
            handlers,
            _phantom: PhantomData,
        })
    }

    /// Open the connection.
    ///
    /// No-op if a connection is already open or opening, or if the reconnection
    /// attempt budget is spent. Returns immediately; the outcome is observable
    /// through [`state`](Self::state).
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection with the normal closure code and cancel any pending
    /// reconnect. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Tear down, reset the attempt budget and connect again immediately.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Serialize and send a message to the WebSocket server.
    ///
    /// Messages sent while the connection is not open are dropped, not queued.
    /// Only a serialization failure is reported as an error.
    pub fn send<R: Serialize>(&self, message: &R) -> Result<()> {
        let state = self.state();
        if !state.is_connected() {
            #[cfg(feature = "tracing")]
            tracing::warn!(%state, "WebSocket is not open, dropping outbound message");
            return Ok(());
        }

        let json = serde_json::to_string(message)?;
        self.command(Command::Send(json));
        Ok(())
    }

    /// Replace the handler invoked for every parsed inbound message.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        self.handlers.set_message(Some(Arc::new(handler)));
    }

    /// Replace the handler invoked for transport errors.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.handlers.set_error(Some(Arc::new(handler)));
    }

    /// Remove both handlers. Subsequent messages are parsed and discarded.
    pub fn clear_handlers(&self) {
        self.handlers.set_message(None);
        self.handlers.set_error(None);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection state changes.
    ///
    /// The returned receiver treats the current state as seen and is notified on
    /// every later transition.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        let mut state_rx = self.state_rx.clone();
        drop(state_rx.borrow_and_update());
        state_rx
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.command_tx.send(command) {
            #[cfg(feature = "tracing")]
            tracing::error!(command = ?e.0, "connection task has stopped, ignoring command");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }
}

/// The socket owned by the connection task: either a handshake in flight or an
/// established stream.
enum Socket {
    Connecting(ConnectFuture),
    Open(Box<WsStream>),
}

/// What the current socket produced.
enum SocketEvent {
    Opened(Box<WsStream>),
    Frame(Message),
    Failed(tungstenite::Error),
    Ended,
}

/// Background task that owns the connection and reacts to commands, socket
/// events and the reconnect timer, one at a time.
struct ConnectionTask<M, P>
where
    M: DeserializeOwned + Debug + Send + 'static,
    P: MessageParser<M>,
{
    endpoint: String,
    parser: P,
    handlers: Arc<Handlers<M>>,
    state_tx: watch::Sender<ConnectionState>,
    retry: RetrySchedule,
    /// At most one live or connecting socket
    socket: Option<Socket>,
    /// The single pending reconnect, if any
    retry_timer: Option<Pin<Box<Sleep>>>,
}

impl<M, P> ConnectionTask<M, P>
where
    M: DeserializeOwned + Debug + Send + 'static,
    P: MessageParser<M>,
{
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                // Commands win ties so a teardown always beats a stale timer or frame
                biased;

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        // Every handle is gone
                        self.teardown().await;
                        break;
                    };
                    self.handle_command(command).await;
                }

                event = next_socket_event(&mut self.socket) => {
                    self.handle_socket_event(event).await;
                }

                () = retry_elapsed(&mut self.retry_timer) => {
                    self.retry_timer = None;
                    self.retry.advance();

                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt = self.retry.attempts(), "Reconnect timer fired");

                    self.connect();
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.teardown().await,
            Command::Reconnect => {
                self.teardown().await;
                self.retry.reset();
                self.connect();
            }
            Command::Send(text) => self.transmit(text).await,
        }
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened(stream) => {
                self.socket = Some(Socket::Open(stream));
                self.set_state(ConnectionState::Open);
                self.retry.reset();

                #[cfg(feature = "tracing")]
                tracing::info!(endpoint = %self.endpoint, "WebSocket connected");
            }
            SocketEvent::Frame(Message::Text(text)) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, "Received WebSocket text message");

                self.dispatch(text.as_bytes());
            }
            SocketEvent::Frame(Message::Close(frame)) => {
                // Send the queued close reply before dropping the stream
                if let Some(Socket::Open(stream)) = self.socket.as_mut() {
                    _ = stream.flush().await;
                }
                self.on_close(frame.map(|f| f.code));
            }
            SocketEvent::Frame(_) => {
                // Ignore binary frames and ping/pong control frames.
            }
            SocketEvent::Failed(e) => {
                self.on_error(e);
                self.on_close(None);
            }
            SocketEvent::Ended => self.on_close(None),
        }
    }

    fn connect(&mut self) {
        if self.socket.is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Connection already open or opening, ignoring connect");
            return;
        }

        if self.retry.exhausted() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                attempts = self.retry.attempts(),
                "Maximum reconnection attempts reached, call reconnect to try again"
            );
            return;
        }

        let request = match self.endpoint.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                // No close event follows a request that was never issued, so
                // this failure does not schedule a retry.
                let error = Error::from(e);
                #[cfg(feature = "tracing")]
                tracing::error!(endpoint = %self.endpoint, error = %error, "Unable to create WebSocket connection");
                #[cfg(not(feature = "tracing"))]
                let _ = &error;
                return;
            }
        };

        // A manual connect supersedes any pending retry
        if self.retry_timer.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Connecting now, cancelled pending reconnect");
        }

        self.set_state(ConnectionState::Connecting);
        self.socket = Some(Socket::Connecting(Box::pin(connect_async(request))));
    }

    /// Cancel the pending reconnect and close the socket, if any. A handshake
    /// still in flight is dropped, so it can never report an open.
    async fn teardown(&mut self) {
        if self.retry_timer.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Cancelled pending reconnect");
        }

        if let Some(Socket::Open(mut stream)) = self.socket.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };
            if let Err(e) = WsStream::close(&mut stream, Some(frame)).await {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Error closing WebSocket");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }

        self.set_state(ConnectionState::Closed);
    }

    async fn transmit(&mut self, text: String) {
        let Some(Socket::Open(stream)) = self.socket.as_mut() else {
            #[cfg(feature = "tracing")]
            tracing::warn!("WebSocket closed before message could be sent, dropping it");
            return;
        };

        let result = stream.send(Message::Text(text.into())).await;
        if let Err(e) = result {
            // The read side observes the broken socket and runs the close reaction.
            self.on_error(e);
        }
    }

    fn dispatch(&self, bytes: &[u8]) {
        match self.parser.parse(bytes) {
            Ok(messages) => {
                for message in messages {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(?message, "Parsed WebSocket message");

                    if let Some(handler) = self.handlers.message() {
                        handler(message);
                    }
                }
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Failed to parse WebSocket message, discarding it");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }

    fn on_error(&self, e: tungstenite::Error) {
        let error = Error::from(e);

        #[cfg(feature = "tracing")]
        tracing::warn!(error = %error, "WebSocket transport error");

        if let Some(handler) = self.handlers.error() {
            handler(&error);
        }
    }

    fn on_close(&mut self, code: Option<CloseCode>) {
        self.socket = None;
        self.set_state(ConnectionState::Closed);

        if code == Some(CloseCode::Normal) {
            #[cfg(feature = "tracing")]
            tracing::info!("WebSocket closed normally");
            return;
        }

        let delay = self.retry.delay();

        #[cfg(feature = "tracing")]
        tracing::warn!(
            code = ?code,
            attempt = self.retry.attempts(),
            delay_ms = delay.as_millis(),
            "WebSocket closed abnormally, scheduling reconnect"
        );

        self.retry_timer = Some(Box::pin(sleep(delay)));
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Wait for the next event from the socket, or forever if there is none.
async fn next_socket_event(socket: &mut Option<Socket>) -> SocketEvent {
    match socket {
        None => pending().await,
        Some(Socket::Connecting(handshake)) => match handshake.await {
            Ok((stream, _response)) => SocketEvent::Opened(Box::new(stream)),
            Err(e) => SocketEvent::Failed(e),
        },
        Some(Socket::Open(stream)) => match stream.next().await {
            Some(Ok(message)) => SocketEvent::Frame(message),
            Some(Err(e)) => SocketEvent::Failed(e),
            None => SocketEvent::Ended,
        },
    }
}

/// Wait for the pending reconnect timer, or forever if none is scheduled.
async fn retry_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.await,
        None => pending().await,
    }
}
