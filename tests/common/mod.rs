#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary uses a different subset of the mock server"
)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::{SinkExt as _, StreamExt as _};
use live_board::ws::ConnectionState;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Default time to wait for something that should happen.
pub const WAIT: Duration = Duration::from_secs(5);

/// Something the server does to a connection.
#[derive(Clone, Debug)]
pub enum ServerAction {
    /// Send a text frame
    Text(String),
    /// Send a close frame with this code, then hang up
    Close(u16),
    /// Hang up without a closing handshake
    Drop,
}

/// Mock WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    /// Actions applied to ALL connected clients
    action_tx: broadcast::Sender<ServerAction>,
    /// Text frames received from clients
    inbound_rx: mpsc::UnboundedReceiver<String>,
    /// Close codes received from clients
    client_close_rx: mpsc::UnboundedReceiver<Option<u16>>,
    /// Time of every TCP accept, including refused handshakes
    accepts: Arc<Mutex<Vec<Instant>>>,
    /// When set, connections are dropped before the WebSocket handshake
    refuse: Arc<AtomicBool>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    pub async fn start() -> Self {
        Self::start_with(Vec::new(), false, Duration::ZERO).await
    }

    /// Start a server that performs `greeting` on every new connection.
    pub async fn with_greeting(greeting: Vec<ServerAction>) -> Self {
        Self::start_with(greeting, false, Duration::ZERO).await
    }

    /// Start a server that echoes every inbound text frame to all clients.
    pub async fn relay() -> Self {
        Self::start_with(Vec::new(), true, Duration::ZERO).await
    }

    /// Start a server that holds every WebSocket handshake for `delay` after
    /// accepting the TCP connection.
    pub async fn slow_handshake(delay: Duration) -> Self {
        Self::start_with(Vec::new(), false, delay).await
    }

    /// Start a server that accepts TCP connections but never completes a
    /// WebSocket handshake.
    pub async fn refusing() -> Self {
        let server = Self::start().await;
        server.set_refuse(true);
        server
    }

    async fn start_with(
        greeting: Vec<ServerAction>,
        relay: bool,
        handshake_delay: Duration,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (action_tx, _) = broadcast::channel::<ServerAction>(100);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let (client_close_tx, client_close_rx) = mpsc::unbounded_channel::<Option<u16>>();
        let accepts = Arc::new(Mutex::new(Vec::new()));
        let refuse = Arc::new(AtomicBool::new(false));

        let broadcast_tx = action_tx.clone();
        let accept_log = Arc::clone(&accepts);
        let refuse_flag = Arc::clone(&refuse);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                // Decide before logging so a caller that observes the accept
                // can no longer change how it is handled.
                let refused = refuse_flag.load(Ordering::SeqCst);
                accept_log.lock().unwrap().push(Instant::now());

                if refused {
                    drop(stream);
                    continue;
                }

                // Subscribe before the handshake so nothing sent after the
                // client observes `Open` can be missed.
                let action_rx = broadcast_tx.subscribe();

                let greeting = greeting.clone();
                let relay_tx = relay.then(|| broadcast_tx.clone());
                let inbound_tx = inbound_tx.clone();
                let client_close_tx = client_close_tx.clone();

                tokio::spawn(async move {
                    if !handshake_delay.is_zero() {
                        sleep(handshake_delay).await;
                    }

                    // Fails when the client gave up during the delay
                    let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };

                    serve_connection(
                        ws_stream,
                        greeting,
                        action_rx,
                        relay_tx,
                        inbound_tx,
                        client_close_tx,
                    )
                    .await;
                });
            }
        });

        Self {
            addr,
            action_tx,
            inbound_rx,
            client_close_rx,
            accepts,
            refuse,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Send a text frame to all connected clients.
    pub fn send(&self, message: &str) {
        drop(self.action_tx.send(ServerAction::Text(message.to_owned())));
    }

    /// Close all connections with `code`.
    pub fn close_all(&self, code: u16) {
        drop(self.action_tx.send(ServerAction::Close(code)));
    }

    /// Hang up on all connections without a closing handshake.
    pub fn drop_all(&self) {
        drop(self.action_tx.send(ServerAction::Drop));
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepts.lock().unwrap().len()
    }

    pub fn accept_times(&self) -> Vec<Instant> {
        self.accepts.lock().unwrap().clone()
    }

    /// Wait until at least `count` connections have been accepted.
    pub async fn wait_for_accepts(&self, count: usize) -> bool {
        timeout(WAIT, async {
            while self.accepted() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Receive the next text frame sent by a client.
    pub async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.inbound_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive a text frame only if one arrives within `within`.
    pub async fn recv_within(&mut self, within: Duration) -> Option<String> {
        timeout(within, self.inbound_rx.recv()).await.ok().flatten()
    }

    /// Receive the close code of the next client-initiated close.
    pub async fn recv_client_close(&mut self) -> Option<Option<u16>> {
        timeout(Duration::from_secs(2), self.client_close_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn serve_connection(
    mut ws: WebSocketStream<TcpStream>,
    greeting: Vec<ServerAction>,
    mut action_rx: broadcast::Receiver<ServerAction>,
    relay_tx: Option<broadcast::Sender<ServerAction>>,
    inbound_tx: mpsc::UnboundedSender<String>,
    client_close_tx: mpsc::UnboundedSender<Option<u16>>,
) {
    for action in greeting {
        if !perform(&mut ws, action).await {
            return;
        }
    }

    loop {
        tokio::select! {
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(relay_tx) = &relay_tx {
                            drop(relay_tx.send(ServerAction::Text(text.to_string())));
                        }
                        drop(inbound_tx.send(text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        drop(client_close_tx.send(frame.map(|f| u16::from(f.code))));
                        break;
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            action = action_rx.recv() => {
                match action {
                    Ok(action) => {
                        if !perform(&mut ws, action).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Apply an action; returns whether the connection stays up.
async fn perform(ws: &mut WebSocketStream<TcpStream>, action: ServerAction) -> bool {
    match action {
        ServerAction::Text(text) => ws.send(Message::Text(text.into())).await.is_ok(),
        ServerAction::Close(code) => {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            };
            drop(ws.send(Message::Close(Some(frame))).await);
            false
        }
        ServerAction::Drop => false,
    }
}

/// Wait until the watched connection state equals `expected`.
pub async fn wait_for_state(
    state_rx: &mut watch::Receiver<ConnectionState>,
    expected: ConnectionState,
) -> bool {
    matches!(
        timeout(WAIT, state_rx.wait_for(|state| *state == expected)).await,
        Ok(Ok(_))
    )
}
