//! Physical connection abstraction.
//!
//! A [`Connector`] performs one handshake and yields a [`Link`]: a pair of
//! queues to a background pump task that owns the socket. The state machine
//! only ever sees text frames and a final close notification, which keeps it
//! independent of the WebSocket library and lets tests script connections
//! with [`Link::in_memory`].

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use url::Url;

use taskwire_core::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code of a normal, expected closure.
pub const NORMAL_CLOSURE: u16 = 1000;

const INBOUND_CAPACITY: usize = 256;

/// How a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    Clean {
        /// Close code (1005 when the frame carried none).
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// The connection broke without a close handshake.
    Unclean(String),
}

impl CloseReason {
    /// Whether the closure was clean and expected (code 1000).
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Clean { code, .. } if *code == NORMAL_CLOSURE)
    }
}

/// Something that happened on an open link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A UTF-8 text frame.
    Text(String),
    /// The connection ended. No further events follow.
    Closed(CloseReason),
}

/// The client side of one open connection.
///
/// Dropping the link closes the connection with code 1000.
pub struct Link {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<LinkEvent>,
    _close: DropGuard,
}

impl Link {
    /// Assemble a link from its queues and the pump's shutdown token.
    pub fn new(
        outbound: mpsc::Sender<String>,
        inbound: mpsc::Receiver<LinkEvent>,
        close: CancellationToken,
    ) -> Self {
        Self {
            outbound,
            inbound,
            _close: close.drop_guard(),
        }
    }

    /// A link wired directly to a [`LinkPeer`] with no socket in between.
    pub fn in_memory(capacity: usize) -> (Self, LinkPeer) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let closed = CancellationToken::new();
        let link = Self::new(out_tx, in_rx, closed.clone());
        let peer = LinkPeer {
            frames: out_rx,
            events: in_tx,
            closed,
        };
        (link, peer)
    }

    /// Handle for queueing frames without borrowing the link.
    pub fn sender(&self) -> mpsc::Sender<String> {
        self.outbound.clone()
    }

    /// Queue a text frame. Returns `false` if the queue is full or closed.
    pub fn try_send(&self, text: String) -> bool {
        self.outbound.try_send(text).is_ok()
    }

    /// Next event from the peer. `None` once the pump has gone away.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }
}

/// The far end of an in-memory [`Link`].
pub struct LinkPeer {
    /// Frames the client sent.
    pub frames: mpsc::Receiver<String>,
    /// Feed for events the client will receive.
    pub events: mpsc::Sender<LinkEvent>,
    /// Cancelled when the client drops the link.
    pub closed: CancellationToken,
}

impl LinkPeer {
    /// Deliver a text frame to the client.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Text(text.into())).await.is_ok()
    }

    /// Close the connection with the given code.
    pub async fn close(&self, code: u16) -> bool {
        let reason = CloseReason::Clean {
            code,
            reason: String::new(),
        };
        self.events.send(LinkEvent::Closed(reason)).await.is_ok()
    }
}

/// Performs one physical connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Complete the handshake against `url` and return the open link.
    async fn connect(&self, url: &Url) -> Result<Link, ChannelError>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct WsConnector {
    outbound_capacity: usize,
}

impl WsConnector {
    /// Connector whose links buffer up to `outbound_capacity` frames.
    ///
    /// `wss://` endpoints go through rustls with the webpki root store.
    pub fn new(outbound_capacity: usize) -> Self {
        // Process-wide; fails harmlessly if a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            outbound_capacity: outbound_capacity.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Link, ChannelError> {
        let (ws, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (out_tx, out_rx) = mpsc::channel(self.outbound_capacity);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let cancel = CancellationToken::new();
        let _ = tokio::spawn(pump(ws, out_rx, in_tx, cancel.clone()));
        Ok(Link::new(out_tx, in_rx, cancel))
    }
}

/// Socket pump: outbound queue → socket, socket → inbound queue.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                close_normally(&mut ws_tx).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    close_normally(&mut ws_tx).await;
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    let _ = inbound
                        .send(LinkEvent::Closed(CloseReason::Unclean(e.to_string())))
                        .await;
                    break;
                }
            }
            msg = ws_rx.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => LinkEvent::Text(text.to_string()),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => LinkEvent::Text(text),
                        Err(_) => {
                            warn!("binary frame is not UTF-8");
                            LinkEvent::Closed(CloseReason::Unclean("non-UTF-8 frame".into()))
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((1005, String::new()), |f| {
                            (u16::from(f.code), f.reason.to_string())
                        });
                        LinkEvent::Closed(CloseReason::Clean { code, reason })
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => LinkEvent::Closed(CloseReason::Unclean(e.to_string())),
                    None => LinkEvent::Closed(CloseReason::Unclean("stream ended".into())),
                };
                let last = matches!(event, LinkEvent::Closed(_));
                if inbound.send(event).await.is_err() || last {
                    break;
                }
            }
        }
    }
}

async fn close_normally(ws_tx: &mut SplitSink<WsStream, Message>) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
}
