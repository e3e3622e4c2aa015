//! Transport seam for the coordination channel.
//!
//! [`Connector`] opens one duplex text link and hands back its two halves.
//! The manager keeps the [`LinkWriter`] and moves the [`LinkReader`] into a
//! dedicated task, so reading and writing never contend for the same
//! borrow. [`WebSocketConnector`] is the production implementation.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Transport-level failures of the coordination channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Open(String),

    #[error("connection error: {0}")]
    Io(String),

    #[error("connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::Io(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Write half of an open link.
#[async_trait]
pub trait LinkWriter: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the link. Errors are irrelevant at this point and swallowed.
    async fn close(&mut self);
}

/// Read half of an open link.
#[async_trait]
pub trait LinkReader: Send {
    /// Next text frame. `None` once the remote side closed the link.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;
}

/// Both halves of a freshly opened link.
pub struct Link {
    pub writer: Box<dyn LinkWriter>,
    pub reader: Box<dyn LinkReader>,
}

/// Factory for links to the coordination endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Link, TransportError>;
}

// ---------------------------------------------------------------------------
// WebSocketConnector
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket links with `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let (sink, stream) = stream.split();
        Ok(Link {
            writer: Box::new(WsWriter { sink }),
            reader: Box::new(WsReader { stream }),
        })
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl LinkWriter for WsWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink.send(WsMessage::text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl LinkReader for WsReader {
    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Close(frame)) => {
                    log::debug!("connection: close frame received: {frame:?}");
                    return None;
                }
                Ok(WsMessage::Binary(bytes)) => {
                    log::warn!("connection: ignoring {} byte binary frame", bytes.len());
                }
                // Ping/Pong are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory connector driven by the test.
    //!
    //! Each `open()` pops the next scripted outcome. A successful open
    //! returns a [`MockRemote`] through `remotes` so the test can push frames
    //! in, observe frames sent out, and close the link.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::*;

    pub enum Script {
        Accept,
        Refuse,
        /// Never finish the handshake.
        Hang,
    }

    pub struct MockRemote {
        pub to_client: mpsc::UnboundedSender<Option<Result<String, TransportError>>>,
        pub from_client: mpsc::UnboundedReceiver<String>,
    }

    impl MockRemote {
        pub fn push(&self, frame: &str) {
            let _ = self.to_client.send(Some(Ok(frame.to_owned())));
        }

        pub fn close(&self) {
            let _ = self.to_client.send(None);
        }
    }

    pub struct MockConnector {
        script: Mutex<VecDeque<Script>>,
        /// Outcome used once the script runs dry.
        fallback_accept: bool,
        opens: AtomicUsize,
        remotes: mpsc::UnboundedSender<MockRemote>,
    }

    impl MockConnector {
        pub fn new(
            script: impl IntoIterator<Item = Script>,
            fallback_accept: bool,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockRemote>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback_accept,
                opens: AtomicUsize::new(0),
                remotes: tx,
            });
            (connector, rx)
        }

        pub fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn open(&self, _url: &str) -> Result<Link, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let accept = match next {
                Some(Script::Accept) => true,
                Some(Script::Refuse) => false,
                Some(Script::Hang) => std::future::pending().await,
                None => self.fallback_accept,
            };
            if !accept {
                return Err(TransportError::Open("connection refused".into()));
            }

            let (to_client, inbound) = mpsc::unbounded_channel();
            let (outbound, from_client) = mpsc::unbounded_channel();
            let _ = self.remotes.send(MockRemote {
                to_client,
                from_client,
            });
            Ok(Link {
                writer: Box::new(MockWriter { outbound }),
                reader: Box::new(MockReader { inbound }),
            })
        }
    }

    struct MockWriter {
        outbound: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl LinkWriter for MockWriter {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.outbound.send(text).map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) {}
    }

    struct MockReader {
        inbound: mpsc::UnboundedReceiver<Option<Result<String, TransportError>>>,
    }

    #[async_trait]
    impl LinkReader for MockReader {
        async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
            // A dropped remote counts as a close.
            self.inbound.recv().await.flatten()
        }
    }
}
