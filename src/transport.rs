//! Websocket transport adapter.
//!
//! [`open`] spawns a background worker that owns the socket and speaks the
//! sub-protocol codec at the boundary: outbound [`ClientFrame`]s are encoded
//! to text frames, inbound text frames are decoded to [`BrokerFrame`]s and
//! surfaced as [`TransportEvent`]s. The worker performs no reconnects; any
//! transport failure is reported once and the worker exits.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::error::ChatClientError;
use crate::proto::{BrokerFrame, ClientFrame};

/// Events surfaced by the transport worker, in socket delivery order.
#[derive(Debug)]
pub enum TransportEvent {
    /// The broker acknowledged the connection; frames may be sent.
    Established,
    /// An inbound frame for a subscribed destination.
    Frame { destination: String, body: String },
    /// Unrecoverable socket or broker failure. The worker exits after this.
    Error(ChatClientError),
    /// The socket closed. Graceful when requested via [`TransportHandle::close`].
    Closed,
}

/// Sending half of an open transport.
///
/// Dropping the handle (or calling [`close`](Self::close)) asks the worker to
/// close the socket gracefully.
#[derive(Debug)]
pub struct TransportHandle {
    frame_tx: Option<mpsc::UnboundedSender<ClientFrame>>,
}

impl TransportHandle {
    /// Queues a frame for the worker. Sends into a closing transport are
    /// dropped silently; the session guards against misuse before this point.
    pub fn send(&self, frame: ClientFrame) {
        if let Some(frame_tx) = &self.frame_tx {
            let _ = frame_tx.send(frame);
        }
    }

    pub fn subscribe(&self, destination: impl Into<String>) {
        self.send(ClientFrame::Subscribe {
            destination: destination.into(),
        });
    }

    pub fn unsubscribe(&self, destination: impl Into<String>) {
        self.send(ClientFrame::Unsubscribe {
            destination: destination.into(),
        });
    }

    pub fn publish(&self, destination: impl Into<String>, body: String) {
        self.send(ClientFrame::Send {
            destination: destination.into(),
            body,
        });
    }

    /// Requests a graceful socket close. The worker emits
    /// [`TransportEvent::Closed`] once the close completes.
    pub fn close(&mut self) {
        self.frame_tx = None;
    }
}

/// Opens a transport to `url`.
///
/// Returns immediately; the dial happens on the worker task and its outcome
/// arrives as [`TransportEvent::Established`] or [`TransportEvent::Error`].
pub fn open(url: String) -> (TransportHandle, mpsc::UnboundedReceiver<TransportEvent>) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::spawn(transport_worker(url, frame_rx, event_tx));

    (
        TransportHandle {
            frame_tx: Some(frame_tx),
        },
        event_rx,
    )
}

async fn transport_worker(
    url: String,
    mut frame_rx: mpsc::UnboundedReceiver<ClientFrame>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(err) => {
            let _ = event_tx.send(TransportEvent::Error(err.into()));
            return;
        }
    };

    loop {
        tokio::select! {
            maybe_outbound = frame_rx.recv() => {
                match maybe_outbound {
                    Some(frame) => {
                        let text = match frame.to_text() {
                            Ok(text) => text,
                            Err(err) => {
                                warn!(event = "frame_encode_failed", error = %err);
                                continue;
                            }
                        };
                        if let Err(err) = socket.send(Message::Text(text.into())).await {
                            let _ = event_tx.send(TransportEvent::Error(err.into()));
                            return;
                        }
                    }
                    None => {
                        let _ = socket.close(None).await;
                        let _ = event_tx.send(TransportEvent::Closed);
                        return;
                    }
                }
            }
            maybe_inbound = socket.next() => {
                match maybe_inbound {
                    Some(Ok(Message::Text(text))) => {
                        match BrokerFrame::from_text(text.as_str()) {
                            Ok(BrokerFrame::Connected) => {
                                let _ = event_tx.send(TransportEvent::Established);
                            }
                            Ok(BrokerFrame::Message { destination, body }) => {
                                let _ = event_tx.send(TransportEvent::Frame { destination, body });
                            }
                            Ok(BrokerFrame::Error { message }) => {
                                let _ = event_tx
                                    .send(TransportEvent::Error(ChatClientError::Protocol(message)));
                                return;
                            }
                            Err(err) => {
                                // Single malformed frame: drop it, keep the session.
                                warn!(event = "frame_decode_failed", error = %err);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = socket.send(Message::Pong(payload)).await {
                            let _ = event_tx.send(TransportEvent::Error(err.into()));
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        let _ = event_tx.send(TransportEvent::Closed);
                        return;
                    }
                    Some(Ok(_)) => {
                        warn!(event = "unexpected_binary_frame");
                    }
                    Some(Err(err)) => {
                        let _ = event_tx.send(TransportEvent::Error(err.into()));
                        return;
                    }
                    None => {
                        let _ = event_tx.send(TransportEvent::Closed);
                        return;
                    }
                }
            }
        }
    }
}
