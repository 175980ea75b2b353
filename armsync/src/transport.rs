mod dummy_transport;

pub use dummy_transport::*;

use async_trait::async_trait;
use auto_impl::auto_impl;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;

/// Something received from an open session.
#[derive(Debug)]
pub enum Inbound {
    Text(String),
    /// The session ended normally.
    Closed,
    /// The session failed.
    Error(Error),
}

/// One open session with the authority.
///
/// Dropping the channel closes the session.
#[derive(Debug)]
pub struct Channel {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<Inbound>,
}

impl Channel {
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Creates a channel connected to an in-memory peer.
    pub fn pair() -> (Self, ChannelPeer) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        (
            Self::new(outgoing_tx, incoming_rx),
            ChannelPeer {
                received: outgoing_rx,
                sender: incoming_tx,
            },
        )
    }

    /// Hands `text` to the session. Fails with [`Error::NotConnected`] if the
    /// session is already gone; nothing is queued in that case.
    pub fn send(&self, text: String) -> Result<(), Error> {
        self.outgoing.send(text).map_err(|_| Error::NotConnected)
    }

    /// Waits for the next inbound item. A session that vanished without a
    /// close reports [`Inbound::Closed`].
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Inbound {
        self.incoming.recv().await.unwrap_or(Inbound::Closed)
    }
}

/// The far end of a [`Channel`], used by transports and tests.
#[derive(Debug)]
pub struct ChannelPeer {
    received: mpsc::UnboundedReceiver<String>,
    sender: mpsc::UnboundedSender<Inbound>,
}

impl ChannelPeer {
    /// Next text the client sent, or `None` once the client dropped its
    /// channel.
    pub async fn recv(&mut self) -> Option<String> {
        self.received.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.received.try_recv().ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.sender.send(Inbound::Text(text.into())).is_ok()
    }

    pub fn send(&self, inbound: Inbound) -> bool {
        self.sender.send(inbound).is_ok()
    }

    pub fn close(self) {
        let _ = self.sender.send(Inbound::Closed);
    }

    pub fn fail(self, message: impl Into<String>) {
        let _ = self.sender.send(Inbound::Error(Error::transport(message)));
    }

    /// `true` once the client side has dropped its channel.
    pub fn is_client_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Opens sessions with the authority.
#[async_trait]
#[auto_impl(Box, Arc)]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &Url) -> Result<Channel, Error>;
}
