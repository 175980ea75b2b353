use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use super::{Channel, ChannelPeer, Transport};
use crate::error::Error;

#[derive(Debug, Default)]
struct DummyTransportState {
    attempts: usize,
    fail_next: usize,
    fail_always: bool,
}

/// In-memory Transport for Debug or Tests.
///
/// Every accepted connection hands its [`ChannelPeer`] to the paired
/// [`DummyAuthority`].
#[derive(Debug, Clone)]
pub struct DummyTransport {
    state: Arc<Mutex<DummyTransportState>>,
    accepted: mpsc::UnboundedSender<ChannelPeer>,
}

/// Authority side of a [`DummyTransport`].
#[derive(Debug)]
pub struct DummyAuthority {
    accepted: mpsc::UnboundedReceiver<ChannelPeer>,
}

impl DummyTransport {
    pub fn new() -> (Self, DummyAuthority) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::default(),
                accepted: accepted_tx,
            },
            DummyAuthority {
                accepted: accepted_rx,
            },
        )
    }

    /// Number of connect calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    /// Makes the next `count` connect calls fail.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().fail_next = count;
    }

    /// Makes every connect call fail until turned off.
    pub fn set_fail_always(&self, fail: bool) {
        self.state.lock().unwrap().fail_always = fail;
    }
}

#[async_trait]
impl Transport for DummyTransport {
    async fn connect(&self, endpoint: &Url) -> Result<Channel, Error> {
        {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;
            debug!(%endpoint, attempt = state.attempts, "dummy connect");
            if state.fail_always {
                return Err(Error::transport(format!("{endpoint}: connection refused")));
            }
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(Error::transport(format!("{endpoint}: connection refused")));
            }
        }
        let (channel, peer) = Channel::pair();
        self.accepted
            .send(peer)
            .map_err(|_| Error::transport(format!("{endpoint}: authority is gone")))?;
        Ok(channel)
    }
}

impl DummyAuthority {
    /// Waits for the next accepted connection.
    pub async fn accept(&mut self) -> Option<ChannelPeer> {
        self.accepted.recv().await
    }

    pub fn try_accept(&mut self) -> Option<ChannelPeer> {
        self.accepted.try_recv().ok()
    }
}
