use std::{future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::Error,
    protocol::{AuthorityMessage, ClientMessage},
    timer::Timer,
    transport::{Channel, Inbound, Transport},
};

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8000/ws";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    Open,
    /// Waiting for the retry timer.
    Reconnecting,
    /// Torn down. Terminal.
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: Url,
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"))
    }
}

/// What [`ConnectionManager::next_event`] observed.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConnectionEvent {
    /// Handshake succeeded and `get_state` was sent. State is `Open`.
    Opened,
    /// One well-formed state update from the authority.
    Message(AuthorityMessage),
    /// The open session ended. State is `Reconnecting`.
    Disconnected { error: Option<Error> },
    /// A connection attempt failed. State is `Reconnecting`.
    AttemptFailed(Error),
    /// The retry timer fired and a new attempt started. State is `Connecting`.
    Retrying,
}

/// Where move commands go.
pub trait AuthoritySink {
    /// Sends `message` if the connection is open. Never queues: any other
    /// state fails with [`Error::NotConnected`].
    fn send(&mut self, message: &ClientMessage) -> Result<(), Error>;
}

type Attempt = BoxFuture<'static, Result<Channel, Error>>;

/// Owner of the single logical connection to the authority.
///
/// Holds at most one in-flight attempt, one open channel and one pending
/// retry timer. Nothing happens until [`next_event`](Self::next_event) is
/// polled; the caller drives it from one task.
pub struct ConnectionManager {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    attempt: Option<Attempt>,
    channel: Option<Channel>,
    retry: Timer,
    attempts_started: u64,
    retries_scheduled: u64,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.config.endpoint.as_str())
            .field("state", &self.state)
            .field("attempt_in_flight", &self.attempt.is_some())
            .field("retry_pending", &self.retry.is_pending())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates the manager in `Connecting` with its first attempt armed.
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let mut this = Self {
            config,
            transport,
            state: ConnectionState::Connecting,
            attempt: None,
            channel: None,
            retry: Timer::default(),
            attempts_started: 0,
            retries_scheduled: 0,
        };
        this.start_attempt();
        this
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &Url {
        &self.config.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn has_pending_retry(&self) -> bool {
        self.retry.is_pending()
    }

    pub fn attempts_started(&self) -> u64 {
        self.attempts_started
    }

    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled
    }

    /// Starts an attempt now. No-op while `Connecting` or `Open`, and after
    /// teardown. While `Reconnecting` the pending retry is cancelled and
    /// replaced by an immediate attempt. Returns `true` if an attempt was
    /// started.
    pub fn connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => false,
            ConnectionState::Closed => {
                warn!("connect requested after teardown, ignoring");
                false
            }
            ConnectionState::Reconnecting => {
                self.retry.cancel();
                self.start_attempt();
                true
            }
        }
    }

    /// Sends `message` if `Open`; fails with [`Error::NotConnected`]
    /// otherwise.
    pub fn send(&mut self, message: &ClientMessage) -> Result<(), Error> {
        if self.state != ConnectionState::Open {
            return Err(Error::NotConnected);
        }
        let channel = self.channel.as_ref().ok_or(Error::NotConnected)?;
        debug!(?message, "sending");
        channel.send(message.to_text())
    }

    /// Waits for the next connection-level event and applies the matching
    /// state transition before returning it.
    ///
    /// Malformed or unknown messages are logged and dropped here; the
    /// session stays open. Never resolves after teardown.
    ///
    /// Cancel safe.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            tokio::select! {
                result = attempt_finished(&mut self.attempt) => {
                    self.attempt = None;
                    return match result {
                        Ok(channel) => self.on_open(channel),
                        Err(e) => {
                            warn!(endpoint = %self.config.endpoint, error = %e, "connection attempt failed");
                            self.schedule_retry();
                            ConnectionEvent::AttemptFailed(e)
                        }
                    };
                }
                inbound = next_inbound(&mut self.channel) => match inbound {
                    Inbound::Text(text) => match AuthorityMessage::from_text(&text) {
                        Ok(message) => {
                            debug!(?message, "received");
                            return ConnectionEvent::Message(message);
                        }
                        Err(e) => {
                            warn!(error = %e, "dropping message from authority");
                            continue;
                        }
                    },
                    Inbound::Closed => {
                        info!(endpoint = %self.config.endpoint, "connection closed by authority");
                        return self.on_session_end(None);
                    }
                    Inbound::Error(e) => {
                        warn!(endpoint = %self.config.endpoint, error = %e, "connection failed");
                        return self.on_session_end(Some(e));
                    }
                },
                () = self.retry.expired() => {
                    self.retry.cancel();
                    self.start_attempt();
                    return ConnectionEvent::Retrying;
                }
            }
        }
    }

    /// Cancels the retry timer, drops any in-flight attempt and closes the
    /// session. No reconnection follows.
    pub fn teardown(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.retry.cancel();
        self.attempt = None;
        if self.channel.take().is_some() {
            debug!("closing open session");
        }
        self.state = ConnectionState::Closed;
        info!(endpoint = %self.config.endpoint, "connection torn down");
    }

    fn start_attempt(&mut self) {
        debug_assert!(self.attempt.is_none());
        debug_assert!(self.channel.is_none());
        self.attempts_started += 1;
        self.state = ConnectionState::Connecting;
        info!(
            endpoint = %self.config.endpoint,
            attempt = self.attempts_started,
            "connecting"
        );
        let transport = self.transport.clone();
        let endpoint = self.config.endpoint.clone();
        self.attempt = Some(Box::pin(async move { transport.connect(&endpoint).await }));
    }

    fn on_open(&mut self, channel: Channel) -> ConnectionEvent {
        if let Err(e) = channel.send(ClientMessage::GetState.to_text()) {
            warn!(error = %e, "session ended during handshake");
            self.schedule_retry();
            return ConnectionEvent::AttemptFailed(e);
        }
        self.channel = Some(channel);
        self.state = ConnectionState::Open;
        info!(endpoint = %self.config.endpoint, "connection open");
        ConnectionEvent::Opened
    }

    fn on_session_end(&mut self, error: Option<Error>) -> ConnectionEvent {
        self.channel = None;
        self.schedule_retry();
        ConnectionEvent::Disconnected { error }
    }

    fn schedule_retry(&mut self) {
        self.state = ConnectionState::Reconnecting;
        if self.retry.cancel() {
            debug!("replacing pending retry timer");
        }
        self.retry.schedule(self.config.reconnect_delay);
        self.retries_scheduled += 1;
        info!(
            delay_ms = self.config.reconnect_delay.as_millis() as u64,
            "reconnect scheduled"
        );
    }
}

impl AuthoritySink for ConnectionManager {
    fn send(&mut self, message: &ClientMessage) -> Result<(), Error> {
        ConnectionManager::send(self, message)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn attempt_finished(attempt: &mut Option<Attempt>) -> Result<Channel, Error> {
    match attempt {
        Some(attempt) => attempt.await,
        None => future::pending().await,
    }
}

async fn next_inbound(channel: &mut Option<Channel>) -> Inbound {
    match channel {
        Some(channel) => channel.recv().await,
        None => future::pending().await,
    }
}
