use std::{fmt, time::Duration};

use armsync::{async_trait, Channel, Error, Inbound, Transport};
use futures::{SinkExt, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WebSocketTransportConfig {
    /// A handshake that takes longer fails the attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for WebSocketTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Opens one WebSocket session per [`Transport::connect`] call.
///
/// Each session is served by its own pump task, which owns the socket and
/// ends when either side closes.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketTransportConfig,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketTransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebSocketTransportConfig {
        &self.config
    }
}

fn map_connection_error<E: fmt::Display>(url: &Url) -> impl FnOnce(E) -> Error + '_ {
    move |e: E| Error::Transport {
        message: format!("url:{url}: {e}"),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &Url) -> Result<Channel, Error> {
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::Transport {
                message: format!("url:{endpoint}: unsupported scheme `{}`", endpoint.scheme()),
            });
        }
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (ws, _response) = tokio::time::timeout(timeout, connect_async(endpoint.as_str()))
            .await
            .map_err(|_| Error::Transport {
                message: format!("url:{endpoint}: handshake timed out after {timeout:?}"),
            })?
            .map_err(map_connection_error(endpoint))?;
        debug!(%endpoint, "websocket handshake done");

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, endpoint.clone(), outgoing_rx, incoming_tx));
        Ok(Channel::new(outgoing_tx, incoming_rx))
    }
}

async fn pump(
    ws: WsStream,
    endpoint: Url,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<Inbound>,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            text = outgoing.recv() => {
                let Some(text) = text else {
                    // Channel dropped by the client.
                    debug!(%endpoint, "closing websocket");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(%endpoint, error = %e, "close frame not sent");
                    }
                    return;
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    let _ = incoming.send(Inbound::Error(map_connection_error(&endpoint)(e)));
                    return;
                }
            }
            frame = read.next() => {
                let inbound = match frame {
                    Some(Ok(Message::Text(text))) => Inbound::Text(text),
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong; flushing sends it.
                        if let Err(e) = write.flush().await {
                            let _ = incoming.send(Inbound::Error(map_connection_error(&endpoint)(e)));
                            return;
                        }
                        continue;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        warn!(%endpoint, len = bytes.len(), "ignoring binary frame");
                        continue;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(%endpoint, ?frame, "close frame received");
                        let _ = incoming.send(Inbound::Closed);
                        return;
                    }
                    Some(Err(e)) => {
                        let _ = incoming.send(Inbound::Error(map_connection_error(&endpoint)(e)));
                        return;
                    }
                    None => {
                        let _ = incoming.send(Inbound::Closed);
                        return;
                    }
                };
                if incoming.send(inbound).is_err() {
                    // Receiver gone; outgoing.recv() reports it next.
                    debug!(%endpoint, "client stopped listening");
                }
            }
        }
    }
}
