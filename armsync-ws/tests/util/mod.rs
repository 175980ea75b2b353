use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use url::Url;

pub(crate) fn port_and_url() -> (u16, Url) {
    let port = portpicker::pick_unused_port().expect("No ports free");
    let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
    (port, url)
}

/// Loopback stand-in for the authority.
pub(crate) struct Authority {
    listener: TcpListener,
}

impl Authority {
    pub(crate) async fn bind(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        Self { listener }
    }

    pub(crate) async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (stream, _) = self.listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }
}
