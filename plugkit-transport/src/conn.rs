use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls handshake failed: {0}")]
    Handshake(std::io::Error),
}

/// A server-side connection, either plaintext TCP or TLS over TCP.
///
/// Lets the accept loop and anything layered above it handle one stream type
/// regardless of whether transport security was configured.
#[derive(Debug)]
pub enum ServerConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ServerConnection {
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            ServerConnection::Plain(stream) => stream.peer_addr(),
            ServerConnection::Tls(stream) => stream.get_ref().0.peer_addr(),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, ServerConnection::Tls(_))
    }
}

/// Upgrade a freshly accepted TCP stream.
///
/// With an acceptor the TLS handshake is driven to completion before the
/// connection is handed out; without one the stream passes through as
/// plaintext.
pub async fn accept(
    stream: TcpStream,
    tls: Option<&TlsAcceptor>,
) -> Result<ServerConnection, TransportError> {
    match tls {
        None => Ok(ServerConnection::Plain(stream)),
        Some(acceptor) => {
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(TransportError::Handshake)?;
            debug!(peer = ?tls_stream.get_ref().0.peer_addr().ok(), "tls handshake complete");
            Ok(ServerConnection::Tls(Box::new(tls_stream)))
        }
    }
}

impl AsyncRead for ServerConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ServerConnection::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            ServerConnection::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ServerConnection::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            ServerConnection::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ServerConnection::Plain(stream) => Pin::new(stream).poll_flush(cx),
            ServerConnection::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ServerConnection::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            ServerConnection::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
