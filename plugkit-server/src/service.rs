use crate::error::BoxError;
use async_trait::async_trait;
use plugkit_transport::ServerConnection;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A named service surface a plugin attaches to the server.
///
/// Method dispatch and wire (de)serialization live in layers above this
/// crate; the bootstrap only guarantees that every registered surface is in
/// place before the first connection is accepted.
#[async_trait]
pub trait RpcService: Send + Sync {
    async fn call(&self, member: &str, args: Vec<Value>) -> Result<Value, BoxError>;
}

/// Options applied when constructing a [`ServiceServer`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ServerOption {
    /// Accept connections over TLS with the given configuration. Without
    /// this option the server accepts plaintext connections.
    TlsCredentials(Arc<rustls::ServerConfig>),
}

/// Factory producing the server instance plugins register against.
///
/// Injected so embedders can construct the server their own way; consumed
/// exactly once during initialization.
pub type ServerFactory = Box<dyn FnOnce(Vec<ServerOption>) -> ServiceServer + Send>;

/// The no-frills factory: a [`ServiceServer`] with exactly the given options.
pub fn default_server(options: Vec<ServerOption>) -> ServiceServer {
    ServiceServer::new(options)
}

/// The shared server instance: a table of named services plus the accept
/// loop that feeds them connections.
///
/// The table is written only during initialization and read-only once the
/// accept loop starts, so it needs no interior locking.
pub struct ServiceServer {
    services: BTreeMap<String, Arc<dyn RpcService>>,
    tls: Option<TlsAcceptor>,
}

impl ServiceServer {
    pub fn new(options: Vec<ServerOption>) -> Self {
        let mut tls = None;
        for option in options {
            match option {
                ServerOption::TlsCredentials(config) => tls = Some(TlsAcceptor::from(config)),
            }
        }
        Self {
            services: BTreeMap::new(),
            tls,
        }
    }

    /// Register a service surface under a name.
    ///
    /// Registering the same name twice replaces the earlier surface; that is
    /// a plugin bug worth seeing in logs, not an initialization abort.
    pub fn register_service(&mut self, name: impl Into<String>, service: Arc<dyn RpcService>) {
        let name = name.into();
        if self.services.insert(name.clone(), service).is_some() {
            warn!(service = %name, "service registered twice, replacing earlier surface");
        } else {
            debug!(service = %name, "service registered");
        }
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn RpcService>> {
        self.services.get(name).cloned()
    }

    /// Whether connections will be upgraded to TLS.
    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Accept connections until the token is cancelled.
    ///
    /// Each accepted stream is upgraded (TLS or plaintext, fixed at
    /// construction) on its own task, so a slow handshake never stalls the
    /// loop. Connection tasks outlive the loop; cancellation only stops new
    /// accepts.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        info!(
            addr = ?listener.local_addr().ok(),
            services = self.services.len(),
            secure = self.is_secure(),
            "accepting plugin connections"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("accept loop stopped");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let tls = self.tls.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, tls).await;
                        });
                    }
                    Err(error) => {
                        warn!(%error, "failed to accept connection");
                    }
                }
            }
        }
    }
}

impl fmt::Debug for ServiceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceServer")
            .field("services", &self.service_names())
            .field("secure", &self.is_secure())
            .finish()
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, tls: Option<TlsAcceptor>) {
    match plugkit_transport::accept(stream, tls.as_ref()).await {
        Ok(conn) => {
            debug!(%peer, tls = conn.is_tls(), "connection established");
            drain(conn, peer).await;
        }
        Err(error) => {
            warn!(%peer, %error, "connection rejected");
        }
    }
}

/// Hold the connection open until the peer goes away. Dispatch layers above
/// this crate take the stream over before any payload matters; the bootstrap
/// itself never interprets the bytes.
async fn drain(mut conn: ServerConnection, peer: SocketAddr) {
    let mut sink = [0u8; 4096];
    loop {
        match conn.read(&mut sink).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(%peer, %error, "connection errored");
                break;
            }
        }
    }
    debug!(%peer, "connection closed");
}
