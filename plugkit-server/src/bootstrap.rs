use crate::error::InitError;
use crate::handshake::HandshakeConfig;
use crate::plugin::Plugin;
use crate::registry;
use crate::security;
use crate::service::{default_server, ServerFactory, ServerOption, ServiceServer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// An auxiliary byte-stream source (the plugin's captured stdout or stderr).
///
/// The bootstrap never reads these; it hands them to an external relay that
/// forwards their bytes over the addresses advertised in the handshake
/// configuration.
pub type AuxStream = Box<dyn AsyncRead + Send + Unpin>;

/// What happens to the accept loop when the done signal fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownBehavior {
    /// Cancel the accept loop and wait for it to wind down before
    /// [`ReadyServer::serve`] returns, so no connection is accepted
    /// afterwards. In-flight connections drain on their own tasks.
    #[default]
    StopAccepting,
    /// Return as soon as the done signal fires and leave the accept loop
    /// running until the process exits. Whoever fires the signal owns any
    /// further teardown.
    Detach,
}

/// Builder for a [`PluginServer`].
pub struct PluginServerBuilder {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
    factory: ServerFactory,
    tls: Option<Arc<rustls::ServerConfig>>,
    stdout: Option<AuxStream>,
    stderr: Option<AuxStream>,
    shutdown: ShutdownBehavior,
}

impl PluginServerBuilder {
    pub fn new() -> Self {
        Self {
            plugins: BTreeMap::new(),
            factory: Box::new(default_server),
            tls: None,
            stdout: None,
            stderr: None,
            shutdown: ShutdownBehavior::default(),
        }
    }

    /// Add a named plugin. Names are unique; adding the same name twice
    /// keeps the later handle.
    pub fn plugin(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        let name = name.into();
        if self.plugins.insert(name.clone(), plugin).is_some() {
            warn!(plugin = %name, "plugin name supplied twice, keeping the later handle");
        }
        self
    }

    /// Replace the default server factory.
    pub fn server_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Vec<ServerOption>) -> ServiceServer + Send + 'static,
    {
        self.factory = Box::new(factory);
        self
    }

    /// Supply transport-security configuration. Without it the server
    /// accepts plaintext connections.
    pub fn tls_config(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Attach the plugin's captured stdout source for the external relay.
    pub fn stdout(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(reader));
        self
    }

    /// Attach the plugin's captured stderr source for the external relay.
    pub fn stderr(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(reader));
        self
    }

    pub fn on_shutdown(mut self, behavior: ShutdownBehavior) -> Self {
        self.shutdown = behavior;
        self
    }

    /// Finish construction. `done` is the single-use shutdown signal: one
    /// external writer cancels it, the server only awaits it.
    pub fn build(self, done: CancellationToken) -> PluginServer {
        PluginServer {
            plugins: self.plugins,
            factory: self.factory,
            tls: self.tls,
            stdout: self.stdout,
            stderr: self.stderr,
            shutdown: self.shutdown,
            done,
        }
    }
}

impl Default for PluginServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginServerBuilder")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("secure", &self.tls.is_some())
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

/// A configured-but-uninitialized plugin server.
///
/// [`PluginServer::init`] consumes it, so double initialization and
/// serve-before-init cannot be expressed; a failed `init` consumes the
/// bootstrap for good and the process is expected to exit.
pub struct PluginServer {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
    factory: ServerFactory,
    tls: Option<Arc<rustls::ServerConfig>>,
    stdout: Option<AuxStream>,
    stderr: Option<AuxStream>,
    shutdown: ShutdownBehavior,
    done: CancellationToken,
}

impl PluginServer {
    pub fn builder() -> PluginServerBuilder {
        PluginServerBuilder::new()
    }

    /// Construct the server instance and register every plugin onto it.
    ///
    /// The transport-security resolver runs first, so the factory sees the
    /// credentials option when TLS was configured. Registration is
    /// fail-fast; see [`registry::register_all`].
    pub fn init(self) -> Result<ReadyServer, InitError> {
        let options = security::transport_options(self.tls.as_ref());
        let mut server = (self.factory)(options);
        registry::register_all(&mut server, &self.plugins)?;

        info!(
            plugins = self.plugins.len(),
            secure = server.is_secure(),
            "plugin server initialized"
        );
        Ok(ReadyServer {
            server,
            handshake: HandshakeConfig::default(),
            stdout: self.stdout,
            stderr: self.stderr,
            shutdown: self.shutdown,
            done: self.done,
        })
    }
}

impl fmt::Debug for PluginServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginServer")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("secure", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

/// An initialized plugin server: every plugin registered, ready to emit its
/// handshake line and to serve a listener.
pub struct ReadyServer {
    server: ServiceServer,
    handshake: HandshakeConfig,
    stdout: Option<AuxStream>,
    stderr: Option<AuxStream>,
    shutdown: ShutdownBehavior,
    done: CancellationToken,
}

impl ReadyServer {
    /// Record the relay endpoints for the auxiliary streams. Called by the
    /// external relay once it has bound them, before the handshake line is
    /// emitted.
    pub fn set_stream_addrs(
        &mut self,
        stdout_addr: impl Into<String>,
        stderr_addr: impl Into<String>,
    ) {
        self.handshake.stdout_addr = stdout_addr.into();
        self.handshake.stderr_addr = stderr_addr.into();
    }

    pub fn handshake(&self) -> &HandshakeConfig {
        &self.handshake
    }

    /// The handshake configuration line for the supervisor. Idempotent; a
    /// pure function of the recorded stream addresses.
    pub fn handshake_line(&self) -> String {
        self.handshake.encode()
    }

    pub fn server(&self) -> &ServiceServer {
        &self.server
    }

    /// Hand the captured stdout source to the external relay.
    pub fn take_stdout(&mut self) -> Option<AuxStream> {
        self.stdout.take()
    }

    /// Hand the captured stderr source to the external relay.
    pub fn take_stderr(&mut self) -> Option<AuxStream> {
        self.stderr.take()
    }

    /// Serve the listener until the done signal fires.
    ///
    /// The accept loop runs on its own task while this call suspends on the
    /// done signal. Consuming `self` makes this the terminal operation: one
    /// listener, served at most once. What happens to the accept loop on
    /// shutdown is governed by [`ShutdownBehavior`].
    pub async fn serve(self, listener: TcpListener) {
        let accept_token = CancellationToken::new();
        let accept_loop = tokio::spawn(self.server.serve(listener, accept_token.clone()));

        self.done.cancelled().await;

        match self.shutdown {
            ShutdownBehavior::StopAccepting => {
                accept_token.cancel();
                if let Err(error) = accept_loop.await {
                    warn!(%error, "accept loop task failed during shutdown");
                }
            }
            ShutdownBehavior::Detach => {
                info!("done signal fired, detaching from accept loop");
            }
        }
    }
}

impl fmt::Debug for ReadyServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyServer")
            .field("server", &self.server)
            .field("handshake", &self.handshake)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}
