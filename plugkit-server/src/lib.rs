pub mod bootstrap;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod plugin;
pub mod registry;
pub mod security;
pub mod service;

pub use bootstrap::{AuxStream, PluginServer, PluginServerBuilder, ReadyServer, ShutdownBehavior};
pub use error::{BoxError, InitError};
pub use handshake::{HandshakeConfig, HandshakeError};
pub use logging::{init_logging, init_test_logging};
pub use plugin::{Plugin, RpcPlugin};
pub use registry::register_all;
pub use security::transport_options;
pub use service::{default_server, RpcService, ServerFactory, ServerOption, ServiceServer};
