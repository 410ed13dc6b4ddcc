use crate::error::BoxError;
use crate::service::ServiceServer;

/// A named plugin handle as supplied by the host process.
///
/// A plugin advertises the protocols it can serve through capability
/// accessors. Today the only capability is [`RpcPlugin`]; a handle that
/// returns `None` from [`Plugin::rpc`] cannot be registered onto an rpc
/// server and will fail initialization.
pub trait Plugin: Send + Sync {
    /// The rpc attach capability, if this plugin serves rpc.
    fn rpc(&self) -> Option<&dyn RpcPlugin> {
        None
    }
}

/// The attach capability: a plugin that can register its service surface
/// onto a shared [`ServiceServer`].
pub trait RpcPlugin: Plugin {
    /// Attach this plugin's services to the server under construction.
    ///
    /// Called exactly once per server, single-threaded, before the server
    /// accepts any connection.
    fn attach_to_server(&self, server: &mut ServiceServer) -> Result<(), BoxError>;
}
