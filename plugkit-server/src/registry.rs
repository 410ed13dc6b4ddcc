use crate::error::InitError;
use crate::plugin::Plugin;
use crate::service::ServiceServer;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Attach every named plugin to the server, in lexicographic name order.
///
/// Fail-fast: the first plugin that lacks the attach capability, or whose
/// own attach logic fails, aborts registration with an error naming it.
/// Plugins after the offending one are not visited, so a failed result
/// means the server must be discarded, not served.
pub fn register_all(
    server: &mut ServiceServer,
    plugins: &BTreeMap<String, Arc<dyn Plugin>>,
) -> Result<(), InitError> {
    for (name, plugin) in plugins {
        let rpc = plugin
            .rpc()
            .ok_or_else(|| InitError::NotAttachable(name.clone()))?;
        rpc.attach_to_server(server)
            .map_err(|source| InitError::Register {
                name: name.clone(),
                source,
            })?;
        debug!(plugin = %name, "plugin attached");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::plugin::RpcPlugin;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NamedPlugin {
        service: &'static str,
        attached: Arc<AtomicBool>,
    }

    impl NamedPlugin {
        fn new(service: &'static str) -> (Arc<Self>, Arc<AtomicBool>) {
            let attached = Arc::new(AtomicBool::new(false));
            let plugin = Arc::new(Self {
                service,
                attached: attached.clone(),
            });
            (plugin, attached)
        }
    }

    impl Plugin for NamedPlugin {
        fn rpc(&self) -> Option<&dyn RpcPlugin> {
            Some(self)
        }
    }

    impl RpcPlugin for NamedPlugin {
        fn attach_to_server(&self, server: &mut ServiceServer) -> Result<(), BoxError> {
            self.attached.store(true, Ordering::SeqCst);
            server.register_service(self.service, Arc::new(NullService));
            Ok(())
        }
    }

    struct NullService;

    #[async_trait::async_trait]
    impl crate::service::RpcService for NullService {
        async fn call(
            &self,
            _member: &str,
            _args: Vec<serde_json::Value>,
        ) -> Result<serde_json::Value, BoxError> {
            Ok(serde_json::Value::Null)
        }
    }

    /// A handle without the attach capability.
    struct OpaquePlugin;

    impl Plugin for OpaquePlugin {}

    struct FailingPlugin;

    impl Plugin for FailingPlugin {
        fn rpc(&self) -> Option<&dyn RpcPlugin> {
            Some(self)
        }
    }

    impl RpcPlugin for FailingPlugin {
        fn attach_to_server(&self, _server: &mut ServiceServer) -> Result<(), BoxError> {
            Err("attach exploded".into())
        }
    }

    #[test]
    fn registers_every_attachable_plugin() {
        let mut server = ServiceServer::new(Vec::new());
        let (alpha, _) = NamedPlugin::new("alpha-service");
        let (beta, _) = NamedPlugin::new("beta-service");

        let mut plugins: BTreeMap<String, Arc<dyn Plugin>> = BTreeMap::new();
        plugins.insert("alpha".to_string(), alpha);
        plugins.insert("beta".to_string(), beta);

        register_all(&mut server, &plugins).expect("registration succeeds");
        assert!(server.has_service("alpha-service"));
        assert!(server.has_service("beta-service"));
    }

    #[test]
    fn fails_fast_on_missing_capability() {
        let mut server = ServiceServer::new(Vec::new());
        let (early, early_attached) = NamedPlugin::new("early-service");
        let (late, late_attached) = NamedPlugin::new("late-service");

        let mut plugins: BTreeMap<String, Arc<dyn Plugin>> = BTreeMap::new();
        plugins.insert("aaa".to_string(), early);
        plugins.insert("bad".to_string(), Arc::new(OpaquePlugin));
        plugins.insert("zzz".to_string(), late);

        let err = register_all(&mut server, &plugins).unwrap_err();
        assert!(matches!(err, InitError::NotAttachable(ref name) if name == "bad"));
        assert!(err.to_string().contains("bad"));

        // Lexicographic order: "aaa" attached before the failure, "zzz" never visited.
        assert!(early_attached.load(Ordering::SeqCst));
        assert!(!late_attached.load(Ordering::SeqCst));
    }

    #[test]
    fn wraps_attach_failure_with_plugin_name() {
        let mut server = ServiceServer::new(Vec::new());
        let mut plugins: BTreeMap<String, Arc<dyn Plugin>> = BTreeMap::new();
        plugins.insert("broken".to_string(), Arc::new(FailingPlugin));

        let err = register_all(&mut server, &plugins).unwrap_err();
        assert_eq!(err.plugin_name(), "broken");
        let source = std::error::Error::source(&err).expect("underlying error preserved");
        assert_eq!(source.to_string(), "attach exploded");
    }
}
