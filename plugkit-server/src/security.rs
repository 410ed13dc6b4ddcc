use crate::service::ServerOption;
use std::sync::Arc;

/// Resolve the optional transport-security configuration into server
/// construction options.
///
/// Absence is a first-class choice, not a fallback: no configuration means
/// the server accepts plaintext connections and no option is produced.
/// Pure and side-effect free.
pub fn transport_options(tls: Option<&Arc<rustls::ServerConfig>>) -> Vec<ServerOption> {
    match tls {
        Some(config) => vec![ServerOption::TlsCredentials(Arc::clone(config))],
        None => Vec::new(),
    }
}
