pub mod conn;
pub mod tls;

pub use conn::{accept, ServerConnection, TransportError};
pub use tls::{TlsError, TlsIdentity};
