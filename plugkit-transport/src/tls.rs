use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read PEM material: {0}")]
    Io(#[from] std::io::Error),
    #[error("no certificate found in PEM input")]
    MissingCertificate,
    #[error("no private key found in PEM input")]
    MissingKey,
    #[error("certificate or key rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// A server-side TLS identity: certificate chain plus private key.
///
/// This is the credential material a host hands to a plugin process so the
/// transport can be encrypted. Building one does not validate that the key
/// matches the chain; that happens in [`TlsIdentity::into_server_config`].
#[derive(Debug)]
pub struct TlsIdentity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Load an identity from PEM-encoded certificate and key files.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, TlsError> {
        let mut cert_reader = BufReader::new(File::open(cert_path)?);
        let mut key_reader = BufReader::new(File::open(key_path)?);
        let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
        let key = rustls_pemfile::private_key(&mut key_reader)?;
        Self::from_parts(certs, key)
    }

    /// Load an identity from in-memory PEM bytes.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let mut cert_reader = BufReader::new(cert_pem);
        let mut key_reader = BufReader::new(key_pem);
        let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
        let key = rustls_pemfile::private_key(&mut key_reader)?;
        Self::from_parts(certs, key)
    }

    fn from_parts(
        certs: Vec<CertificateDer<'static>>,
        key: Option<PrivateKeyDer<'static>>,
    ) -> Result<Self, TlsError> {
        if certs.is_empty() {
            return Err(TlsError::MissingCertificate);
        }
        let key = key.ok_or(TlsError::MissingKey)?;
        Ok(Self { certs, key })
    }

    /// Build the rustls server configuration for this identity.
    ///
    /// Client certificates are not requested; the plugin handshake model
    /// authenticates the supervisor out of band.
    pub fn into_server_config(self) -> Result<Arc<rustls::ServerConfig>, TlsError> {
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(self.certs, self.key)?;
        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed_pem() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("self-signed generation");
        (certified.cert.pem(), certified.signing_key.serialize_pem())
    }

    #[test]
    fn loads_identity_from_pem_bytes() {
        let (cert_pem, key_pem) = self_signed_pem();
        let identity = TlsIdentity::from_pem(cert_pem.as_bytes(), key_pem.as_bytes())
            .expect("identity loads");
        identity.into_server_config().expect("server config builds");
    }

    #[test]
    fn missing_certificate_is_rejected() {
        let (_, key_pem) = self_signed_pem();
        let err = TlsIdentity::from_pem(b"", key_pem.as_bytes()).unwrap_err();
        assert!(matches!(err, TlsError::MissingCertificate));
    }

    #[test]
    fn missing_key_is_rejected() {
        let (cert_pem, _) = self_signed_pem();
        let err = TlsIdentity::from_pem(cert_pem.as_bytes(), b"").unwrap_err();
        assert!(matches!(err, TlsError::MissingKey));
    }
}
