//! TLS material loading.
//!
//! The server only receives PEM bytes; reading the files is the caller's job.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::info;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("invalid certificate pem: {source}")]
    Certificate { source: io::Error },

    #[error("no certificate found in pem")]
    NoCertificate,

    #[error("invalid private key pem: {source}")]
    Key { source: io::Error },

    #[error("no private key found in pem")]
    NoKey,

    #[error("tls config error: {source}")]
    Config {
        #[from]
        source: tokio_rustls::rustls::Error,
    },
}

/// PEM encoded certificate chain, private key and optional CA bundle.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub ca: Option<Vec<u8>>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_len", &self.cert.len())
            .field("ca", &self.ca.is_some())
            .finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Builds the acceptor; the CA bundle, when present, is appended to the served chain.
    ///
    /// # Errors
    ///
    /// Fails when the PEM holds no certificate or no key, or rustls refuses the pair.
    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        let mut chain = parse_certs(&self.cert)?;
        if let Some(ca) = &self.ca {
            chain.extend(parse_certs(ca)?);
        }

        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut self.key.as_slice())
            .map_err(|source| TlsError::Key { source })?
            .ok_or(TlsError::NoKey)?;

        let mut config = ServerConfig::builder().with_no_client_auth().with_single_cert(chain, key)?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        info!(ca = self.ca.is_some(), "tls enabled");
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Certificate { source })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate);
    }
    Ok(certs)
}
