//! TLS handshakes on both sides of an intercepted connection.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use super::{IssuedCertificate, TlsError};
use crate::codec::BoxedStream;

const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Performs server-role handshakes with clients and client-role handshakes
/// with origins.
#[derive(Clone)]
pub struct TlsProvider {
    crypto: Arc<CryptoProvider>,
    client_config: Arc<ClientConfig>,
    handshake_timeout: Duration,
}

impl TlsProvider {
    /// Trust the webpki roots plus `extra_roots` when validating origins.
    pub fn new(
        extra_roots: Vec<CertificateDer<'static>>,
        handshake_timeout: Duration,
    ) -> Result<Self, TlsError> {
        let crypto = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        for root in extra_roots {
            roots.add(root)?;
        }

        let mut client_config = ClientConfig::builder_with_provider(Arc::clone(&crypto))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        // bodies are re-framed as HTTP/1.1, so never negotiate h2 upstream
        client_config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];

        Ok(Self {
            crypto,
            client_config: Arc::new(client_config),
            handshake_timeout,
        })
    }

    /// Like [`TlsProvider::new`], reading extra roots from an optional PEM bundle.
    pub fn with_roots_file(
        path: Option<&Path>,
        handshake_timeout: Duration,
    ) -> Result<Self, TlsError> {
        let extra_roots = match path {
            Some(path) => load_pem_roots(path)?,
            None => Vec::new(),
        };
        Self::new(extra_roots, handshake_timeout)
    }

    /// Server-role handshake presenting `certificate` to the client.
    pub async fn accept(
        &self,
        stream: BoxedStream,
        certificate: &IssuedCertificate,
    ) -> Result<BoxedStream, TlsError> {
        let mut config = ServerConfig::builder_with_provider(Arc::clone(&self.crypto))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certificate.chain().to_vec(), certificate.private_key())?;
        config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];

        let acceptor = TlsAcceptor::from(Arc::new(config));
        let tls = tokio::time::timeout(self.handshake_timeout, acceptor.accept(stream))
            .await
            .map_err(|_| TlsError::Timeout(self.handshake_timeout))?
            .map_err(TlsError::Handshake)?;

        Ok(Box::new(tls))
    }

    /// Client-role handshake validating the origin as `host`.
    pub async fn connect(&self, stream: BoxedStream, host: &str) -> Result<BoxedStream, TlsError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TlsError::InvalidServerName(host.to_string()))?;

        let connector = TlsConnector::from(Arc::clone(&self.client_config));
        let tls = tokio::time::timeout(self.handshake_timeout, connector.connect(server_name, stream))
            .await
            .map_err(|_| TlsError::Timeout(self.handshake_timeout))?
            .map_err(TlsError::Handshake)?;

        Ok(Box::new(tls))
    }
}

/// Parse every certificate in a PEM bundle.
pub fn load_pem_roots(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let roots_error = |source| TlsError::Roots {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(roots_error)?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(roots_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DnsEndPoint;
    use crate::tls::policy::certificate_subject;
    use crate::tls::{CertificateAuthority, IssueCertificate};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_handshake_between_both_roles() {
        let ca = CertificateAuthority::generate("Test Root").unwrap();
        let certificate = ca.issue_or_fetch("*.example.com").unwrap();
        let provider = TlsProvider::new(vec![ca.ca_der().clone()], Duration::from_secs(5)).unwrap();

        let (client_side, server_side) = duplex(16 * 1024);
        let server = {
            let provider = provider.clone();
            tokio::spawn(async move {
                let mut stream = provider.accept(Box::new(server_side), &certificate).await.unwrap();
                let mut buf = [0u8; 4];
                stream.read_exact(&mut buf).await.unwrap();
                stream.write_all(&buf).await.unwrap();
                stream.flush().await.unwrap();
                buf
            })
        };

        let mut client = provider.connect(Box::new(client_side), "www.example.com").await.unwrap();
        client.write_all(b"ping").await.unwrap();
        client.flush().await.unwrap();
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).await.unwrap();

        assert_eq!(&echoed, b"ping");
        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_minted_subject_covers_deep_hosts() {
        let ca = CertificateAuthority::generate("Test Root").unwrap();
        let provider = TlsProvider::new(vec![ca.ca_der().clone()], Duration::from_secs(5)).unwrap();

        for host in [
            "example.com",
            "cdn.assets.example.com",
            "bucket.s3.us-east-1.amazonaws.com",
        ] {
            let subject = certificate_subject(&DnsEndPoint::new(host, 443));
            let certificate = ca.issue_or_fetch(&subject).unwrap();

            let (client_side, server_side) = duplex(16 * 1024);
            let acceptor = provider.clone();
            let server = tokio::spawn(async move {
                acceptor.accept(Box::new(server_side), &certificate).await.is_ok()
            });

            let result = provider.connect(Box::new(client_side), host).await;
            assert!(
                result.is_ok(),
                "{host} not covered by {subject}: {:?}",
                result.as_ref().err()
            );
            assert!(server.await.unwrap(), "{host}");
        }
    }

    #[tokio::test]
    async fn test_untrusted_origin_is_rejected() {
        let ca = CertificateAuthority::generate("Untrusted Root").unwrap();
        let certificate = ca.issue_or_fetch("*.example.com").unwrap();
        let provider = TlsProvider::new(Vec::new(), Duration::from_secs(5)).unwrap();

        let (client_side, server_side) = duplex(16 * 1024);
        let acceptor = provider.clone();
        tokio::spawn(async move {
            let _ = acceptor.accept(Box::new(server_side), &certificate).await;
        });

        let result = provider.connect(Box::new(client_side), "www.example.com").await;
        assert!(matches!(result, Err(TlsError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_invalid_server_name() {
        let provider = TlsProvider::new(Vec::new(), Duration::from_secs(5)).unwrap();
        let (stream, _peer) = duplex(64);
        let result = provider.connect(Box::new(stream), "bad name!").await;
        assert!(matches!(result, Err(TlsError::InvalidServerName(_))));
    }
}
