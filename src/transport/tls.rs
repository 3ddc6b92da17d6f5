//! TLS support beneath the frame codec.
//!
//! When `ssl_enabled` is set, the TCP stream is wrapped in TLS before any
//! frame crosses it; the codec and the per-frame security transforms are
//! unaware of the wrapping and compose with it.
//!
//! Key material comes from a single PEM bundle at `ks_path`. A server
//! bundle holds the certificate chain and a PKCS#8 private key. A client
//! bundle holds the root certificates to trust; an empty `ks_path` makes
//! the client accept any server certificate, which is only suitable for
//! development and tests.

use crate::config::Config;
use crate::error::{Result, WireError};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig, ServerName};
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, warn};

fn read_bundle(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| WireError::TlsError(format!("failed to read key store {path}: {e}")))
}

/// Build the acceptor for a server from its configured PEM bundle.
pub(crate) fn acceptor(config: &Config) -> Result<TlsAcceptor> {
    let bundle = read_bundle(&config.ks_path)?;

    let cert_chain: Vec<Certificate> = certs(&mut &bundle[..])
        .map_err(|_| WireError::TlsError("failed to parse certificates".to_string()))?
        .into_iter()
        .map(Certificate)
        .collect();
    if cert_chain.is_empty() {
        return Err(WireError::TlsError(format!(
            "no certificates in key store {}",
            config.ks_path
        )));
    }

    let mut keys = pkcs8_private_keys(&mut &bundle[..])
        .map_err(|_| WireError::TlsError("failed to parse private key".to_string()))?;
    let Some(key) = keys.pop() else {
        return Err(WireError::TlsError(format!(
            "no PKCS#8 private key in key store {}",
            config.ks_path
        )));
    };

    let server_config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, PrivateKey(key))
        .map_err(|e| WireError::TlsError(format!("invalid certificate or key: {e}")))?;

    debug!(ks_path = %config.ks_path, "tls acceptor ready");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Upgrade a connected client stream to TLS.
pub(crate) async fn connect_tls(config: &Config, stream: TcpStream) -> Result<ClientTlsStream<TcpStream>> {
    let builder = ClientConfig::builder().with_safe_defaults();

    let client_config = if config.ks_path.is_empty() {
        warn!("no key store configured, accepting any server certificate");
        builder
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth()
    } else {
        let bundle = read_bundle(&config.ks_path)?;
        let roots_der = certs(&mut &bundle[..])
            .map_err(|_| WireError::TlsError("failed to parse root certificates".to_string()))?;

        let mut roots = RootCertStore::empty();
        roots.add_parsable_certificates(&roots_der);
        if roots.is_empty() {
            return Err(WireError::TlsError(format!(
                "no usable root certificates in key store {}",
                config.ks_path
            )));
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    let server_name = ServerName::try_from(config.ip.as_str())
        .map_err(|_| WireError::TlsError(format!("invalid server name {}", config.ip)))?;

    let connector = TlsConnector::from(Arc::new(client_config));
    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| WireError::TlsError(format!("handshake failed: {e}")))
}

/// Write a self-signed certificate plus its PKCS#8 key as one PEM bundle,
/// usable directly as a server `ks_path`. Development and test helper.
pub fn generate_self_signed_bundle(path: impl AsRef<Path>, hosts: &[String]) -> Result<()> {
    let cert = rcgen::generate_simple_self_signed(hosts.to_vec())
        .map_err(|e| WireError::TlsError(format!("certificate generation failed: {e}")))?;

    let mut pem = cert.cert.pem();
    pem.push_str(&cert.signing_key.serialize_pem());
    std::fs::write(path.as_ref(), pem)?;
    Ok(())
}

/// Certificate verifier that trusts everything. Development only.
struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
