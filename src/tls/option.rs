//! Tls Option

use std::{
    io::{BufReader, Cursor},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::ring,
    pki_types::{CertificateDer, ServerName},
    ClientConfig, RootCertStore, SignatureScheme,
};

use super::TlsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TlsClientOption {
    pub insecure: bool,
    pub alpn: Vec<String>,
    pub enable_sni: bool,
    /// Name checked against the server certificate. Empty means the host of
    /// the server identity.
    pub server_name: String,
    /// Extra PEM encoded roots trusted next to the webpki roots.
    pub ca_certs: Vec<String>,
}

impl Default for TlsClientOption {
    fn default() -> Self {
        Self {
            insecure: false,
            alpn: vec![],
            enable_sni: true,
            server_name: String::new(),
            ca_certs: vec![],
        }
    }
}

impl TlsClientOption {
    pub fn server_name(&self, host: &str) -> Result<ServerName<'static>, TlsError> {
        let name = if self.server_name.is_empty() {
            host
        } else {
            self.server_name.as_str()
        };

        ServerName::try_from(name.to_owned()).map_err(|e| TlsError::InvalidServerName(e.to_string()))
    }

    /// Builds the client config, falling back to `default_alpn` when no ALPN
    /// protocol is configured.
    pub fn client_config(&self, default_alpn: &[&str]) -> Result<ClientConfig, TlsError> {
        let mut config: ClientConfig = self.clone().try_into()?;
        if config.alpn_protocols.is_empty() {
            config.alpn_protocols = default_alpn
                .iter()
                .map(|s| s.as_bytes().to_vec())
                .collect::<Vec<_>>();
        }
        Ok(config)
    }
}

impl TryFrom<TlsClientOption> for rustls::ClientConfig {
    type Error = TlsError;

    fn try_from(opt: TlsClientOption) -> Result<Self, Self::Error> {
        let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()?;

        let mut config = if opt.insecure {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoServerCertVerifier))
                .with_no_client_auth()
        } else {
            let mut root_store = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
            };
            if !opt.ca_certs.is_empty() {
                let mut reader = BufReader::new(Cursor::new(opt.ca_certs.join("\n")));
                for cert in load_certs(&mut reader)? {
                    root_store.add(cert)?;
                }
            }
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        config.enable_sni = opt.enable_sni;

        if !opt.alpn.is_empty() {
            config.alpn_protocols = opt
                .alpn
                .into_iter()
                .map(|s| s.into_bytes())
                .collect::<Vec<_>>();
        }

        Ok(config)
    }
}

pub fn load_certs<R: std::io::Read>(
    reader: &mut BufReader<R>,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TlsError::InvalidCert(e.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::InvalidCert("no certificate found".to_owned()));
    }

    Ok(certs)
}

#[derive(Debug)]
struct NoServerCertVerifier;

impl ServerCertVerifier for NoServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
