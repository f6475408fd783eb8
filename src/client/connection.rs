//! Connection management for NNTP client
//!
//! This module handles TCP/TLS connection establishment, socket tuning,
//! and server greeting validation. TLS is optional: binary newsgroups are
//! commonly served on both 563 (implicit TLS) and 119 (plaintext).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};

use super::NntpClient;
use super::state::ConnectionState;

/// TLS handshake timeout in seconds
const TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 60;

/// BufReader capacity for streaming large XOVER responses (256KB)
const BUFREADER_CAPACITY: usize = 256 * 1024;

/// TCP receive buffer size; large XOVER responses benefit from fewer ACK
/// round trips on high-latency links (4MB)
const RECV_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Either a plaintext TCP stream or a TLS stream over TCP
///
/// NNTP commands and responses are identical on both transports; only the
/// connection setup differs.
pub(super) enum MaybeTlsStream {
    /// Unencrypted connection (port 119)
    Plain(TcpStream),
    /// Implicit-TLS connection (port 563)
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dangerous certificate verifier that accepts all certificates
///
/// **Security Warning:** This verifier disables all certificate validation,
/// making connections vulnerable to man-in-the-middle attacks. Only use this
/// for testing or with servers you trust on a secure network.
#[derive(Debug)]
pub(super) struct DangerousAcceptAnyCertificate;

impl ServerCertVerifier for DangerousAcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

impl NntpClient {
    /// Connect to the NNTP server
    ///
    /// Establishes a TCP connection, wraps it in TLS when `config.tls` is
    /// set, and validates the server greeting. Does not authenticate - call
    /// [`authenticate`](Self::authenticate) after connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`Error::Io`] - TCP connection fails (DNS resolution, network unreachable, etc.)
    /// - [`Error::Tls`] - TLS handshake fails (invalid certificate, protocol error)
    /// - [`Error::Timeout`] - Connection or handshake times out
    /// - [`Error::Protocol`] - Server rejects the connection
    pub async fn connect(config: Arc<ServerConfig>) -> Result<Self> {
        debug!("Connecting to NNTP server {}:{}", config.host, config.port);

        let tcp_stream = open_tcp(&config).await?;

        let stream = if config.tls {
            let tls_stream = tls_handshake(&config, tcp_stream).await?;
            MaybeTlsStream::Tls(Box::new(tls_stream))
        } else {
            MaybeTlsStream::Plain(tcp_stream)
        };

        let mut client = Self {
            stream: BufReader::with_capacity(BUFREADER_CAPACITY, stream),
            state: ConnectionState::Ready,
            config,
            current_group: None,
            is_broken: false,
        };

        // Read server greeting
        let greeting = client.read_response().await?;
        debug!("Server greeting: {} {}", greeting.code, greeting.message);

        if !greeting.is_success() {
            return Err(Error::Protocol {
                code: greeting.code,
                message: greeting.message,
            });
        }

        Ok(client)
    }
}

/// Open and tune the TCP socket, honoring the configured connect timeout
async fn open_tcp(config: &ServerConfig) -> Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let addr = format!("{}:{}", config.host, config.port);
    let socket_addr = addr
        .to_socket_addrs()
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Failed to resolve address: {}", e),
            ))
        })?
        .next()
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "No address resolved",
            ))
        })?;

    // Create socket with socket2 so buffers can be configured before connect
    use socket2::{Domain, Protocol, Socket, Type};
    let domain = if socket_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(Error::Io)?;

    // TCP_NODELAY for the request/response command pattern
    socket.set_nodelay(true).map_err(Error::Io)?;

    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!(
            "Failed to set receive buffer size to {} bytes: {}",
            RECV_BUFFER_SIZE, e
        );
    }

    // socket2::Socket::connect() is blocking, so run it in a blocking task.
    // Connect BEFORE setting non-blocking mode.
    let connect_timeout = config.timeout;
    let tcp_stream = timeout(
        connect_timeout,
        tokio::task::spawn_blocking(move || -> std::io::Result<std::net::TcpStream> {
            socket.connect(&socket_addr.into())?;
            socket.set_nonblocking(true)?;
            Ok(socket.into())
        }),
    )
    .await
    .map_err(|_| Error::Timeout)?
    .map_err(|e| Error::Io(std::io::Error::other(format!("Task join error: {}", e))))?
    .map_err(Error::Io)?;

    TcpStream::from_std(tcp_stream).map_err(Error::Io)
}

/// Perform the TLS handshake according to the configured trust mode
async fn tls_handshake(config: &ServerConfig, tcp_stream: TcpStream) -> Result<TlsStream<TcpStream>> {
    use tokio_rustls::rustls::crypto::{CryptoProvider, ring};
    let _ = CryptoProvider::install_default(ring::default_provider());

    let tls_config = if config.allow_insecure_tls {
        warn!("TLS certificate validation disabled - connection vulnerable to MITM attacks");
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyCertificate))
            .with_no_client_auth()
    } else {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };

    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(config.host.as_str())
        .map_err(|e| Error::Tls(format!("Invalid domain: {}", e)))?
        .to_owned();

    timeout(
        Duration::from_secs(TLS_HANDSHAKE_TIMEOUT_SECS),
        connector.connect(server_name, tcp_stream),
    )
    .await
    .map_err(|_| Error::Timeout)?
    .map_err(|e| Error::Tls(format!("TLS handshake failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_rustls::rustls::pki_types::{CertificateDer, UnixTime};

    /// Buffer sizing for high-volume overview streaming
    #[test]
    fn test_buffer_size_constants() {
        assert_eq!(BUFREADER_CAPACITY, 256 * 1024);
        assert_eq!(RECV_BUFFER_SIZE, 4 * 1024 * 1024);
    }

    #[test]
    fn test_dangerous_cert_verifier_accepts_any_cert() {
        let verifier = DangerousAcceptAnyCertificate;
        let fake_cert = CertificateDer::from(vec![0u8; 32]);
        let fake_server_name = ServerName::try_from("test.example.com").unwrap();
        let now = UnixTime::now();

        let result = verifier.verify_server_cert(&fake_cert, &[], &fake_server_name, &[], now);

        assert!(
            result.is_ok(),
            "DangerousAcceptAnyCertificate should accept any certificate"
        );
    }

    #[test]
    fn test_dangerous_cert_verifier_supported_schemes() {
        let verifier = DangerousAcceptAnyCertificate;
        let schemes = verifier.supported_verify_schemes();

        assert!(schemes.contains(&SignatureScheme::RSA_PKCS1_SHA256));
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
        assert!(schemes.contains(&SignatureScheme::ED25519));
    }

    #[test]
    fn test_socket_domain_detection() {
        use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

        let ipv4_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 119);
        let ipv6_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)), 119);

        assert!(ipv4_addr.is_ipv4());
        assert!(ipv6_addr.is_ipv6());
    }
}
