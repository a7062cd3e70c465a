//! CoAP over DTLS, backed by webrtc-rs's dtls implementation.
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use webrtc_dtls::config::Config as DtlsConfig;
use webrtc_dtls::conn::DTLSConn;
use webrtc_util::conn::{Conn, Listener};

use super::{RecvInfo, Transport, TransportKind};
use crate::error::{Error, Result};

type DynListener = Box<dyn Listener + Send + Sync>;

/// A bound DTLS server socket waiting for its peer.
pub struct DtlsListener {
    inner: DynListener,
}

impl DtlsListener {
    pub async fn bind(addr: SocketAddr, config: DtlsConfig) -> IoResult<DtlsListener> {
        let listener = webrtc_dtls::listener::listen(addr, config)
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, e))?;
        Ok(DtlsListener {
            inner: Box::new(listener),
        })
    }

    pub async fn local_addr(&self) -> IoResult<SocketAddr> {
        self.inner
            .addr()
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, e))
    }

    /// Waits at most `wait` for one peer to complete its handshake.
    pub async fn accept(self, wait: Duration) -> Result<DtlsTransport> {
        let (conn, peer) = timeout(wait, self.inner.accept())
            .await
            .map_err(|_| Error::Timeout("dtls handshake"))?
            .map_err(|e| Error::Handshake(e.to_string()))?;
        let local = conn.local_addr().map_err(|e| Error::Handshake(e.to_string()))?;
        debug!("dtls session established with {}", peer);
        Ok(DtlsTransport {
            conn,
            peer,
            local,
            listener: Some(self.inner),
        })
    }
}

/// One DTLS session.
pub struct DtlsTransport {
    conn: Arc<dyn Conn + Send + Sync>,
    peer: SocketAddr,
    local: SocketAddr,
    // kept open for the lifetime of an accepted session
    listener: Option<DynListener>,
}

impl DtlsTransport {
    /// Runs the client handshake over an already connected connection.
    pub async fn from_connection(
        connection: Arc<dyn Conn + Send + Sync>,
        config: DtlsConfig,
        handshake_timeout: Duration,
    ) -> Result<DtlsTransport> {
        let peer = connection
            .remote_addr()
            .ok_or_else(|| Error::Handshake("connection has no remote address".to_string()))?;
        let local = connection
            .local_addr()
            .map_err(|e| Error::Handshake(e.to_string()))?;
        let conn = timeout(handshake_timeout, DTLSConn::new(connection, config, true, None))
            .await
            .map_err(|_| Error::Timeout("dtls handshake"))?
            .map_err(|e| Error::Handshake(e.to_string()))?;
        Ok(DtlsTransport {
            conn: Arc::new(conn),
            peer,
            local,
            listener: None,
        })
    }

    pub async fn connect(
        peer: SocketAddr,
        config: DtlsConfig,
        handshake_timeout: Duration,
    ) -> Result<DtlsTransport> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        DtlsTransport::from_connection(Arc::new(socket), config, handshake_timeout).await
    }
}

#[async_trait]
impl Transport for DtlsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Dtls
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        Ok(self.local)
    }

    async fn send_to(&self, buf: &[u8], _dst: &SocketAddr) -> IoResult<usize> {
        self.conn
            .send(buf)
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, e))
    }

    async fn recv(&self, buf: &mut [u8]) -> IoResult<RecvInfo> {
        let len = self
            .conn
            .recv(buf)
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, e))?;
        Ok(RecvInfo {
            len,
            remote: self.peer,
            local: Some(self.local),
        })
    }

    async fn close(&self) -> IoResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, e))?;
        if let Some(listener) = &self.listener {
            listener
                .close()
                .await
                .map_err(|e| IoError::new(ErrorKind::Other, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use webrtc_dtls::cipher_suite::CipherSuiteId;

    pub fn get_psk_config() -> DtlsConfig {
        DtlsConfig {
            psk: Some(Arc::new(|_| Ok(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0]))),
            psk_identity_hint: Some("coap-net DTLS Server".as_bytes().to_vec()),
            cipher_suites: vec![CipherSuiteId::Tls_Psk_With_Aes_128_Ccm_8],
            server_name: "localhost".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dtls_psk() {
        let listener = DtlsListener::bind("127.0.0.1:0".parse().unwrap(), get_psk_config())
            .await
            .unwrap();
        let addr = listener.local_addr().await.unwrap();

        let server = tokio::spawn(async move {
            let server = listener.accept(Duration::from_secs(10)).await.unwrap();
            let mut buf = [0u8; 64];
            let info = server.recv(&mut buf).await.unwrap();
            server.send_to(&buf[..info.len], &info.remote).await.unwrap();
            server
        });

        let client = DtlsTransport::connect(addr, get_psk_config(), Duration::from_secs(10))
            .await
            .unwrap();
        client.send_to(b"hello", &addr).await.unwrap();

        let mut buf = [0u8; 64];
        let info = client.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..info.len], b"hello");
        assert_eq!(info.remote, addr);
        assert_eq!(client.kind(), TransportKind::Dtls);

        let _server = server.await.unwrap();
    }
}
