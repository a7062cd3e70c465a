//! CoAP over TLS, a [`StreamTransport`] running on a rustls session.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rustls::{ClientConfig, ServerConfig, ServerName};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use super::{StreamTransport, TransportKind};
use crate::error::{Error, Result};

/// Accepts one TCP peer and completes the server side handshake, all within `wait`.
pub async fn accept(
    listener: &TcpListener,
    config: Arc<ServerConfig>,
    wait: Duration,
) -> Result<StreamTransport> {
    timeout(wait, async {
        let (tcp, peer) = listener.accept().await?;
        tcp.set_nodelay(true)?;
        let local = tcp.local_addr()?;
        let session = TlsAcceptor::from(config)
            .accept(tcp)
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;
        debug!("tls session established with {}", peer);
        Ok::<_, Error>(StreamTransport::new(session, TransportKind::Tls, local, peer))
    })
    .await
    .map_err(|_| Error::Timeout("tls handshake"))?
}

/// Connects to `peer` and verifies its certificate against `server_name`.
pub async fn connect(
    peer: SocketAddr,
    server_name: &str,
    config: Arc<ClientConfig>,
) -> Result<StreamTransport> {
    let name = ServerName::try_from(server_name).map_err(|e| Error::Handshake(e.to_string()))?;
    let tcp = TcpStream::connect(peer).await?;
    tcp.set_nodelay(true)?;
    let local = tcp.local_addr()?;
    let session = TlsConnector::from(config)
        .connect(name, tcp)
        .await
        .map_err(|e| Error::Handshake(e.to_string()))?;
    Ok(StreamTransport::new(session, TransportKind::Tls, local, peer))
}
