//! Byte transports the engine runs over.
//!
//! A [`Context`](crate::Context) owns exactly one [`Transport`]. Datagram
//! transports (UDP, DTLS) deliver one CoAP message per `recv`; stream
//! transports (TCP, TLS) deliver one complete RFC 8323 frame per `recv`.
use std::fmt;
use std::io::Result as IoResult;
use std::net::SocketAddr;

use async_trait::async_trait;

pub mod stream;
pub mod udp;

#[cfg(feature = "dtls")]
pub mod dtls;
#[cfg(feature = "tls")]
pub mod tls;

pub use stream::{StreamCodec, StreamTransport};
pub use udp::UdpTransport;

/// Wire protocol of a transport. The discriminant doubles as the
/// transaction id of stream transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp = 0,
    Dtls = 1,
    Tcp = 2,
    Tls = 3,
}

impl TransportKind {
    pub fn is_stream(self) -> bool {
        matches!(self, TransportKind::Tcp | TransportKind::Tls)
    }

    pub fn is_datagram(self) -> bool {
        !self.is_stream()
    }

    pub fn is_secure(self) -> bool {
        matches!(self, TransportKind::Dtls | TransportKind::Tls)
    }

    pub fn scheme(self) -> &'static str {
        match self {
            TransportKind::Udp => "coap",
            TransportKind::Dtls => "coaps",
            TransportKind::Tcp => "coap+tcp",
            TransportKind::Tls => "coaps+tcp",
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<TransportKind> {
        match scheme {
            "coap" => Some(TransportKind::Udp),
            "coaps" => Some(TransportKind::Dtls),
            "coap+tcp" => Some(TransportKind::Tcp),
            "coaps+tcp" => Some(TransportKind::Tls),
            _ => None,
        }
    }

    /// Kind selected by the scheme prefix of `uri`, e.g. `coaps+tcp://host`.
    pub fn from_uri(uri: &str) -> Option<TransportKind> {
        let (scheme, _) = uri.split_once("://")?;
        TransportKind::from_scheme(scheme)
    }

    pub fn default_port(self) -> u16 {
        if self.is_secure() {
            5684
        } else {
            5683
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Metadata of one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvInfo {
    pub len: usize,
    pub remote: SocketAddr,
    /// Address the frame was received on, if the transport knows it.
    pub local: Option<SocketAddr>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn local_addr(&self) -> IoResult<SocketAddr>;

    /// Sends one encoded message. Connected transports ignore `dst`.
    async fn send_to(&self, buf: &[u8], dst: &SocketAddr) -> IoResult<usize>;

    /// Receives one message into `buf`.
    async fn recv(&self, buf: &mut [u8]) -> IoResult<RecvInfo>;

    async fn close(&self) -> IoResult<()>;
}
