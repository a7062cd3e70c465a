use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use log::debug;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::{RecvInfo, Transport, TransportKind};

/// CoAP over UDP.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpTransport {
    /// Binds a server socket with `SO_REUSEADDR` set.
    pub fn bind(addr: SocketAddr) -> IoResult<UdpTransport> {
        let socket = Socket::new(
            if addr.is_ipv4() {
                Domain::IPV4
            } else {
                Domain::IPV6
            },
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!("udp transport bound to {:?}", socket.local_addr());
        Ok(UdpTransport { socket, peer: None })
    }

    /// Binds an ephemeral port and connects it to `peer`.
    pub async fn connect(peer: SocketAddr) -> IoResult<UdpTransport> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(UdpTransport {
            socket,
            peer: Some(peer),
        })
    }

    pub fn from_socket(socket: UdpSocket) -> UdpTransport {
        let peer = socket.peer_addr().ok();
        UdpTransport { socket, peer }
    }

    /// Binds a socket to the multicast `group` address itself and joins it.
    ///
    /// The socket only sees datagrams sent to the group, and every frame it
    /// receives reports the group as its local address.
    pub fn bind_multicast(group: SocketAddr) -> IoResult<UdpTransport> {
        let transport = UdpTransport::bind(group)?;
        transport.join_multicast(group.ip())?;
        Ok(transport)
    }

    /// Joins a multicast group on the default interface.
    ///
    /// The socket must be bound to `group`. A socket bound elsewhere cannot
    /// tell group traffic from unicast traffic, so the join is refused.
    pub fn join_multicast(&self, group: IpAddr) -> IoResult<()> {
        let bound = self.socket.local_addr()?.ip();
        if !group.is_multicast() || bound != group {
            return Err(IoError::new(
                ErrorKind::InvalidInput,
                format!("socket bound to {} cannot join group {}", bound, group),
            ));
        }
        debug!("joining multicast group {}", group);
        match group {
            IpAddr::V4(group) => self
                .socket
                .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(group) => self.socket.join_multicast_v6(&group, 0),
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send_to(&self, buf: &[u8], dst: &SocketAddr) -> IoResult<usize> {
        match self.peer {
            Some(peer) if peer == *dst => self.socket.send(buf).await,
            _ => self.socket.send_to(buf, dst).await,
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> IoResult<RecvInfo> {
        let (len, remote) = self.socket.recv_from(buf).await?;
        Ok(RecvInfo {
            len,
            remote,
            local: self.socket.local_addr().ok(),
        })
    }

    async fn close(&self) -> IoResult<()> {
        Ok(())
    }
}
