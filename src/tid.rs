//! Transaction ids pairing ACK and RST messages with the confirmable
//! messages waiting in the send queue.
use std::fmt;
use std::net::SocketAddr;

use crate::hashkey::{hash, CoapKey};
use crate::pdu::Pdu;
use crate::transport::TransportKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(pub u16);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives the transaction id of `pdu` exchanged with `peer`.
///
/// Stream transports carry no message id; every message on them shares the
/// id given by the transport kind.
pub fn transaction_id(peer: &SocketAddr, pdu: &Pdu, kind: TransportKind) -> Tid {
    if kind.is_stream() {
        return Tid(kind as u16);
    }

    let mut key = CoapKey::default();
    match peer {
        SocketAddr::V4(addr) => {
            hash(&addr.ip().octets(), &mut key);
            hash(&addr.port().to_be_bytes(), &mut key);
        }
        SocketAddr::V6(addr) => {
            hash(&addr.port().to_be_bytes(), &mut key);
            hash(&addr.ip().octets(), &mut key);
        }
    }
    hash(&pdu.message_id().to_be_bytes(), &mut key);

    Tid((((key[0] as u16) << 8) | key[1] as u16) ^ (((key[2] as u16) << 8) | key[3] as u16))
}
