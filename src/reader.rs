//! Receiving frames into the receive queue.
use log::{debug, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::pdu::{Pdu, DATAGRAM_HEADER_SIZE, DEFAULT_VERSION, STREAM_HEADER_MIN_SIZE};
use crate::queue::QueueNode;
use crate::tid::transaction_id;

impl Context {
    /// Receives one frame from the transport and queues it for dispatch.
    ///
    /// Frames that are too short, carry an unknown version or fail to parse
    /// are discarded without an error; only transport failures are returned.
    pub async fn read(&mut self) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(Error::NotConnected)?;
        let info = transport.recv(&mut self.recv_buffer).await?;
        let bytes = &self.recv_buffer[..info.len];

        if self.kind.is_datagram() {
            if bytes.len() < DATAGRAM_HEADER_SIZE {
                warn!("discarded datagram of {} bytes from {}", bytes.len(), info.remote);
                return Ok(());
            }
            let version = bytes[0] >> 6;
            if version != DEFAULT_VERSION {
                debug!("discarded datagram with version {} from {}", version, info.remote);
                return Ok(());
            }
        } else if bytes.len() < STREAM_HEADER_MIN_SIZE {
            warn!("discarded frame of {} bytes from {}", bytes.len(), info.remote);
            return Ok(());
        }

        let pdu = match Pdu::parse(bytes, self.kind) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!("discarded malformed message from {}: {}", info.remote, e);
                return Ok(());
            }
        };

        let id = transaction_id(&info.remote, &pdu, self.kind);
        let mut node = QueueNode::new(id, info.remote, pdu, self.kind);
        node.local = info.local;
        node.timestamp = self.clock.now();
        debug!("received transaction {} from {}", id, info.remote);
        self.recvqueue.insert(node);
        Ok(())
    }
}
