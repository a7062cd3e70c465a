//! Sending messages and the empty ACK and RST replies.
use std::net::SocketAddr;

use coap_lite::MessageType;
use log::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::option_filter::OptionFilter;
use crate::pdu::Pdu;
use crate::response::new_error_response;
use crate::tid::{transaction_id, Tid};

impl Context {
    /// Encodes `pdu` for the attached transport and sends it to `dst`.
    pub async fn send(&self, dst: &SocketAddr, pdu: &Pdu) -> Result<Tid> {
        let transport = self.transport.as_ref().ok_or(Error::NotConnected)?;
        let bytes = pdu.encode(self.kind)?;
        let sent = transport.send_to(&bytes, dst).await?;
        debug!(
            "sent {} bytes to {}: type {:?} code {} id {}",
            sent,
            dst,
            pdu.message_type(),
            pdu.code(),
            pdu.message_id()
        );
        Ok(transaction_id(dst, pdu, self.kind))
    }

    /// Acknowledges a confirmable `request` with an empty ACK.
    ///
    /// Only datagram transports acknowledge; anything else sends nothing and
    /// yields `None`.
    pub async fn send_ack(&self, dst: &SocketAddr, request: &Pdu) -> Result<Option<Tid>> {
        if self.kind.is_stream() || request.message_type() != MessageType::Confirmable {
            return Ok(None);
        }
        let ack = Pdu::init(
            MessageType::Acknowledgement,
            0,
            request.message_id(),
            self.config.max_pdu_size,
        );
        self.send(dst, &ack).await.map(Some)
    }

    /// Answers `request` with an empty message of `message_type` carrying its id.
    pub async fn send_message_type(
        &self,
        dst: &SocketAddr,
        request: &Pdu,
        message_type: MessageType,
    ) -> Result<Option<Tid>> {
        if self.kind.is_stream() {
            return Ok(None);
        }
        let pdu = Pdu::init(message_type, 0, request.message_id(), self.config.max_pdu_size);
        self.send(dst, &pdu).await.map(Some)
    }

    pub async fn send_rst(&self, dst: &SocketAddr, request: &Pdu) -> Result<Option<Tid>> {
        self.send_message_type(dst, request, MessageType::Reset).await
    }

    /// Builds an error response for this context's transport.
    pub fn new_error_response(&self, request: &Pdu, code: u8, opts: &OptionFilter) -> Option<Pdu> {
        new_error_response(request, code, opts, self.kind, self.config.max_pdu_size)
    }

    /// Answers `request` with error `code`, echoing the options in `opts`.
    ///
    /// Yields `None` if no response could be built.
    pub async fn send_error(
        &self,
        dst: &SocketAddr,
        request: &Pdu,
        code: u8,
        opts: &OptionFilter,
    ) -> Result<Option<Tid>> {
        match self.new_error_response(request, code, opts) {
            Some(response) => self.send(dst, &response).await.map(Some),
            None => Ok(None),
        }
    }
}
