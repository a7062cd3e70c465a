//! Dispatching received messages to resources and response handlers.
use coap_lite::{MessageClass, MessageType, RequestType as Method};
use log::{debug, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::hashkey::hash_request_uri;
use crate::option_filter::{check_critical, OptionFilter};
use crate::pdu::{Pdu, DEFAULT_VERSION};
use crate::queue::QueueNode;
use crate::response::{BAD_OPTION, METHOD_NOT_ALLOWED, NOT_FOUND};

/// Codes from this value on are responses.
const FIRST_RESPONSE_CODE: u8 = 64;
/// Class of successful responses such as notifications.
const SUCCESS_CLASS: u8 = 2;

impl Context {
    /// Handles every message waiting in the receive queue.
    ///
    /// All queued messages are processed even if sending a reply fails; the
    /// first such failure is returned afterwards.
    pub async fn dispatch(&mut self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        while let Some(rcvd) = self.recvqueue.pop() {
            if let Err(e) = self.dispatch_node(rcvd).await {
                warn!("dispatch failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn dispatch_node(&mut self, rcvd: QueueNode) -> Result<()> {
        let mut unknown = OptionFilter::new();

        if self.kind.is_stream() {
            if !check_critical(&self.known_options, &rcvd.pdu, &mut unknown) {
                debug!("dropped message with unknown critical options {:?}", unknown);
                return Ok(());
            }
            return if rcvd.pdu.is_request() {
                self.handle_request(&rcvd).await
            } else if rcvd.pdu.is_response() {
                self.handle_response(None, &rcvd).await
            } else {
                warn!("dropped message with code {} from {}", rcvd.pdu.code(), rcvd.remote);
                Ok(())
            };
        }

        if rcvd.pdu.version() != DEFAULT_VERSION {
            debug!("dropped message with version {}", rcvd.pdu.version());
            return Ok(());
        }

        let mut sent = None;
        match rcvd.pdu.message_type() {
            MessageType::Acknowledgement => {
                sent = self.sendqueue.remove_by_id(rcvd.id);
                if rcvd.pdu.is_empty() {
                    return Ok(());
                }
                if let Some(sent) = &sent {
                    // a piggybacked reply to a notification keeps its observer alive
                    if sent.pdu.class() == SUCCESS_CLASS {
                        self.touch_observer(&sent.remote, sent.pdu.token());
                    }
                }
            }
            MessageType::Reset => {
                warn!("got RST for message {} from {}", rcvd.pdu.message_id(), rcvd.remote);
                if let Some(sent) = self.sendqueue.remove_by_id(rcvd.id) {
                    self.handle_rst(&sent);
                }
                return Ok(());
            }
            MessageType::NonConfirmable => {
                if !check_critical(&self.known_options, &rcvd.pdu, &mut unknown) {
                    debug!("dropped NON with unknown critical options {:?}", unknown);
                    return Ok(());
                }
            }
            MessageType::Confirmable => {
                if !check_critical(&self.known_options, &rcvd.pdu, &mut unknown) {
                    self.send_error(&rcvd.remote, &rcvd.pdu, BAD_OPTION, &unknown).await?;
                    return Ok(());
                }
            }
        }

        if rcvd.pdu.is_request() {
            self.handle_request(&rcvd).await
        } else if rcvd.pdu.is_response() {
            self.handle_response(sent.as_ref(), &rcvd).await
        } else {
            debug!("dropped message with code {}", rcvd.pdu.code());
            self.send_rst(&rcvd.remote, &rcvd.pdu).await.map(|_| ())
        }
    }

    /// Serves a request from the resource registry.
    pub async fn handle_request(&mut self, node: &QueueNode) -> Result<()> {
        let request = &node.pdu;
        let key = hash_request_uri(request);
        let code = request.code();
        let get = u8::from(MessageClass::Request(Method::Get));
        let is_mcast = node.local.map_or(false, |local| local.ip().is_multicast());
        let no_options = OptionFilter::new();

        let handler = match self.resources.lookup(&key) {
            Some(resource) => resource.handler(code).cloned(),
            None => {
                let response = if code == get {
                    if key == self.wkc_key {
                        Some(self.wellknown_response(request))
                    } else {
                        self.new_error_response(request, NOT_FOUND, &no_options)
                    }
                } else if !is_mcast {
                    self.new_error_response(request, METHOD_NOT_ALLOWED, &no_options)
                } else {
                    None
                };
                if let Some(response) = response {
                    self.send(&node.remote, &response).await?;
                }
                return Ok(());
            }
        };

        let handler = match handler {
            Some(handler) => handler,
            None => {
                let response = if code == get && key == self.wkc_key {
                    Some(self.wellknown_response(request))
                } else {
                    self.new_error_response(request, METHOD_NOT_ALLOWED, &no_options)
                };
                if let Some(response) = response {
                    self.send(&node.remote, &response).await?;
                }
                return Ok(());
            }
        };

        let (message_type, message_id) = if self.kind.is_datagram() {
            let message_type = if request.message_type() == MessageType::Confirmable {
                MessageType::Acknowledgement
            } else {
                MessageType::NonConfirmable
            };
            (message_type, request.message_id())
        } else {
            (MessageType::NonConfirmable, 0)
        };
        let mut response = Pdu::init(message_type, 0, message_id, self.config.max_pdu_size);
        if !response.add_token(request.token()) {
            warn!("cannot generate response to {}", node.remote);
            return Ok(());
        }

        if let Some(resource) = self.resources.lookup_mut(&key) {
            debug!("call handler for /{}", resource.uri());
            handler(resource, &node.remote, request, request.token(), &mut response);
        }

        // an empty NON response means the handler chose not to answer
        let is_answer = response.code() >= FIRST_RESPONSE_CODE && !is_mcast;
        let should_send = if self.kind.is_datagram() {
            response.message_type() != MessageType::NonConfirmable || is_answer
        } else {
            is_answer
        };
        if should_send {
            self.send(&node.remote, &response).await?;
        }
        Ok(())
    }

    /// Hands a response to the response handler, or acknowledges it if there is none.
    pub async fn handle_response(&mut self, sent: Option<&QueueNode>, rcvd: &QueueNode) -> Result<()> {
        if let Some(handler) = self.response_handler.as_mut() {
            handler(&rcvd.remote, sent.map(|node| &node.pdu), &rcvd.pdu, rcvd.id);
            return Ok(());
        }
        if self.kind.is_datagram() {
            self.send_ack(&rcvd.remote, &rcvd.pdu).await?;
        }
        Ok(())
    }

    /// A peer reset `sent`: it no longer observes anything under that token.
    pub fn handle_rst(&mut self, sent: &QueueNode) {
        let token = sent.pdu.token();
        for resource in self.resources.iter_mut() {
            if resource.delete_observer(&sent.remote, token) {
                debug!("removed observer {} of /{}", sent.remote, resource.uri());
            }
        }
        self.cancel_all_messages(&sent.remote, token);
    }
}
