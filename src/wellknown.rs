//! The `.well-known/core` resource discovery responder.
use coap_lite::{CoapOption, MessageType};
use log::debug;

use crate::block::{szx_to_bytes, write_block_opt, Block};
use crate::config::MAX_SZX;
use crate::context::Context;
use crate::link_format::{print_wellknown, LinkSink, QueryFilter};
use crate::pdu::{encode_var_bytes, Pdu};
use crate::response::{BAD_REQUEST, CONTENT, SERVICE_UNAVAILABLE};

/// Content-Format of `application/link-format`.
pub const LINK_FORMAT: u32 = 40;

impl Context {
    /// Answers a GET on `.well-known/core` with the link-format listing of
    /// all resources passing the request's Uri-Query filter.
    ///
    /// Listings that do not fit into one message are split into Block2
    /// blocks, honouring a block size requested by the client up to the
    /// configured maximum.
    pub fn wellknown_response(&self, request: &Pdu) -> Pdu {
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
        let mut response = Pdu::init(message_type, CONTENT, message_id, self.config.max_pdu_size);
        if !response.add_token(request.token()) {
            return unavailable(response);
        }

        let filter = request
            .option(CoapOption::UriQuery.into())
            .and_then(QueryFilter::parse);
        let mut measure = LinkSink::measure();
        print_wellknown(&self.resources, &mut measure, filter.as_ref());
        let wkc_len = measure.total();

        let mut offset = 0;
        let mut block = None;
        if let Some(mut requested) = Block::from_pdu(request, CoapOption::Block2.into()) {
            offset = requested.offset();
            if requested.szx > MAX_SZX {
                debug!("illegal block size {} requested", requested.szx);
                response.set_code(BAD_REQUEST);
                return response;
            }
            if requested.szx > self.config.max_block_szx {
                requested.szx = self.config.max_block_szx;
                requested.num = (offset >> (requested.szx as usize + 4)) as u32;
            }
            block = Some(requested);
        }

        // Content-Format needs at most three bytes
        if response.max_size() <= response.length() + 3 {
            debug!("no space for the link-format listing");
            return unavailable(response);
        }
        if !response.add_option(CoapOption::ContentFormat.into(), encode_var_bytes(LINK_FORMAT)) {
            return unavailable(response);
        }

        if block.is_none() && response.max_size() - response.length() < wkc_len {
            let payload_len = response.max_size() - response.length();
            let mut szx = self.config.max_block_szx;
            while payload_len < szx_to_bytes(szx) {
                if szx == 0 {
                    debug!("even the smallest block does not fit");
                    return unavailable(response);
                }
                szx -= 1;
            }
            block = Some(Block::new(0, false, szx));
        }

        let window = match block.as_mut() {
            Some(block) => {
                if let Err(e) = write_block_opt(block, CoapOption::Block2.into(), &mut response, wkc_len) {
                    debug!("cannot add Block2 option: {}", e);
                    return unavailable(response);
                }
                block.size()
            }
            // the payload marker takes one byte
            None => response.max_size().saturating_sub(response.length() + 1),
        };

        let mut sink = LinkSink::new(offset, window);
        print_wellknown(&self.resources, &mut sink, filter.as_ref());
        if !response.add_data(sink.output()) {
            debug!("listing does not fit into the response");
            return unavailable(response);
        }
        response
    }
}

fn unavailable(mut response: Pdu) -> Pdu {
    response.set_code(SERVICE_UNAVAILABLE);
    response.truncate_to_token();
    response
}
