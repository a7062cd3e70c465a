//! Response codes, diagnostic phrases and error responses.
use coap_lite::{CoapOption, MessageType};

use crate::option_filter::OptionFilter;
use crate::pdu::Pdu;
use crate::transport::TransportKind;

/// Encodes a response code written as `class * 100 + detail`, e.g. `404`.
pub const fn response_code(n: u16) -> u8 {
    (((n / 100) << 5) | (n % 100)) as u8
}

pub const CONTENT: u8 = response_code(205);
pub const BAD_REQUEST: u8 = response_code(400);
pub const BAD_OPTION: u8 = response_code(402);
pub const NOT_FOUND: u8 = response_code(404);
pub const METHOD_NOT_ALLOWED: u8 = response_code(405);
pub const SERVICE_UNAVAILABLE: u8 = response_code(503);

const PHRASES: [(u16, &str); 23] = [
    (201, "Created"),
    (202, "Deleted"),
    (203, "Valid"),
    (204, "Changed"),
    (205, "Content"),
    (231, "Continue"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (402, "Bad Option"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (406, "Not Acceptable"),
    (408, "Request Entity Incomplete"),
    (412, "Precondition Failed"),
    (413, "Request Entity Too Large"),
    (415, "Unsupported Content-Format"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
    (505, "Proxying Not Supported"),
];

/// Diagnostic phrase of a response code, if it has one.
pub fn response_phrase(code: u8) -> Option<&'static str> {
    PHRASES
        .iter()
        .find(|(n, _)| response_code(*n) == code)
        .map(|(_, phrase)| *phrase)
}

/// Builds an error response to `request`.
///
/// The response echoes the token and the options of `request` listed in
/// `opts` (Content-Format excepted) and carries the diagnostic phrase as
/// payload. On datagram transports it is an ACK for a CON request and a NON
/// otherwise, with the request's message id.
pub fn new_error_response(
    request: &Pdu,
    code: u8,
    opts: &OptionFilter,
    kind: TransportKind,
    max_size: usize,
) -> Option<Pdu> {
    let (message_type, message_id) = if kind.is_datagram() {
        let message_type = if request.message_type() == MessageType::Confirmable {
            MessageType::Acknowledgement
        } else {
            MessageType::NonConfirmable
        };
        (message_type, request.message_id())
    } else {
        (MessageType::NonConfirmable, 0)
    };

    let mut opts = opts.clone();
    opts.unset(CoapOption::ContentFormat.into());

    let mut response = Pdu::init(message_type, code, message_id, max_size);
    if !response.add_token(request.token()) {
        log::debug!("cannot add token to error response");
        return None;
    }

    for (number, value) in request.options().filter(|(number, _)| opts.contains(*number)) {
        if !response.add_option(number, value.to_vec()) {
            log::debug!("cannot copy option {} into error response", number);
            return None;
        }
    }

    if let Some(phrase) = response_phrase(code) {
        // a payload that does not fit is left out
        response.add_data(phrase.as_bytes());
    }
    Some(response)
}
