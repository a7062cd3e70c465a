//! The protocol data unit exchanged with peers.
//!
//! [`Pdu`] wraps a `coap_lite::Packet` and adds the size limit the engine
//! enforces on outgoing messages together with the transport specific wire
//! encodings.
use coap_lite::{CoapOption, MessageClass, MessageType, Packet};

use crate::error::{Error, Result};
use crate::framing;
use crate::transport::TransportKind;

pub const DEFAULT_VERSION: u8 = 1;
pub const DATAGRAM_HEADER_SIZE: usize = 4;
pub const STREAM_HEADER_MIN_SIZE: usize = 2;
pub const MAX_TOKEN_LENGTH: usize = 8;

const PAYLOAD_MARKER_SIZE: usize = 1;

/// Codes below this value are requests, the empty code excepted.
const FIRST_SUCCESS_CODE: u8 = 64;
const LAST_RESPONSE_CODE: u8 = 191;

#[derive(Debug, Clone)]
pub struct Pdu {
    packet: Packet,
    max_size: usize,
}

impl Pdu {
    /// Creates an empty PDU with the given header fields.
    pub fn init(message_type: MessageType, code: u8, message_id: u16, max_size: usize) -> Pdu {
        let mut packet = Packet::new();
        packet.header.set_version(DEFAULT_VERSION);
        packet.header.set_type(message_type);
        packet.header.code = MessageClass::from(code);
        packet.header.message_id = message_id;
        Pdu { packet, max_size }
    }

    pub fn from_packet(packet: Packet, max_size: usize) -> Pdu {
        Pdu { packet, max_size }
    }

    /// Decodes a message as received on a transport of the given kind.
    ///
    /// Stream frames carry neither type nor message id; they come back as NON
    /// with id 0.
    pub fn parse(bytes: &[u8], kind: TransportKind) -> Result<Pdu> {
        let packet = if kind.is_stream() {
            Packet::from_bytes(&framing::stream_to_datagram(bytes)?)?
        } else {
            Packet::from_bytes(bytes)?
        };
        Ok(Pdu {
            packet,
            max_size: bytes.len(),
        })
    }

    /// Serializes the message for a transport of the given kind.
    pub fn encode(&self, kind: TransportKind) -> Result<Vec<u8>> {
        let size = self.length();
        if size > self.max_size {
            return Err(Error::TooLarge {
                size,
                max: self.max_size,
            });
        }
        let datagram = self.packet.to_bytes()?;
        if kind.is_stream() {
            framing::datagram_to_stream(&datagram)
        } else {
            Ok(datagram)
        }
    }

    /// Sets the token. Fails if it is longer than eight bytes or would not fit.
    pub fn add_token(&mut self, token: &[u8]) -> bool {
        if token.len() > MAX_TOKEN_LENGTH {
            return false;
        }
        if self.length() - self.token().len() + token.len() > self.max_size {
            return false;
        }
        self.packet.set_token(token.to_vec());
        true
    }

    /// Appends an option value. Fails if the result would exceed the size limit.
    pub fn add_option(&mut self, number: u16, value: Vec<u8>) -> bool {
        let previous = self
            .options()
            .map(|(n, _)| n)
            .filter(|&n| n <= number)
            .last()
            .unwrap_or(0);
        let added = option_size(number - previous, value.len());
        if self.length() + added > self.max_size {
            return false;
        }
        self.packet.add_option(CoapOption::from(number), value);
        true
    }

    /// Sets the payload. Fails if the result would exceed the size limit.
    pub fn add_data(&mut self, data: &[u8]) -> bool {
        let without = self.length()
            - match self.packet.payload.len() {
                0 => 0,
                n => PAYLOAD_MARKER_SIZE + n,
            };
        let with = match data.len() {
            0 => without,
            n => without + PAYLOAD_MARKER_SIZE + n,
        };
        if with > self.max_size {
            return false;
        }
        self.packet.payload = data.to_vec();
        true
    }

    /// Options in ascending number order, repeated options in insertion order.
    pub fn options(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        self.packet
            .options()
            .flat_map(|(number, values)| values.iter().map(move |v| (*number, v.as_slice())))
    }

    /// First value of the given option.
    pub fn option(&self, number: u16) -> Option<&[u8]> {
        self.packet
            .get_option(CoapOption::from(number))
            .and_then(|values| values.front())
            .map(|value| value.as_slice())
    }

    pub fn token(&self) -> &[u8] {
        &self.packet.get_token()[..]
    }

    pub fn payload(&self) -> &[u8] {
        &self.packet.payload
    }

    pub fn message_type(&self) -> MessageType {
        self.packet.header.get_type()
    }

    pub fn set_type(&mut self, message_type: MessageType) {
        self.packet.header.set_type(message_type);
    }

    pub fn code(&self) -> u8 {
        u8::from(self.packet.header.code)
    }

    pub fn set_code(&mut self, code: u8) {
        self.packet.header.code = MessageClass::from(code);
    }

    /// Code class, the three most significant bits of the code.
    pub fn class(&self) -> u8 {
        self.code() >> 5
    }

    pub fn message_id(&self) -> u16 {
        self.packet.header.message_id
    }

    pub fn set_message_id(&mut self, message_id: u16) {
        self.packet.header.message_id = message_id;
    }

    pub fn version(&self) -> u8 {
        self.packet.header.get_version()
    }

    pub fn is_empty(&self) -> bool {
        self.code() == 0
    }

    pub fn is_request(&self) -> bool {
        !self.is_empty() && self.code() < 32
    }

    pub fn is_response(&self) -> bool {
        (FIRST_SUCCESS_CODE..=LAST_RESPONSE_CODE).contains(&self.code())
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Size of the datagram encoding.
    pub fn length(&self) -> usize {
        let mut size = DATAGRAM_HEADER_SIZE + self.token().len();
        let mut previous = 0;
        for (number, value) in self.options() {
            size += option_size(number - previous, value.len());
            previous = number;
        }
        if !self.packet.payload.is_empty() {
            size += PAYLOAD_MARKER_SIZE + self.packet.payload.len();
        }
        size
    }

    /// Drops options and payload, keeping header and token.
    pub fn truncate_to_token(&mut self) {
        let mut packet = Packet::new();
        packet.header.set_version(self.version());
        packet.header.set_type(self.message_type());
        packet.header.code = self.packet.header.code;
        packet.header.message_id = self.message_id();
        packet.set_token(self.token().to_vec());
        self.packet = packet;
    }
}

fn extended_size(value: usize) -> usize {
    match value {
        0..=12 => 0,
        13..=268 => 1,
        _ => 2,
    }
}

fn option_size(delta: u16, length: usize) -> usize {
    1 + extended_size(delta as usize) + extended_size(length) + length
}

/// Minimal big endian encoding of an unsigned option value. Zero encodes as
/// the empty string.
pub fn encode_var_bytes(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

pub fn decode_var_bytes(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

#[cfg(test)]
mod test {
    use super::*;
    use coap_lite::{RequestType as Method, ResponseType as Status};

    #[test]
    fn test_length_matches_encoding() {
        let mut pdu = Pdu::init(
            MessageType::Confirmable,
            u8::from(MessageClass::Request(Method::Get)),
            0x1234,
            1152,
        );
        assert!(pdu.add_token(&[1, 2, 3]));
        assert!(pdu.add_option(CoapOption::UriPath.into(), b"sensors".to_vec()));
        assert!(pdu.add_option(CoapOption::UriPath.into(), b"temperature-and-humidity".to_vec()));
        assert!(pdu.add_option(CoapOption::Block2.into(), vec![0x16]));
        assert!(pdu.add_data(b"hello"));

        let bytes = pdu.encode(TransportKind::Udp).unwrap();
        assert_eq!(bytes.len(), pdu.length());

        let parsed = Pdu::parse(&bytes, TransportKind::Udp).unwrap();
        assert_eq!(parsed.message_id(), 0x1234);
        assert_eq!(parsed.token(), &[1, 2, 3]);
        assert_eq!(parsed.payload(), b"hello");
        assert!(parsed.is_request());
    }

    #[test]
    fn test_stream_encoding() {
        let mut pdu = Pdu::init(
            MessageType::Confirmable,
            u8::from(MessageClass::Response(Status::Content)),
            77,
            1152,
        );
        pdu.add_token(&[9]);
        pdu.add_data(b"abc");

        let frame = pdu.encode(TransportKind::Tcp).unwrap();
        // length nibble covers marker and payload, no type and id on the wire
        assert_eq!(frame, vec![0x41, 0x45, 9, 0xFF, b'a', b'b', b'c']);

        let parsed = Pdu::parse(&frame, TransportKind::Tcp).unwrap();
        assert_eq!(parsed.message_type(), MessageType::NonConfirmable);
        assert_eq!(parsed.message_id(), 0);
        assert!(parsed.is_response());
        assert_eq!(parsed.payload(), b"abc");
    }

    #[test]
    fn test_size_limit() {
        let mut pdu = Pdu::init(MessageType::NonConfirmable, 69, 1, 16);
        assert!(!pdu.add_token(&[0; 9]));
        assert!(pdu.add_token(&[0; 8]));
        assert!(!pdu.add_data(&[0; 4]));
        assert!(pdu.add_data(&[0; 3]));
        assert_eq!(pdu.length(), 16);
        assert!(!pdu.add_option(CoapOption::ContentFormat.into(), vec![]));
    }

    #[test]
    fn test_truncate_to_token() {
        let mut pdu = Pdu::init(MessageType::Acknowledgement, 69, 5, 64);
        pdu.add_token(&[7, 7]);
        pdu.add_option(CoapOption::ContentFormat.into(), vec![40]);
        pdu.add_data(b"x");
        pdu.truncate_to_token();
        assert_eq!(pdu.length(), DATAGRAM_HEADER_SIZE + 2);
        assert_eq!(pdu.token(), &[7, 7]);
        assert_eq!(pdu.message_id(), 5);
    }

    #[test]
    fn test_var_bytes() {
        assert_eq!(encode_var_bytes(0), Vec::<u8>::new());
        assert_eq!(encode_var_bytes(0x16), vec![0x16]);
        assert_eq!(encode_var_bytes(0x1_0000), vec![1, 0, 0]);
        assert_eq!(decode_var_bytes(&[1, 0, 0]), 0x1_0000);
        assert_eq!(decode_var_bytes(&[]), 0);
    }
}
