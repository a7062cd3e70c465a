//! Four byte hash keys identifying resources and transactions.
use coap_lite::CoapOption;

use crate::pdu::Pdu;

pub type CoapKey = [u8; 4];

/// Folds `data` into `key`.
///
/// Peers derive transaction ids with the same byte rotation, so the
/// arithmetic must stay bit-exact.
pub fn hash(data: &[u8], key: &mut CoapKey) {
    for &byte in data {
        for j in (1..key.len()).rev() {
            key[j] = ((key[j] << 7) | (key[j - 1] >> 1)).wrapping_add(key[j]);
        }
        key[0] = (key[0] << 7).wrapping_add(key[0]).wrapping_add(byte);
    }
}

/// Hashes every segment of a slash separated path. Query and fragment are ignored.
pub fn hash_path(path: &str) -> CoapKey {
    let mut key = CoapKey::default();
    let path = match path.find(|c| c == '?' || c == '#') {
        Some(end) => &path[..end],
        None => path,
    };
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        hash(segment.as_bytes(), &mut key);
    }
    key
}

/// Hashes the Uri-Path options of a request, yielding the same key as
/// [`hash_path`] on the equivalent path string.
pub fn hash_request_uri(request: &Pdu) -> CoapKey {
    let mut key = CoapKey::default();
    if let Some(segments) = request.packet().get_option(CoapOption::UriPath) {
        for segment in segments {
            hash(segment, &mut key);
        }
    }
    key
}

#[cfg(test)]
mod test {
    use super::*;
    use coap_lite::MessageType;

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(hash_path("a/b"), hash_path("b/a"));
    }

    #[test]
    fn test_hash_path_ignores_slashes_and_query() {
        let key = hash_path(".well-known/core");
        assert_eq!(key, hash_path("/.well-known/core"));
        assert_eq!(key, hash_path("/.well-known//core/"));
        assert_eq!(key, hash_path(".well-known/core?rt=x"));
        assert_eq!(hash_path(""), CoapKey::default());
    }

    #[test]
    fn test_request_uri_matches_path() {
        let mut request = Pdu::init(MessageType::Confirmable, 1, 7, 128);
        request.add_option(CoapOption::UriPath.into(), b".well-known".to_vec());
        request.add_option(CoapOption::UriPath.into(), b"core".to_vec());
        assert_eq!(hash_request_uri(&request), hash_path(".well-known/core"));
    }

    #[test]
    fn test_single_byte() {
        let mut key = CoapKey::default();
        hash(&[0x01], &mut key);
        assert_eq!(key, [0x01, 0x00, 0x00, 0x00]);
        hash(&[0x00], &mut key);
        // key[1] = (0 << 7 | 1 >> 1) + 0, key[0] = (1 << 7) + 1
        assert_eq!(key, [0x81, 0x00, 0x00, 0x00]);
    }
}
