use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Largest datagram `coap_lite` will serialize.
pub const PDU_SIZE_LIMIT: usize = 1280;

/// Block size exponents above this value are reserved.
pub const MAX_SZX: u8 = 6;

/// Tunables of a [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Upper bound for an outgoing message, header included.
    pub max_pdu_size: usize,

    /// Largest Block2 size exponent the well-known responder will use.
    pub max_block_szx: u8,

    /// Base ACK timeout before randomization.
    pub response_timeout: Duration,

    /// Number of retransmissions of a confirmable message.
    pub max_retransmit: u8,

    /// How long `listen` may block while accepting a stream peer or finishing a handshake.
    pub accept_timeout: Duration,

    /// Failed notifications tolerated before an observer is dropped.
    pub max_observe_failures: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pdu_size: 1152,
            max_block_szx: 4,
            response_timeout: Duration::from_secs(2),
            max_retransmit: 4,
            accept_timeout: Duration::from_secs(10),
            max_observe_failures: 3,
        }
    }
}

impl Config {
    pub fn with_max_pdu_size(mut self, max_pdu_size: usize) -> Self {
        self.max_pdu_size = max_pdu_size;
        self
    }

    pub fn with_max_block_szx(mut self, max_block_szx: u8) -> Self {
        self.max_block_szx = max_block_szx;
        self
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn with_max_retransmit(mut self, max_retransmit: u8) -> Self {
        self.max_retransmit = max_retransmit;
        self
    }

    pub fn with_accept_timeout(mut self, accept_timeout: Duration) -> Self {
        self.accept_timeout = accept_timeout;
        self
    }

    pub fn with_max_observe_failures(mut self, max_observe_failures: u8) -> Self {
        self.max_observe_failures = max_observe_failures;
        self
    }

    /// Rejects values the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_pdu_size < 16 || self.max_pdu_size > PDU_SIZE_LIMIT {
            return Err(Error::Config(format!(
                "max_pdu_size must be within 16..={}, got {}",
                PDU_SIZE_LIMIT, self.max_pdu_size
            )));
        }
        if self.max_block_szx > MAX_SZX {
            return Err(Error::Config(format!(
                "max_block_szx must be at most {}, got {}",
                MAX_SZX, self.max_block_szx
            )));
        }
        // the backoff shifts the timeout by the retransmission count
        if self.max_retransmit >= 16 {
            return Err(Error::Config(format!(
                "max_retransmit must be below 16, got {}",
                self.max_retransmit
            )));
        }
        if Clock::to_ticks(self.response_timeout) == 0 {
            return Err(Error::Config(format!(
                "response_timeout must be at least one millisecond, got {:?}",
                self.response_timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Config::default().with_max_pdu_size(2048).validate().is_err());
        assert!(Config::default().with_max_pdu_size(8).validate().is_err());
        assert!(Config::default().with_max_block_szx(7).validate().is_err());
        assert!(Config::default().with_max_retransmit(16).validate().is_err());
        assert!(Config::default()
            .with_response_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_sub_millisecond_timeout() {
        assert!(Config::default()
            .with_response_timeout(Duration::from_micros(500))
            .validate()
            .is_err());
        assert!(Config::default()
            .with_response_timeout(Duration::from_millis(1))
            .validate()
            .is_ok());
    }
}
