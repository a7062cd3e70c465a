//! `coap://`, `coaps://`, `coap+tcp://` and `coaps+tcp://` URIs.
use std::net::SocketAddr;

use coap_lite::CoapOption;
use regex::Regex;
use url::Url;

use crate::error::{Error, Result};
use crate::pdu::Pdu;
use crate::transport::TransportKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapUri {
    pub kind: TransportKind,
    /// Host name or address, IPv6 addresses without brackets.
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

/// Splits a CoAP URI into transport kind, host, port, path and query.
///
/// A missing port defaults to 5684 for secure schemes and 5683 otherwise.
pub fn parse_coap_uri(uri: &str) -> Result<CoapUri> {
    let url = Url::parse(uri).map_err(|e| Error::Malformed(format!("invalid uri {}: {}", uri, e)))?;

    let kind = TransportKind::from_scheme(url.scheme())
        .ok_or_else(|| Error::Malformed(format!("unsupported scheme {}", url.scheme())))?;

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Err(Error::Malformed(format!("missing host in {}", uri))),
    };
    let brackets = Regex::new(r"^\[(.*?)]$").map_err(|e| Error::Malformed(e.to_string()))?;
    let host = brackets.replace(host, "$1").to_string();

    Ok(CoapUri {
        kind,
        host,
        port: url.port().unwrap_or_else(|| kind.default_port()),
        path: url.path().to_string(),
        query: url.query().map(str::to_string),
    })
}

impl CoapUri {
    /// Non-empty path segments.
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|segment| !segment.is_empty())
    }

    /// Adds Uri-Path and Uri-Query options to `request`. Returns `false` if
    /// they do not fit.
    pub fn write_options(&self, request: &mut Pdu) -> bool {
        for segment in self.path_segments() {
            if !request.add_option(CoapOption::UriPath.into(), segment.as_bytes().to_vec()) {
                return false;
            }
        }
        if let Some(query) = &self.query {
            for argument in query.split('&').filter(|a| !a.is_empty()) {
                if !request.add_option(CoapOption::UriQuery.into(), argument.as_bytes().to_vec()) {
                    return false;
                }
            }
        }
        true
    }

    /// Resolves host and port to the first socket address.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port)).await?;
        addrs
            .next()
            .ok_or_else(|| Error::Malformed(format!("{} did not resolve", self.host)))
    }
}
