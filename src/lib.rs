//! A transport and reliability engine for the [CoAP Protocol][spec].
//!
//! A [`Context`] owns one transport and drives everything between the wire
//! and the resources it serves:
//!
//! - CoAP over UDP [RFC 7252](https://tools.ietf.org/rfc/rfc7252.txt),
//!   with confirmable messages retransmitted under exponential backoff
//! - CoAP over TCP and TLS [RFC 8323](https://tools.ietf.org/html/rfc8323)
//! - DTLS via [webrtc-rs](https://github.com/webrtc-rs/webrtc)
//! - Resource discovery on `.well-known/core` [RFC 6690](https://tools.ietf.org/html/rfc6690),
//!   split into blocks [RFC 7959](https://tools.ietf.org/html/rfc7959) when large
//! - Observer bookkeeping for [RFC 7641](https://tools.ietf.org/rfc/rfc7641.txt) notifications
//!
//! # Example
//!
//! ```no_run
//! use coap_lite::{MessageClass, RequestType as Method, ResponseType as Status};
//! use coap_net::{Binding, Config, Context, Resource};
//!
//! #[tokio::main]
//! async fn main() -> coap_net::Result<()> {
//!     let addr = "127.0.0.1:5683".parse().unwrap();
//!     let mut context = Context::listen(addr, Binding::Udp, Config::default()).await?;
//!
//!     context.add_resource(Resource::new("hello").with_handler(
//!         Method::Get,
//!         |_, _, _, _, response| {
//!             response.set_code(u8::from(MessageClass::Response(Status::Content)));
//!             response.add_data(b"world");
//!         },
//!     ));
//!
//!     context
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! [spec]: https://tools.ietf.org/html/rfc7252

pub mod block;
pub mod clock;
pub mod config;
pub mod context;
mod dispatch;
pub mod error;
pub mod framing;
pub mod hashkey;
pub mod link_format;
pub mod option_filter;
pub mod pdu;
pub mod queue;
mod reader;
pub mod resource;
pub mod response;
mod retransmit;
mod send;
mod server;
pub mod tid;
pub mod transport;
pub mod uri;
mod wellknown;

#[cfg(test)]
mod test_util;

pub use self::config::Config;
pub use self::context::{Binding, Context, FailedNotifyHandler, ResponseHandler};
pub use self::error::{Error, Result};
pub use self::pdu::Pdu;
pub use self::resource::{MethodHandler, Resource, ResourceRegistry};
pub use self::tid::Tid;
pub use self::transport::{Transport, TransportKind};
pub use self::uri::{parse_coap_uri, CoapUri};
