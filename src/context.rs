//! The engine state shared by every protocol operation.
use std::fmt;
use std::net::SocketAddr;

use coap_lite::CoapOption;
use log::{debug, info};

use crate::clock::{Clock, Tick};
use crate::config::{Config, PDU_SIZE_LIMIT};
use crate::error::{Error, Result};
use crate::hashkey::{hash_path, CoapKey};
use crate::option_filter::OptionFilter;
use crate::pdu::Pdu;
use crate::queue::{DeltaQueue, QueueNode};
use crate::resource::{Resource, ResourceRegistry};
use crate::tid::Tid;
use crate::transport::{stream, StreamTransport, Transport, TransportKind, UdpTransport};

/// Path of the resource discovery listing.
pub const WELL_KNOWN_CORE: &str = ".well-known/core";

/// Called for every response received: peer, the request it answers when
/// known, the response and its transaction id.
pub type ResponseHandler = Box<dyn FnMut(&SocketAddr, Option<&Pdu>, &Pdu, Tid) + Send + Sync>;

/// Called when a notification to `peer` with `token` was never acknowledged.
pub type FailedNotifyHandler = Box<dyn FnMut(&SocketAddr, &[u8]) + Send + Sync>;

/// How [`Context::listen`] obtains its transport.
pub enum Binding {
    Udp,
    /// Accepts one TCP peer.
    Tcp,
    /// Accepts one DTLS peer.
    #[cfg(feature = "dtls")]
    Dtls(webrtc_dtls::config::Config),
    /// Accepts one TLS peer.
    #[cfg(feature = "tls")]
    Tls(std::sync::Arc<rustls::ServerConfig>),
}

impl Binding {
    pub fn kind(&self) -> TransportKind {
        match self {
            Binding::Udp => TransportKind::Udp,
            Binding::Tcp => TransportKind::Tcp,
            #[cfg(feature = "dtls")]
            Binding::Dtls(_) => TransportKind::Dtls,
            #[cfg(feature = "tls")]
            Binding::Tls(_) => TransportKind::Tls,
        }
    }
}

pub struct Context {
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) kind: TransportKind,
    pub(crate) config: Config,
    message_id: u16,
    pub(crate) known_options: OptionFilter,
    pub(crate) sendqueue: DeltaQueue,
    /// Tick the delays in `sendqueue` are relative to.
    pub(crate) sendqueue_basetime: Tick,
    pub(crate) recvqueue: DeltaQueue,
    pub(crate) clock: Clock,
    pub(crate) response_handler: Option<ResponseHandler>,
    pub(crate) failed_notify_handler: Option<FailedNotifyHandler>,
    pub(crate) resources: ResourceRegistry,
    pub(crate) wkc_key: CoapKey,
    pub(crate) recv_buffer: Vec<u8>,
}

impl Context {
    /// Creates a context for transports of `kind` with no transport attached yet.
    pub fn create(kind: TransportKind, config: Config) -> Result<Context> {
        config.validate()?;

        let mut known_options = OptionFilter::new();
        for option in [
            CoapOption::IfMatch,
            CoapOption::UriHost,
            CoapOption::IfNoneMatch,
            CoapOption::UriPort,
            CoapOption::UriPath,
            CoapOption::UriQuery,
            CoapOption::Accept,
            CoapOption::ProxyUri,
            CoapOption::ProxyScheme,
            CoapOption::Block2,
            CoapOption::Block1,
        ] {
            known_options.set(option.into());
        }

        Ok(Context {
            transport: None,
            kind,
            config,
            message_id: rand::random(),
            known_options,
            sendqueue: DeltaQueue::new(),
            sendqueue_basetime: 0,
            recvqueue: DeltaQueue::new(),
            clock: Clock::new(),
            response_handler: None,
            failed_notify_handler: None,
            resources: ResourceRegistry::new(),
            wkc_key: hash_path(WELL_KNOWN_CORE),
            recv_buffer: vec![0; PDU_SIZE_LIMIT],
        })
    }

    /// Creates a context running over `transport`.
    pub fn with_transport<T>(transport: T, config: Config) -> Result<Context>
    where
        T: Transport + 'static,
    {
        let mut context = Context::create(transport.kind(), config)?;
        context.attach(Box::new(transport))?;
        Ok(context)
    }

    /// Attaches the transport, replacing any previous one.
    pub fn attach(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        if transport.kind() != self.kind {
            return Err(Error::Config(format!(
                "cannot attach a {} transport to a {} context",
                transport.kind(),
                self.kind
            )));
        }
        self.transport = Some(transport);
        Ok(())
    }

    /// Binds `addr` and returns a context serving it.
    ///
    /// Stream and secure bindings wait up to `config.accept_timeout` for the
    /// first peer and serve only that one.
    pub async fn listen(addr: SocketAddr, binding: Binding, config: Config) -> Result<Context> {
        let mut context = Context::create(binding.kind(), config)?;
        let wait = context.config.accept_timeout;

        let transport: Box<dyn Transport> = match binding {
            Binding::Udp => Box::new(UdpTransport::bind(addr)?),
            Binding::Tcp => {
                let listener = stream::bind_tcp(addr)?;
                Box::new(StreamTransport::accept_tcp(&listener, wait).await?)
            }
            #[cfg(feature = "dtls")]
            Binding::Dtls(dtls_config) => {
                let listener = crate::transport::dtls::DtlsListener::bind(addr, dtls_config).await?;
                Box::new(listener.accept(wait).await?)
            }
            #[cfg(feature = "tls")]
            Binding::Tls(server_config) => {
                let listener = stream::bind_tcp(addr)?;
                Box::new(crate::transport::tls::accept(&listener, server_config, wait).await?)
            }
        };

        info!("{} context listening on {}", context.kind, transport.local_addr()?);
        context.attach(transport)?;
        Ok(context)
    }

    /// Releases queued messages, resources and the transport.
    ///
    /// The context is left detached and may be given a new transport with
    /// [`attach`](Context::attach).
    pub async fn free(&mut self) -> Result<()> {
        self.sendqueue.clear();
        self.recvqueue.clear();
        self.resources.clear();
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> Option<&dyn Transport> {
        self.transport.as_deref()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let transport = self.transport.as_ref().ok_or(Error::NotConnected)?;
        Ok(transport.local_addr()?)
    }

    /// Ticks elapsed since the context was created.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Returns a fresh message id.
    pub fn new_message_id(&mut self) -> u16 {
        self.message_id = self.message_id.wrapping_add(1);
        self.message_id
    }

    /// Marks option `number` as understood. Returns `false` if it is out of range.
    pub fn register_option(&mut self, number: u16) -> bool {
        self.known_options.set(number)
    }

    pub fn known_options(&self) -> &OptionFilter {
        &self.known_options
    }

    pub fn set_response_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&SocketAddr, Option<&Pdu>, &Pdu, Tid) + Send + Sync + 'static,
    {
        self.response_handler = Some(Box::new(handler));
    }

    pub fn set_failed_notify_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&SocketAddr, &[u8]) + Send + Sync + 'static,
    {
        self.failed_notify_handler = Some(Box::new(handler));
    }

    /// Adds `resource`, returning the one registered under the same path before.
    pub fn add_resource(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.add(resource)
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    pub fn resource(&self, path: &str) -> Option<&Resource> {
        self.resources.lookup(&hash_path(path.trim_start_matches('/')))
    }

    pub fn resource_mut(&mut self, path: &str) -> Option<&mut Resource> {
        self.resources.lookup_mut(&hash_path(path.trim_start_matches('/')))
    }

    pub fn sendqueue(&self) -> &DeltaQueue {
        &self.sendqueue
    }

    pub fn recvqueue(&self) -> &DeltaQueue {
        &self.recvqueue
    }

    /// Next received message waiting for dispatch.
    pub fn peek_next(&self) -> Option<&QueueNode> {
        self.recvqueue.peek()
    }

    pub fn pop_next(&mut self) -> Option<QueueNode> {
        self.recvqueue.pop()
    }

    /// Confirmable message with transaction id `id` still awaiting its ACK.
    pub fn find_transaction(&self, id: Tid) -> Option<&QueueNode> {
        self.sendqueue.find(id)
    }

    /// True once nothing is waiting to be sent or dispatched.
    pub fn can_exit(&self) -> bool {
        self.sendqueue.is_empty() && self.recvqueue.is_empty()
    }

    /// Counts an unacknowledged notification to `peer` against its observer
    /// and tells the failed-notify handler.
    ///
    /// An observer that failed too often is dropped together with every
    /// message still queued for it.
    pub fn handle_failed_notify(&mut self, peer: &SocketAddr, token: &[u8]) {
        let max_failures = self.config.max_observe_failures;
        let dropped: Vec<_> = self
            .resources
            .iter_mut()
            .filter_map(|resource| resource.fail_observer(peer, token, max_failures))
            .collect();
        for subscription in dropped {
            let cancelled = self.cancel_all_messages(&subscription.peer, &subscription.token);
            debug!("dropped observer {}, cancelled {} messages", subscription.peer, cancelled);
        }

        if let Some(handler) = self.failed_notify_handler.as_mut() {
            handler(peer, token);
        }
    }

    pub(crate) fn touch_observer(&mut self, peer: &SocketAddr, token: &[u8]) {
        for resource in self.resources.iter_mut() {
            resource.touch_observer(peer, token);
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.sendqueue.clear();
        self.recvqueue.clear();
        self.resources.clear();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("attached", &self.transport.is_some())
            .field("sendqueue", &self.sendqueue.len())
            .field("recvqueue", &self.recvqueue.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}
