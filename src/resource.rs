//! Resources served by a [`Context`](crate::Context) and their observers.
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use coap_lite::{MessageClass, RequestType as Method};
use log::debug;

use crate::hashkey::{hash_path, CoapKey};
use crate::pdu::Pdu;

/// Handles one request method on a resource.
///
/// Receives the resource, the requesting peer, the request and its token, and
/// fills in the pre-built response. Leaving the response code empty on a NON
/// request suppresses the response.
pub type MethodHandler = Arc<dyn Fn(&mut Resource, &SocketAddr, &Pdu, &[u8], &mut Pdu) + Send + Sync>;

/// A link-format attribute such as `rt="temperature"` or `ct=0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

/// A peer observing a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub peer: SocketAddr,
    pub token: Vec<u8>,
    pub fail_cnt: u8,
}

impl Subscription {
    fn matches(&self, peer: &SocketAddr, token: &[u8]) -> bool {
        self.peer == *peer && self.token == token
    }
}

pub struct Resource {
    uri: String,
    key: CoapKey,
    handlers: HashMap<u8, MethodHandler>,
    attributes: Vec<Attribute>,
    observable: bool,
    subscribers: Vec<Subscription>,
}

impl Resource {
    /// Creates a resource for `uri`; a leading slash is ignored.
    pub fn new(uri: &str) -> Resource {
        let uri = uri.trim_start_matches('/').to_string();
        let key = hash_path(&uri);
        Resource {
            uri,
            key,
            handlers: HashMap::new(),
            attributes: Vec::new(),
            observable: false,
            subscribers: Vec::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn key(&self) -> CoapKey {
        self.key
    }

    pub fn register_handler<F>(&mut self, method: Method, handler: F)
    where
        F: Fn(&mut Resource, &SocketAddr, &Pdu, &[u8], &mut Pdu) + Send + Sync + 'static,
    {
        let code = u8::from(MessageClass::Request(method));
        self.handlers.insert(code, Arc::new(handler));
    }

    pub fn with_handler<F>(mut self, method: Method, handler: F) -> Resource
    where
        F: Fn(&mut Resource, &SocketAddr, &Pdu, &[u8], &mut Pdu) + Send + Sync + 'static,
    {
        self.register_handler(method, handler);
        self
    }

    /// Handler registered for the request `code`.
    pub fn handler(&self, code: u8) -> Option<&MethodHandler> {
        self.handlers.get(&code)
    }

    pub fn add_attribute(&mut self, name: &str, value: Option<&str>) {
        self.attributes.push(Attribute {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
    }

    pub fn with_attribute(mut self, name: &str, value: Option<&str>) -> Resource {
        self.add_attribute(name, value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn set_observable(&mut self, observable: bool) {
        self.observable = observable;
    }

    pub fn is_observable(&self) -> bool {
        self.observable
    }

    /// Registers `peer` as observer; an existing registration is kept as is.
    pub fn add_observer(&mut self, peer: &SocketAddr, token: &[u8]) -> &Subscription {
        let index = match self.subscribers.iter().position(|s| s.matches(peer, token)) {
            Some(index) => index,
            None => {
                debug!("new observer {} on /{}", peer, self.uri);
                self.subscribers.push(Subscription {
                    peer: *peer,
                    token: token.to_vec(),
                    fail_cnt: 0,
                });
                self.subscribers.len() - 1
            }
        };
        &self.subscribers[index]
    }

    pub fn find_observer(&self, peer: &SocketAddr, token: &[u8]) -> Option<&Subscription> {
        self.subscribers.iter().find(|s| s.matches(peer, token))
    }

    pub fn delete_observer(&mut self, peer: &SocketAddr, token: &[u8]) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| !s.matches(peer, token));
        before != self.subscribers.len()
    }

    /// Marks an observer as alive again.
    pub fn touch_observer(&mut self, peer: &SocketAddr, token: &[u8]) {
        if let Some(subscription) = self.subscribers.iter_mut().find(|s| s.matches(peer, token)) {
            subscription.fail_cnt = 0;
        }
    }

    /// Counts a failed notification. Returns the observer once it has failed
    /// more than `max_failures` times and was removed.
    pub(crate) fn fail_observer(
        &mut self,
        peer: &SocketAddr,
        token: &[u8],
        max_failures: u8,
    ) -> Option<Subscription> {
        let index = self.subscribers.iter().position(|s| s.matches(peer, token))?;
        let subscription = &mut self.subscribers[index];
        if subscription.fail_cnt < max_failures {
            subscription.fail_cnt += 1;
            return None;
        }
        debug!("removing observer {} of /{} after failed notifications", peer, self.uri);
        Some(self.subscribers.remove(index))
    }

    pub fn subscribers(&self) -> &[Subscription] {
        &self.subscribers
    }

    fn detach_subscribers(&mut self) -> usize {
        let count = self.subscribers.len();
        self.subscribers.clear();
        count
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.uri)
            .field("key", &self.key)
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes)
            .field("observable", &self.observable)
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

/// Resources keyed by the hash of their path.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<CoapKey, Resource>,
}

impl ResourceRegistry {
    pub fn new() -> ResourceRegistry {
        ResourceRegistry::default()
    }

    /// Adds `resource`, returning the one it replaces.
    pub fn add(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.insert(resource.key(), resource)
    }

    pub fn lookup(&self, key: &CoapKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn lookup_mut(&mut self, key: &CoapKey) -> Option<&mut Resource> {
        self.resources.get_mut(key)
    }

    pub fn remove(&mut self, key: &CoapKey) -> Option<Resource> {
        self.resources.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Detaches every subscriber, then drops all resources.
    pub fn clear(&mut self) {
        let detached: usize = self
            .resources
            .values_mut()
            .map(Resource::detach_subscribers)
            .sum();
        if detached > 0 {
            debug!("detached {} subscribers", detached);
        }
        self.resources.clear();
    }
}
