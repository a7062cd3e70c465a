//! In-memory transport for exercising a [`Context`](crate::Context) without sockets.
use std::collections::VecDeque;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::pdu::Pdu;
use crate::transport::{RecvInfo, Transport, TransportKind};

#[derive(Default)]
struct MockState {
    inbound: VecDeque<(Vec<u8>, SocketAddr, Option<SocketAddr>)>,
    sent: Vec<(Vec<u8>, SocketAddr)>,
    fail_send: bool,
    block_when_empty: bool,
    closed: bool,
}

/// Transport whose traffic is scripted through its [`MockHandle`].
pub struct MockTransport {
    kind: TransportKind,
    local: SocketAddr,
    state: Arc<Mutex<MockState>>,
}

/// Test side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    kind: TransportKind,
    local: SocketAddr,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> (MockTransport, MockHandle) {
        let local: SocketAddr = "127.0.0.1:5683".parse().unwrap();
        let state = Arc::new(Mutex::new(MockState::default()));
        let transport = MockTransport {
            kind,
            local,
            state: state.clone(),
        };
        (transport, MockHandle { kind, local, state })
    }
}

impl MockHandle {
    /// Queues `bytes` as received from `remote` on the transport's own address.
    pub fn push_inbound(&self, bytes: Vec<u8>, remote: SocketAddr) {
        let local = self.local;
        self.push_inbound_to(bytes, remote, local);
    }

    pub fn push_inbound_to(&self, bytes: Vec<u8>, remote: SocketAddr, local: SocketAddr) {
        self.state
            .lock()
            .unwrap()
            .inbound
            .push_back((bytes, remote, Some(local)));
    }

    pub fn push_pdu(&self, pdu: &Pdu, remote: SocketAddr) {
        self.push_inbound(pdu.encode(self.kind).unwrap(), remote);
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Removes and decodes everything sent so far.
    pub fn take_sent(&self) -> Vec<(Pdu, SocketAddr)> {
        let sent = std::mem::take(&mut self.state.lock().unwrap().sent);
        sent.into_iter()
            .map(|(bytes, dst)| (Pdu::parse(&bytes, self.kind).unwrap(), dst))
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    /// Makes `recv` wait forever instead of failing with `WouldBlock` when
    /// nothing is queued.
    pub fn set_block_when_empty(&self, block: bool) {
        self.state.lock().unwrap().block_when_empty = block;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        Ok(self.local)
    }

    async fn send_to(&self, buf: &[u8], dst: &SocketAddr) -> IoResult<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(IoError::new(ErrorKind::ConnectionRefused, "mock send failure"));
        }
        state.sent.push((buf.to_vec(), *dst));
        Ok(buf.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> IoResult<RecvInfo> {
        let (next, block) = {
            let mut state = self.state.lock().unwrap();
            (state.inbound.pop_front(), state.block_when_empty)
        };
        let (bytes, remote, local) = match next {
            Some(frame) => frame,
            None if block => return std::future::pending().await,
            None => return Err(IoError::from(ErrorKind::WouldBlock)),
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(RecvInfo { len, remote, local })
    }

    async fn close(&self) -> IoResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}
