//! Time ordered queues of in-flight messages.
//!
//! Every node stores its delay relative to its predecessor, so the absolute
//! due time of a node is the sum of `t` over the queue up to and including
//! it. Advancing time only touches the head.
use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::clock::{Tick, TickDiff};
use crate::pdu::Pdu;
use crate::tid::Tid;
use crate::transport::TransportKind;

/// One message waiting for retransmission or dispatch.
#[derive(Debug, Clone)]
pub struct QueueNode {
    /// Delay after the predecessor becomes due.
    pub t: Tick,
    /// Base retransmission timeout, scaled by the retransmission count.
    pub timeout: Tick,
    pub retransmit_cnt: u8,
    pub id: Tid,
    pub remote: SocketAddr,
    pub local: Option<SocketAddr>,
    pub pdu: Pdu,
    pub kind: TransportKind,
    /// Tick at which the node was created.
    pub timestamp: Tick,
}

impl QueueNode {
    pub fn new(id: Tid, remote: SocketAddr, pdu: Pdu, kind: TransportKind) -> QueueNode {
        QueueNode {
            t: 0,
            timeout: 0,
            retransmit_cnt: 0,
            id,
            remote,
            local: None,
            pdu,
            kind,
            timestamp: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeltaQueue {
    nodes: VecDeque<QueueNode>,
}

impl DeltaQueue {
    pub fn new() -> DeltaQueue {
        DeltaQueue {
            nodes: VecDeque::new(),
        }
    }

    /// Inserts `node` whose `t` is its delay relative to the queue base.
    /// Nodes due at the same time keep their insertion order.
    pub fn insert(&mut self, mut node: QueueNode) {
        let mut index = 0;
        while let Some(next) = self.nodes.get(index) {
            if next.t > node.t {
                break;
            }
            node.t -= next.t;
            index += 1;
        }
        if let Some(next) = self.nodes.get_mut(index) {
            next.t -= node.t;
        }
        self.nodes.insert(index, node);
    }

    pub fn peek(&self) -> Option<&QueueNode> {
        self.nodes.front()
    }

    /// Removes the head. Its delay is folded into the new head.
    pub fn pop(&mut self) -> Option<QueueNode> {
        let node = self.nodes.pop_front()?;
        if let Some(next) = self.nodes.front_mut() {
            next.t += node.t;
        }
        Some(node)
    }

    /// Removes the first node with transaction id `id`.
    pub fn remove_by_id(&mut self, id: Tid) -> Option<QueueNode> {
        let index = self.nodes.iter().position(|node| node.id == id)?;
        self.remove_at(index)
    }

    /// Removes every node matching `predicate`, in queue order.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<QueueNode>
    where
        F: FnMut(&QueueNode) -> bool,
    {
        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.nodes.len() {
            if predicate(&self.nodes[index]) {
                if let Some(node) = self.remove_at(index) {
                    removed.push(node);
                }
            } else {
                index += 1;
            }
        }
        removed
    }

    fn remove_at(&mut self, index: usize) -> Option<QueueNode> {
        let node = self.nodes.remove(index)?;
        if let Some(next) = self.nodes.get_mut(index) {
            next.t += node.t;
        }
        Some(node)
    }

    pub fn find(&self, id: Tid) -> Option<&QueueNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Moves the queue base forward by `delta` ticks, or back if negative.
    ///
    /// Nodes that fall due are set to `t == 0` and counted; the first node
    /// still pending keeps the remainder of its delay.
    pub fn advance(&mut self, delta: TickDiff) -> usize {
        if delta <= 0 {
            if let Some(head) = self.nodes.front_mut() {
                head.t = head.t.saturating_add(delta.unsigned_abs());
            }
            return 0;
        }

        let delta = delta as Tick;
        let mut elapsed: Tick = 0;
        let mut expired = 0;
        for node in self.nodes.iter_mut() {
            if elapsed + node.t < delta {
                elapsed += node.t;
                node.t = 0;
                expired += 1;
            } else {
                node.t = elapsed + node.t - delta;
                break;
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueNode> {
        self.nodes.iter()
    }

    /// Drops every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Absolute due times in queue order, relative to the queue base.
    pub fn due_times(&self) -> Vec<Tick> {
        self.nodes
            .iter()
            .scan(0, |due, node| {
                *due += node.t;
                Some(*due)
            })
            .collect()
    }
}
