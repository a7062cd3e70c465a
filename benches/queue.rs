#![feature(test)]

extern crate test;

use coap_lite::MessageType;
use coap_net::queue::{DeltaQueue, QueueNode};
use coap_net::{Pdu, Tid, TransportKind};

fn node(id: u16, t: u64) -> QueueNode {
    let pdu = Pdu::init(MessageType::Confirmable, 69, id, 64);
    let mut node = QueueNode::new(Tid(id), "127.0.0.1:5683".parse().unwrap(), pdu, TransportKind::Udp);
    node.t = t;
    node
}

#[bench]
fn bench_insert_and_drain(b: &mut test::Bencher) {
    let nodes: Vec<QueueNode> = (0..256u16)
        .map(|i| node(i, (i as u64 * 7919) % 5000))
        .collect();

    b.iter(|| {
        let mut queue = DeltaQueue::new();
        for node in nodes.iter().cloned() {
            queue.insert(node);
        }
        while queue.pop().is_some() {}
    });
}
