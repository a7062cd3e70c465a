//! Confirmable messages and their retransmission with exponential backoff.
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, warn};

use crate::clock::{Clock, Tick, TickDiff};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::pdu::Pdu;
use crate::queue::QueueNode;
use crate::tid::Tid;

/// First responses carry codes from this value on; notifications are responses.
const FIRST_RESPONSE_CODE: u8 = 64;

impl Context {
    /// Sends a confirmable message and queues it for retransmission until it
    /// is acknowledged.
    ///
    /// Stream transports are reliable, so the message is sent once and not
    /// queued. If the first send fails nothing is queued.
    pub async fn send_confirmed(&mut self, dst: &SocketAddr, pdu: Pdu) -> Result<Tid> {
        let id = self.send(dst, &pdu).await?;
        if self.kind.is_stream() {
            return Ok(id);
        }

        let now = self.clock.now();
        let mut node = QueueNode::new(id, *dst, pdu, self.kind);
        node.timeout = self.initial_timeout();
        node.timestamp = now;
        if self.sendqueue.is_empty() {
            node.t = node.timeout;
            self.sendqueue_basetime = now;
        } else {
            node.t = now.saturating_sub(self.sendqueue_basetime) + node.timeout;
        }
        debug!("queued transaction {} to {}, due in {} ticks", id, dst, node.t);
        self.sendqueue.insert(node);
        Ok(id)
    }

    /// ACK timeout randomized to within `[1, 1.5]` times the configured base.
    fn initial_timeout(&self) -> Tick {
        let base = Clock::to_ticks(self.config.response_timeout);
        let random: u8 = rand::random();
        base + (((base / 2) * random as Tick) >> 8)
    }

    /// Sends `node` once more and queues it with a doubled delay, or gives it
    /// up once the retransmission limit is reached.
    ///
    /// A given up notification counts as failed against its observer.
    pub async fn retransmit(&mut self, mut node: QueueNode) -> Result<Option<Tid>> {
        if node.retransmit_cnt >= self.config.max_retransmit {
            debug!("giving up on transaction {} to {}", node.id, node.remote);
            if node.pdu.code() >= FIRST_RESPONSE_CODE {
                self.handle_failed_notify(&node.remote, node.pdu.token());
            }
            return Ok(None);
        }

        node.retransmit_cnt += 1;
        node.t = node
            .timeout
            .checked_shl(node.retransmit_cnt as u32)
            .unwrap_or(Tick::MAX);
        debug!(
            "retransmission #{} of transaction {}, next in {} ticks",
            node.retransmit_cnt, node.id, node.t
        );

        let bytes = node.pdu.encode(self.kind)?;
        let id = node.id;
        let remote = node.remote;
        self.sendqueue.insert(node);

        let transport = self.transport.as_ref().ok_or(Error::NotConnected)?;
        transport.send_to(&bytes, &remote).await?;
        Ok(Some(id))
    }

    /// Drops every queued message to `dst` carrying `token`.
    pub fn cancel_all_messages(&mut self, dst: &SocketAddr, token: &[u8]) -> usize {
        let removed = self
            .sendqueue
            .remove_where(|node| node.remote == *dst && node.pdu.token() == token);
        if !removed.is_empty() {
            debug!("cancelled {} messages to {}", removed.len(), dst);
        }
        removed.len()
    }

    /// Rebases the send queue onto `now`, returning how many messages fell due.
    pub fn adjust_basetime(&mut self, now: Tick) -> usize {
        let delta = now as TickDiff - self.sendqueue_basetime as TickDiff;
        self.sendqueue_basetime = now;
        if self.sendqueue.is_empty() {
            return 0;
        }
        self.sendqueue.advance(delta)
    }

    /// Retransmits every message that is due. Returns how many were handled.
    pub async fn retransmit_due(&mut self) -> Result<usize> {
        let now = self.clock.now();
        self.adjust_basetime(now);

        let mut handled = 0;
        while self.sendqueue.peek().map_or(false, |node| node.t == 0) {
            let node = match self.sendqueue.pop() {
                Some(node) => node,
                None => break,
            };
            handled += 1;
            if let Err(e) = self.retransmit(node).await {
                warn!("retransmission failed: {}", e);
            }
        }
        Ok(handled)
    }

    /// Time until the next queued message is due, if any.
    pub fn next_retransmission(&self) -> Option<Duration> {
        let head = self.sendqueue.peek()?;
        let due = self.sendqueue_basetime.saturating_add(head.t);
        Some(Clock::to_duration(due.saturating_sub(self.clock.now())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::resource::Resource;
    use crate::response::CONTENT;
    use crate::test_util::{MockHandle, MockTransport};
    use crate::transport::TransportKind;
    use coap_lite::MessageType;
    use std::sync::{Arc, Mutex};

    fn context(config: Config) -> (Context, MockHandle) {
        let (transport, handle) = MockTransport::new(TransportKind::Udp);
        (Context::with_transport(transport, config).unwrap(), handle)
    }

    fn peer() -> SocketAddr {
        "192.168.1.20:5683".parse().unwrap()
    }

    fn confirmable(code: u8, message_id: u16, token: &[u8]) -> Pdu {
        let mut pdu = Pdu::init(MessageType::Confirmable, code, message_id, 64);
        pdu.add_token(token);
        pdu
    }

    #[test]
    fn test_sub_tick_timeout_is_rejected() {
        let (transport, _handle) = MockTransport::new(TransportKind::Udp);
        let config = Config::default().with_response_timeout(Duration::from_micros(500));
        assert!(matches!(
            Context::with_transport(transport, config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_timeout_is_randomized_within_bounds() {
        let (mut context, _handle) = context(Config::default());
        for id in 0..20 {
            context.send_confirmed(&peer(), confirmable(1, id, &[])).await.unwrap();
        }
        for node in context.sendqueue().iter() {
            assert!((2000..=3000).contains(&node.timeout), "timeout {}", node.timeout);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_send_failure_queues_nothing() {
        let (mut context, handle) = context(Config::default());
        handle.set_fail_send(true);
        assert!(context.send_confirmed(&peer(), confirmable(1, 1, &[])).await.is_err());
        assert!(context.sendqueue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles() {
        let (mut context, handle) = context(Config::default());
        let tid = context.send_confirmed(&peer(), confirmable(1, 9, &[1])).await.unwrap();
        let timeout = context.find_transaction(tid).unwrap().timeout;

        let mut expected_wait = timeout;
        for cnt in 1..=4u8 {
            tokio::time::advance(Clock::to_duration(expected_wait)).await;
            assert_eq!(context.retransmit_due().await.unwrap(), 1);
            let node = context.find_transaction(tid).unwrap();
            assert_eq!(node.retransmit_cnt, cnt);
            assert_eq!(node.t, timeout << cnt);
            expected_wait = timeout << cnt;
        }
        assert_eq!(handle.sent_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_due_before_timeout() {
        let (mut context, handle) = context(Config::default());
        context.send_confirmed(&peer(), confirmable(1, 9, &[1])).await.unwrap();
        tokio::time::advance(Duration::from_millis(1999)).await;
        assert_eq!(context.retransmit_due().await.unwrap(), 0);
        assert_eq!(handle.sent_count(), 1);
        assert!(context.next_retransmission().unwrap() <= Duration::from_millis(1001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retransmission_limit_and_failed_notify() {
        let (mut context, handle) = context(Config::default());
        let mut resource = Resource::new("obs");
        resource.add_observer(&peer(), &[5]);
        context.add_resource(resource);

        let failed = Arc::new(Mutex::new(Vec::new()));
        let record = failed.clone();
        context.set_failed_notify_handler(move |peer, token| {
            record.lock().unwrap().push((*peer, token.to_vec()));
        });

        context
            .send_confirmed(&peer(), confirmable(CONTENT, 100, &[5]))
            .await
            .unwrap();

        let max_retransmit = context.config().max_retransmit as usize;
        let mut handled = 0;
        for _ in 0..max_retransmit + 2 {
            let wait = context
                .next_retransmission()
                .unwrap_or(Duration::from_secs(60));
            tokio::time::advance(wait).await;
            handled += context.retransmit_due().await.unwrap();
        }

        assert!(context.sendqueue().is_empty());
        assert_eq!(handled, max_retransmit + 1);
        // the first transmission plus one per retransmission
        assert_eq!(handle.sent_count(), max_retransmit + 1);
        assert_eq!(*failed.lock().unwrap(), vec![(peer(), vec![5])]);
        assert_eq!(
            context.resource("obs").unwrap().find_observer(&peer(), &[5]).map(|s| s.fail_cnt),
            Some(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_do_not_notify_failure() {
        let config = Config::default().with_max_retransmit(0);
        let (mut context, _handle) = context(config);
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        context.set_failed_notify_handler(move |_, _| *flag.lock().unwrap() = true);

        context.send_confirmed(&peer(), confirmable(1, 1, &[])).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(context.retransmit_due().await.unwrap(), 1);
        assert!(context.sendqueue().is_empty());
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_messages() {
        let (mut context, _handle) = context(Config::default());
        let other: SocketAddr = "192.168.1.21:5683".parse().unwrap();
        context.send_confirmed(&peer(), confirmable(CONTENT, 1, &[1])).await.unwrap();
        context.send_confirmed(&peer(), confirmable(CONTENT, 2, &[2])).await.unwrap();
        context.send_confirmed(&other, confirmable(CONTENT, 3, &[1])).await.unwrap();
        context.send_confirmed(&peer(), confirmable(CONTENT, 4, &[1])).await.unwrap();

        assert_eq!(context.cancel_all_messages(&peer(), &[1]), 2);
        assert_eq!(context.sendqueue().len(), 2);
        assert_eq!(context.cancel_all_messages(&peer(), &[1]), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_sends_are_relative_to_basetime() {
        let (mut context, _handle) = context(Config::default());
        let first = context.send_confirmed(&peer(), confirmable(1, 1, &[])).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let second = context.send_confirmed(&peer(), confirmable(1, 2, &[])).await.unwrap();

        let first_due = context.find_transaction(first).unwrap().timeout;
        let second_due = 500 + context.find_transaction(second).unwrap().timeout;
        let mut expected = vec![first_due, second_due];
        expected.sort_unstable();
        assert_eq!(context.sendqueue().due_times(), expected);
    }
}
