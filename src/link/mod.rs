//! Bidirectional store-and-forward pipe: per-direction FIFO buffers of fixed
//! bit capacity, a single shared transmission slot, and per-direction
//! queuing-delay estimates. `spec.md` §4.1.

use crate::measure::{QueueDelayEstimator, ThroughputEstimator};
use crate::node::NodeId;
use crate::packet::Packet;
use std::collections::VecDeque;

/// Identifier of a [`Link`], unique within a [`Network`](crate::network::Network).
///
/// Unlike the teacher's `link::Id` (an unordered pair key, appropriate for a
/// full-duplex per-direction-channel model where only one link can ever join
/// two given nodes) this is a plain sequence counter: our `Link` already
/// distinguishes `left_node`/`right_node` internally for the half-duplex
/// buffer model, so no canonicalization is needed. See `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u64);

impl LinkId {
    pub const ZERO: Self = Self(0);

    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use = "function does not modify the current value"]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which side of a [`Link`] a buffered or in-flight packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

struct Buffered {
    packet: Packet,
    enqueue_time_ms: u64,
}

struct Transmission {
    packet: Packet,
    /// The side the packet entered from; it is delivered to the other side.
    from: Side,
    transmission_start_ms: u64,
    bits_transmitted: u64,
}

/// A delivered packet, ready to be handed to its destination
/// [`Host`](crate::node::Host) by the [`Network`](crate::network::Network).
pub struct Delivered {
    pub packet: Packet,
    pub link: LinkId,
}

/// Bidirectional, half-duplex, store-and-forward link between two nodes.
pub struct Link {
    id: LinkId,
    rate_bpms: u64,
    propagation_delay_ms: u64,
    buffer_capacity_bits: u64,
    left_node: NodeId,
    right_node: NodeId,
    left_buf: VecDeque<Buffered>,
    right_buf: VecDeque<Buffered>,
    left_free_bits: u64,
    right_free_bits: u64,
    in_transit: Option<Transmission>,
    left_queue_delay: QueueDelayEstimator,
    right_queue_delay: QueueDelayEstimator,
    left_throughput: ThroughputEstimator,
    right_throughput: ThroughputEstimator,
    left_drops: u64,
    right_drops: u64,
    left_bits_delivered: u64,
    right_bits_delivered: u64,
}

impl Link {
    pub(crate) fn new(
        id: LinkId,
        left_node: NodeId,
        right_node: NodeId,
        rate_bpms: u64,
        propagation_delay_ms: u64,
        buffer_capacity_bits: u64,
    ) -> Self {
        Self {
            id,
            rate_bpms,
            propagation_delay_ms,
            buffer_capacity_bits,
            left_node,
            right_node,
            left_buf: VecDeque::new(),
            right_buf: VecDeque::new(),
            left_free_bits: buffer_capacity_bits,
            right_free_bits: buffer_capacity_bits,
            in_transit: None,
            left_queue_delay: QueueDelayEstimator::new(),
            right_queue_delay: QueueDelayEstimator::new(),
            left_throughput: ThroughputEstimator::new(),
            right_throughput: ThroughputEstimator::new(),
            left_drops: 0,
            right_drops: 0,
            left_bits_delivered: 0,
            right_bits_delivered: 0,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn rate_bpms(&self) -> u64 {
        self.rate_bpms
    }

    pub fn left_node(&self) -> NodeId {
        self.left_node
    }

    pub fn right_node(&self) -> NodeId {
        self.right_node
    }

    pub fn connects(&self, node: NodeId) -> bool {
        self.left_node == node || self.right_node == node
    }

    fn side_of(&self, node: NodeId) -> Side {
        if node == self.left_node {
            Side::Left
        } else if node == self.right_node {
            Side::Right
        } else {
            // spec.md §7: "Sentinel in add_packet from an unconnected node:
            // treated as a bug (assertion) rather than a drop."
            panic!("link {} has no endpoint {node}", self.id.0)
        }
    }

    fn buf_mut(&mut self, side: Side) -> &mut VecDeque<Buffered> {
        match side {
            Side::Left => &mut self.left_buf,
            Side::Right => &mut self.right_buf,
        }
    }

    fn free_bits_mut(&mut self, side: Side) -> &mut u64 {
        match side {
            Side::Left => &mut self.left_free_bits,
            Side::Right => &mut self.right_free_bits,
        }
    }

    pub fn free_bits(&self, side: Side) -> u64 {
        match side {
            Side::Left => self.left_free_bits,
            Side::Right => self.right_free_bits,
        }
    }

    pub fn drops(&self, side: Side) -> u64 {
        match side {
            Side::Left => self.left_drops,
            Side::Right => self.right_drops,
        }
    }

    pub fn bits_delivered(&self, side: Side) -> u64 {
        match side {
            Side::Left => self.left_bits_delivered,
            Side::Right => self.right_bits_delivered,
        }
    }

    /// Recent delivered-throughput estimate, in Mbps, for packets arriving
    /// at `side` (i.e. sent from the opposite side).
    pub fn throughput_mbps(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_throughput.estimate_mbps(),
            Side::Right => self.right_throughput.estimate_mbps(),
        }
    }

    pub fn buffer_capacity_bits(&self) -> u64 {
        self.buffer_capacity_bits
    }

    /// Enqueue `packet` into the buffer belonging to `sending_node`.
    /// Returns `true` if accepted, `false` (and counts a drop) if the
    /// buffer has insufficient free capacity. `spec.md` §4.1.
    pub fn add_packet(&mut self, packet: Packet, sending_node: NodeId, now_ms: u64) -> bool {
        let side = self.side_of(sending_node);
        let free = *self.free_bits_mut(side);
        if packet.size_bits() <= free {
            *self.free_bits_mut(side) -= packet.size_bits();
            self.buf_mut(side).push_back(Buffered {
                packet,
                enqueue_time_ms: now_ms,
            });
            true
        } else {
            match side {
                Side::Left => self.left_drops += 1,
                Side::Right => self.right_drops += 1,
            }
            false
        }
    }

    /// Atomically empty `sending_node`'s buffer and restore its free
    /// capacity to full. Idempotent: calling twice in a row is the same as
    /// calling once.
    pub fn clear_buffer(&mut self, sending_node: NodeId) {
        let side = self.side_of(sending_node);
        self.buf_mut(side).clear();
        *self.free_bits_mut(side) = self.buffer_capacity_bits;
    }

    /// `propagation_delay_ms + estimated_queuing_delay` for the direction
    /// outbound from `node`. Per `spec.md` §9 open question 5, this reads
    /// the *opposite* side's queuing estimate — the behavior of the
    /// reference is preserved as-is, not "corrected".
    pub fn delay_for(&self, node: NodeId) -> u64 {
        let side = self.side_of(node);
        let opposite_estimate = match side.other() {
            Side::Left => self.left_queue_delay.estimate_ms(),
            Side::Right => self.right_queue_delay.estimate_ms(),
        };
        self.propagation_delay_ms + opposite_estimate
    }

    fn select_next(&mut self, now_ms: u64) -> Option<Transmission> {
        let left_head = self.left_buf.front().map(|b| b.enqueue_time_ms);
        let right_head = self.right_buf.front().map(|b| b.enqueue_time_ms);

        let side = match (left_head, right_head) {
            (Some(l), Some(r)) => {
                if l <= r {
                    Side::Left
                } else {
                    Side::Right
                }
            }
            (Some(_), None) => Side::Left,
            (None, Some(_)) => Side::Right,
            (None, None) => return None,
        };

        let buffered = self.buf_mut(side).pop_front().expect("checked nonempty");
        *self.free_bits_mut(side) += buffered.packet.size_bits();

        let dwell = now_ms.saturating_sub(buffered.enqueue_time_ms);
        match side {
            Side::Left => self.left_queue_delay.record(dwell),
            Side::Right => self.right_queue_delay.record(dwell),
        }

        Some(Transmission {
            packet: buffered.packet,
            from: side,
            transmission_start_ms: now_ms,
            bits_transmitted: 0,
        })
    }

    /// Advance the link by `interval_ms`, draining buffers through the
    /// single shared transmission slot and returning every packet that
    /// completed delivery this tick. `spec.md` §4.1 "Transmission algorithm".
    pub fn update(&mut self, interval_ms: u64, now_ms: u64) -> Vec<Delivered> {
        self.left_queue_delay.advance(interval_ms);
        self.right_queue_delay.advance(interval_ms);
        self.left_throughput.advance(interval_ms);
        self.right_throughput.advance(interval_ms);

        let mut delivered = Vec::new();
        let mut usage_left: i64 = (interval_ms as i64).saturating_mul(self.rate_bpms as i64);

        while usage_left > 0 {
            if self.in_transit.is_none() {
                match self.select_next(now_ms) {
                    Some(t) => self.in_transit = Some(t),
                    None => break,
                }
            }

            let transmission = self.in_transit.as_mut().expect("just populated");
            let end_of_delay = transmission.transmission_start_ms + self.propagation_delay_ms;
            let tick_end = now_ms + interval_ms;
            if end_of_delay > tick_end {
                let reduced_ms = tick_end as i64 - end_of_delay as i64;
                usage_left = reduced_ms.saturating_mul(self.rate_bpms as i64);
                if usage_left <= 0 {
                    break;
                }
            }

            let remaining = transmission.packet.size_bits() - transmission.bits_transmitted;
            let chunk = usage_left.min(remaining as i64).max(0) as u64;
            transmission.bits_transmitted += chunk;
            usage_left -= chunk as i64;

            if transmission.bits_transmitted >= transmission.packet.size_bits() {
                let t = self.in_transit.take().expect("just borrowed");
                match t.from {
                    Side::Left => {
                        self.right_bits_delivered += t.packet.size_bits();
                        self.right_throughput.record_delivered(t.packet.size_bits());
                    }
                    Side::Right => {
                        self.left_bits_delivered += t.packet.size_bits();
                        self.left_throughput.record_delivered(t.packet.size_bits());
                    }
                }
                delivered.push(Delivered {
                    packet: t.packet,
                    link: self.id,
                });
            } else if chunk == 0 {
                break;
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{ACK_SETUP_SIZE_BITS, DATA_PACKET_SIZE_BITS};

    fn link(rate_bpms: u64, delay_ms: u64, capacity_bits: u64) -> Link {
        Link::new(
            LinkId::new(0),
            NodeId::ZERO,
            NodeId::ONE,
            rate_bpms,
            delay_ms,
            capacity_bits,
        )
    }

    #[test]
    fn add_packet_respects_free_bits() {
        let mut l = link(1_000, 0, DATA_PACKET_SIZE_BITS);
        let p = Packet::data(
            crate::packet::PacketId::new(1),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        assert!(l.add_packet(p, NodeId::ZERO, 0));
        assert_eq!(l.free_bits(Side::Left), 0);
        let p2 = Packet::data(
            crate::packet::PacketId::new(2),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        assert!(!l.add_packet(p2, NodeId::ZERO, 0));
        assert_eq!(l.drops(Side::Left), 1);
    }

    #[test]
    fn clear_buffer_is_idempotent() {
        let mut l = link(1_000, 0, DATA_PACKET_SIZE_BITS * 4);
        let p = Packet::data(
            crate::packet::PacketId::new(1),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        l.add_packet(p, NodeId::ZERO, 0);
        l.clear_buffer(NodeId::ZERO);
        let after_first = l.free_bits(Side::Left);
        l.clear_buffer(NodeId::ZERO);
        assert_eq!(l.free_bits(Side::Left), after_first);
        assert_eq!(after_first, DATA_PACKET_SIZE_BITS * 4);
    }

    #[test]
    #[should_panic]
    fn add_packet_from_unconnected_node_panics() {
        let mut l = link(1_000, 0, DATA_PACKET_SIZE_BITS);
        let p = Packet::data(
            crate::packet::PacketId::new(1),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        l.add_packet(p, NodeId::new(99), 0);
    }

    #[test]
    fn delivers_after_enough_bit_budget() {
        // 1000 bits/ms, 0 delay: a 8192-bit packet needs 9ms to fully cross.
        let mut l = link(1_000, 0, DATA_PACKET_SIZE_BITS);
        let p = Packet::data(
            crate::packet::PacketId::new(1),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        l.add_packet(p, NodeId::ZERO, 0);
        assert!(l.update(5, 0).is_empty());
        let delivered = l.update(4, 5);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].packet.id(), crate::packet::PacketId::new(1));
    }

    #[test]
    fn at_most_one_in_transit_system_wide() {
        let mut l = link(100_000, 0, DATA_PACKET_SIZE_BITS * 2);
        let a = Packet::data(
            crate::packet::PacketId::new(1),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        let b = Packet::data(
            crate::packet::PacketId::new(2),
            ACK_SETUP_SIZE_BITS,
            NodeId::ONE,
            NodeId::ZERO,
        );
        l.add_packet(a, NodeId::ZERO, 0);
        l.add_packet(b, NodeId::ONE, 0);
        assert!(l.in_transit.is_none());
        let delivered = l.update(1, 0);
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn buffer_too_small_drops_every_attempt() {
        let mut l = link(1_000, 0, DATA_PACKET_SIZE_BITS - 1);
        for i in 0..3u64 {
            let p = Packet::data(
                crate::packet::PacketId::new(i),
                DATA_PACKET_SIZE_BITS,
                NodeId::ZERO,
                NodeId::ONE,
            );
            assert!(!l.add_packet(p, NodeId::ZERO, 0));
        }
        assert_eq!(l.drops(Side::Left), 3);
    }

    #[test]
    fn propagation_delay_longer_than_tick_delays_delivery() {
        // delay (20ms) > Δ (5ms): packet enqueued at t=0 shouldn't be
        // delivered before ceil(20/5) = 4 ticks.
        let mut l = link(100_000, 20, DATA_PACKET_SIZE_BITS);
        let p = Packet::data(
            crate::packet::PacketId::new(1),
            DATA_PACKET_SIZE_BITS,
            NodeId::ZERO,
            NodeId::ONE,
        );
        l.add_packet(p, NodeId::ZERO, 0);
        let mut now = 0;
        let mut ticks = 0;
        let mut got = false;
        while ticks < 10 {
            if !l.update(5, now).is_empty() {
                got = true;
                break;
            }
            now += 5;
            ticks += 1;
        }
        assert!(got);
        assert!(ticks + 1 >= 4, "delivered too early at tick {ticks}");
    }
}
