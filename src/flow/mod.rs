//! Describes the intent to transfer `data_bits` from a source `Host` to a
//! destination `Host` starting at `start_time_ms`. `spec.md` §3, §4.4.

pub mod controller;

use crate::defaults::DATA_PACKET_SIZE_BITS;
use crate::node::NodeId;
use crate::packet::PacketId;

pub use controller::ControllerState;

/// Identifier of a [`Flow`], unique within a [`Network`](crate::network::Network).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowId(u64);

impl FlowId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use = "function does not modify the current value"]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The congestion-control variant a [`Flow`] runs. `spec.md` §3, §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Reno,
    Fast,
}

/// The static description of a transfer: source, destination, size, start
/// time and protocol. `spec.md` §4.4: "Pure data carrier." Mutable
/// congestion-control state (`ControllerState`) lives on the sending
/// `Host`'s `ActiveFlow`, not here — see `spec.md` §9 "Flow ownership".
#[derive(Debug, Clone)]
pub struct Flow {
    id: FlowId,
    src: NodeId,
    dst: NodeId,
    data_bits: u64,
    start_time_ms: u64,
    protocol: Protocol,
}

impl Flow {
    pub(crate) fn new(
        id: FlowId,
        src: NodeId,
        dst: NodeId,
        data_bits: u64,
        start_time_ms: u64,
        protocol: Protocol,
    ) -> Self {
        Self {
            id,
            src,
            dst,
            data_bits,
            start_time_ms,
            protocol,
        }
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn src(&self) -> NodeId {
        self.src
    }

    pub fn dst(&self) -> NodeId {
        self.dst
    }

    pub fn data_bits(&self) -> u64 {
        self.data_bits
    }

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Number of DATA packets this flow's transfer materializes into:
    /// `⌈data_bits / DATA_PACKET_SIZE⌉`. `spec.md` §3.
    pub fn packet_count(&self) -> u64 {
        self.data_bits.div_ceil(DATA_PACKET_SIZE_BITS)
    }

    /// The contiguous range of DATA packet ids this flow's transfer
    /// produces once activated, starting at `first_id`.
    pub fn packet_ids(&self, first_id: PacketId) -> (PacketId, PacketId) {
        let count = self.packet_count();
        let max_id = PacketId::new(first_id.into_u64() + count.saturating_sub(1));
        (first_id, max_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_packet_flow_emits_exactly_one_packet() {
        let flow = Flow::new(
            FlowId::new(0),
            NodeId::ZERO,
            NodeId::ONE,
            DATA_PACKET_SIZE_BITS - 1,
            0,
            Protocol::Reno,
        );
        assert_eq!(flow.packet_count(), 1);
    }

    #[test]
    fn exact_multiple_divides_evenly() {
        let flow = Flow::new(
            FlowId::new(0),
            NodeId::ZERO,
            NodeId::ONE,
            DATA_PACKET_SIZE_BITS * 10,
            0,
            Protocol::Reno,
        );
        assert_eq!(flow.packet_count(), 10);
        let (first, max) = flow.packet_ids(PacketId::new(1));
        assert_eq!(first, PacketId::new(1));
        assert_eq!(max, PacketId::new(10));
    }
}
