//! The wire-level unit the simulator moves between [`Host`](crate::node::Host)s:
//! an immutable value describing id, size, endpoints and kind.

use crate::node::NodeId;
use anyhow::{bail, ensure, Result};
use std::fmt;

/// Identifier of a [`Packet`], unique within the sending [`Host`](crate::node::Host)
/// (see [`Host::total_packets_generated`](crate::node::Host)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(u64);

impl PacketId {
    pub const ZERO: Self = Self(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use = "function does not modify the current value"]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The three packet kinds the simulator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// A unit of a [`Flow`](crate::flow::Flow)'s transfer. Payload is implicit;
    /// only `size_bits` matters to the simulation.
    Data,
    /// Cumulative acknowledgment: "everything below `id` has arrived".
    Ack,
    /// Announces a new incoming [`Download`](crate::node::Download). Carries
    /// only `max_data_id`: the first DATA id is always `packet.id() + 1`
    /// (the SETUP packet consumes the id immediately before its flow's
    /// first DATA packet, so the receiver derives `next_expected_id` by
    /// incrementing the SETUP packet's own id).
    Setup { max_data_id: PacketId },
}

impl PacketKind {
    pub fn is_data(&self) -> bool {
        matches!(self, PacketKind::Data)
    }
}

/// An immutable value carrying id, size, source, destination and kind.
///
/// Packets are immutable once created and carry no generic payload — DATA
/// packets carry no bytes, only a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    id: PacketId,
    size_bits: u64,
    src: NodeId,
    dst: NodeId,
    kind: PacketKind,
}

impl Packet {
    pub fn data(id: PacketId, size_bits: u64, src: NodeId, dst: NodeId) -> Self {
        Self {
            id,
            size_bits,
            src,
            dst,
            kind: PacketKind::Data,
        }
    }

    pub fn ack(id: PacketId, size_bits: u64, src: NodeId, dst: NodeId) -> Self {
        Self {
            id,
            size_bits,
            src,
            dst,
            kind: PacketKind::Ack,
        }
    }

    pub fn setup(
        id: PacketId,
        size_bits: u64,
        src: NodeId,
        dst: NodeId,
        max_data_id: PacketId,
    ) -> Self {
        Self {
            id,
            size_bits,
            src,
            dst,
            kind: PacketKind::Setup { max_data_id },
        }
    }

    pub fn id(&self) -> PacketId {
        self.id
    }

    pub fn size_bits(&self) -> u64 {
        self.size_bits
    }

    pub fn src(&self) -> NodeId {
        self.src
    }

    pub fn dst(&self) -> NodeId {
        self.dst
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Start building a [`Packet`] one field at a time, with the ad-hoc
    /// validation [`PacketBuilder::build`] applies. `Packet::data`/`ack`/
    /// `setup` remain the concrete, infallible constructors this crate uses
    /// internally; `builder` is for callers (e.g. an external topology
    /// loader) assembling a packet from fields that may be missing or
    /// malformed.
    pub fn builder() -> PacketBuilder {
        PacketBuilder::new()
    }
}

/// Builder for constructing a [`Packet`] with ad-hoc validation.
///
/// Obtained via [`Packet::builder`]. `id`, `from`, `to` and a kind (set via
/// [`data`](PacketBuilder::data), [`ack`](PacketBuilder::ack) or
/// [`setup`](PacketBuilder::setup)) must all be set; [`build`](PacketBuilder::build)
/// returns an error if any is missing or if the assembled fields violate an
/// invariant `spec.md` §3 "Packet"/"Link" relies on.
#[derive(Debug, Default)]
pub struct PacketBuilder {
    id: Option<PacketId>,
    size_bits: Option<u64>,
    src: Option<NodeId>,
    dst: Option<NodeId>,
    kind: Option<PacketKind>,
}

impl PacketBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: PacketId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn from(mut self, src: NodeId) -> Self {
        self.src = Some(src);
        self
    }

    pub fn to(mut self, dst: NodeId) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Set this packet's kind to DATA with the given payload size.
    pub fn data(mut self, size_bits: u64) -> Self {
        self.size_bits = Some(size_bits);
        self.kind = Some(PacketKind::Data);
        self
    }

    /// Set this packet's kind to ACK with the given payload size.
    pub fn ack(mut self, size_bits: u64) -> Self {
        self.size_bits = Some(size_bits);
        self.kind = Some(PacketKind::Ack);
        self
    }

    /// Set this packet's kind to SETUP with the given payload size and the
    /// flow's last DATA packet id.
    pub fn setup(mut self, size_bits: u64, max_data_id: PacketId) -> Self {
        self.size_bits = Some(size_bits);
        self.kind = Some(PacketKind::Setup { max_data_id });
        self
    }

    /// Finalise the packet.
    ///
    /// # Errors
    ///
    /// Returns an error if `id`, `from`, `to` or a kind were not set, if
    /// `size_bits` is zero, or if `from`/`to` name the same node (`spec.md`
    /// §3 "Link": a packet always crosses exactly one link between two
    /// distinct endpoints).
    pub fn build(self) -> Result<Packet> {
        let Some(id) = self.id else {
            bail!("Missing packet id (`id')")
        };
        let Some(src) = self.src else {
            bail!("Missing sender information (`from')")
        };
        let Some(dst) = self.dst else {
            bail!("Missing recipient information (`to')")
        };
        let Some(kind) = self.kind else {
            bail!("Missing packet kind (`data'/`ack'/`setup')")
        };
        let Some(size_bits) = self.size_bits else {
            bail!("Missing packet size (`size_bits')")
        };

        ensure!(size_bits > 0, "packet size_bits must be positive, got {size_bits}");
        ensure!(src != dst, "packet src and dst must be distinct nodes, got {src}");

        Ok(Packet {
            id,
            size_bits,
            src,
            dst,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_packet_carries_size_only() {
        let p = Packet::data(PacketId::new(1), 8192, NodeId::ZERO, NodeId::ONE);
        assert!(p.kind().is_data());
        assert_eq!(p.size_bits(), 8192);
    }

    #[test]
    fn ack_id_is_next_expected() {
        let p = Packet::ack(PacketId::new(4), 512, NodeId::ONE, NodeId::ZERO);
        assert_eq!(p.id(), PacketId::new(4));
        assert_eq!(p.kind(), PacketKind::Ack);
    }

    #[test]
    fn setup_carries_window_bounds() {
        let p = Packet::setup(
            PacketId::new(0),
            512,
            NodeId::ZERO,
            NodeId::ONE,
            PacketId::new(10),
        );
        assert_eq!(p.id(), PacketId::new(0));
        match p.kind() {
            PacketKind::Setup { max_data_id } => {
                assert_eq!(max_data_id, PacketId::new(10));
            }
            _ => panic!("expected Setup"),
        }
    }

    #[test]
    fn builder_missing_from() {
        let Err(error) = Packet::builder().id(PacketId::new(1)).to(NodeId::ONE).data(8192).build()
        else {
            panic!("Expecting an error because missing the `from'")
        };
        assert_eq!(error.to_string(), "Missing sender information (`from')");
    }

    #[test]
    fn builder_missing_to() {
        let Err(error) = Packet::builder()
            .id(PacketId::new(1))
            .from(NodeId::ZERO)
            .data(8192)
            .build()
        else {
            panic!("Expecting an error because missing the `to'")
        };
        assert_eq!(error.to_string(), "Missing recipient information (`to')");
    }

    #[test]
    fn builder_missing_kind() {
        let Err(error) = Packet::builder()
            .id(PacketId::new(1))
            .from(NodeId::ZERO)
            .to(NodeId::ONE)
            .build()
        else {
            panic!("Expecting an error because missing a kind")
        };
        assert_eq!(error.to_string(), "Missing packet kind (`data'/`ack'/`setup')");
    }

    #[test]
    fn builder_rejects_zero_size() {
        let Err(error) = Packet::builder()
            .id(PacketId::new(1))
            .from(NodeId::ZERO)
            .to(NodeId::ONE)
            .data(0)
            .build()
        else {
            panic!("Expecting an error because size_bits is zero")
        };
        assert_eq!(error.to_string(), "packet size_bits must be positive, got 0");
    }

    #[test]
    fn builder_rejects_same_src_and_dst() {
        let Err(error) = Packet::builder()
            .id(PacketId::new(1))
            .from(NodeId::ONE)
            .to(NodeId::ONE)
            .data(8192)
            .build()
        else {
            panic!("Expecting an error because src == dst")
        };
        assert_eq!(error.to_string(), "packet src and dst must be distinct nodes, got 1");
    }

    #[test]
    fn builder_builds_a_valid_data_packet() {
        let p = Packet::builder()
            .id(PacketId::new(7))
            .from(NodeId::ZERO)
            .to(NodeId::ONE)
            .data(8192)
            .build()
            .expect("all required fields were set");
        assert!(p.kind().is_data());
        assert_eq!(p.id(), PacketId::new(7));
        assert_eq!(p.size_bits(), 8192);
    }

    #[test]
    fn builder_builds_a_valid_setup_packet() {
        let p = Packet::builder()
            .id(PacketId::new(0))
            .from(NodeId::ZERO)
            .to(NodeId::ONE)
            .setup(512, PacketId::new(10))
            .build()
            .expect("all required fields were set");
        match p.kind() {
            PacketKind::Setup { max_data_id } => assert_eq!(max_data_id, PacketId::new(10)),
            _ => panic!("expected Setup"),
        }
    }
}
