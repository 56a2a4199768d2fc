//! Originates [`Flow`]s, sends DATA packets under a sliding window, receives
//! ACKs, runs the congestion-control state machine, and emits ACKs for
//! received DATA packets. `spec.md` §4.2.

use crate::defaults::ACK_SETUP_SIZE_BITS;
use crate::flow::{ControllerState, Flow, FlowId, Protocol};
use crate::link::Link;
use crate::node::NodeId;
use crate::packet::{Packet, PacketId, PacketKind};
use std::collections::{BTreeMap, VecDeque};

/// Receiver-side record of an in-progress incoming flow. `spec.md` §3.
#[derive(Debug, Clone, Copy)]
pub struct Download {
    pub next_expected_id: PacketId,
    pub max_id: PacketId,
}

impl Download {
    fn is_complete(&self) -> bool {
        self.next_expected_id.into_u64() > self.max_id.into_u64()
    }
}

/// A [`Flow`] this `Host` is actively sending, paired with its mutable
/// congestion-control state. `spec.md` §3 "Host".
struct ActiveFlow {
    flow_id: FlowId,
    dst: NodeId,
    protocol: Protocol,
    first_id: PacketId,
    max_id: PacketId,
    /// The flow's packet queue front id (`Q` in `spec.md` §4.3): the lowest
    /// outstanding, not-yet-cumulatively-ACKed packet id.
    queue_front: PacketId,
    controller: ControllerState,
    /// Packet ids a duplicate-ACK fast retransmit decided to resend, not
    /// yet applied to the link: `receive_packet` cannot reach `&mut Link`,
    /// so the send is deferred to the next `run_send_phase` call.
    pending_retransmits: Vec<PacketId>,
}

impl ActiveFlow {
    fn packet_for(&self, id: PacketId, src: NodeId) -> Packet {
        Packet::data(id, crate::defaults::DATA_PACKET_SIZE_BITS, src, self.dst)
    }
}

/// A simulated endpoint that originates and terminates [`Flow`]s.
/// `spec.md` §3 "Host": "exactly one link attached".
pub struct Host {
    id: NodeId,
    link: Option<crate::link::LinkId>,
    total_packets_generated: u64,
    immediate_queue: VecDeque<Packet>,
    flows_by_dst: BTreeMap<NodeId, Vec<ActiveFlow>>,
    downloads_by_src: BTreeMap<NodeId, Vec<Download>>,
    completed_flows: Vec<FlowId>,
}

impl Host {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            link: None,
            total_packets_generated: 0,
            immediate_queue: VecDeque::new(),
            flows_by_dst: BTreeMap::new(),
            downloads_by_src: BTreeMap::new(),
            completed_flows: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn link(&self) -> Option<crate::link::LinkId> {
        self.link
    }

    pub(crate) fn attach_link(&mut self, link: crate::link::LinkId) {
        self.link = Some(link);
    }

    /// Drains and returns ids of flows that completed this tick (their
    /// final cumulative ACK was just processed). `spec.md` §8 invariant 6.
    pub fn take_completed_flows(&mut self) -> Vec<FlowId> {
        std::mem::take(&mut self.completed_flows)
    }

    /// Number of flows this host is actively sending (not yet completed).
    pub fn active_flow_count(&self) -> usize {
        self.flows_by_dst.values().map(Vec::len).sum()
    }

    /// Point-in-time analytics snapshot for one of this host's active
    /// flows, if it is the sender and the flow hasn't completed yet.
    /// `spec.md` §6: "Per Flow: window size (packets), flow rate (Mbps
    /// averaged over Δ)."
    pub fn flow_stats(&self, flow_id: FlowId) -> Option<crate::stats::FlowStats> {
        self.flows_by_dst
            .values()
            .flatten()
            .find(|active| active.flow_id == flow_id)
            .map(|active| crate::stats::FlowStats::from_controller(&active.controller))
    }

    /// `spec.md` §4.2: "register as sender; materialize its packet sequence
    /// with ids starting at `total_packets_generated`; push a SETUP packet
    /// into `immediate_queue`." The SETUP packet itself consumes the id
    /// immediately preceding the flow's first DATA packet (see
    /// `PacketKind::Setup`), so the counter advances by `1 + packet_count`.
    pub fn add_flow(&mut self, flow: &Flow) {
        let setup_id = PacketId::new(self.total_packets_generated);
        self.total_packets_generated += 1;

        let first_id = PacketId::new(self.total_packets_generated);
        let (first_id, max_id) = flow.packet_ids(first_id);
        self.total_packets_generated = max_id.into_u64() + 1;

        self.flows_by_dst.entry(flow.dst()).or_default().push(ActiveFlow {
            flow_id: flow.id(),
            dst: flow.dst(),
            protocol: flow.protocol(),
            first_id,
            max_id,
            queue_front: first_id,
            controller: ControllerState::new(),
            pending_retransmits: Vec::new(),
        });

        let setup = Packet::setup(setup_id, ACK_SETUP_SIZE_BITS, self.id, flow.dst(), max_id);
        self.immediate_queue.push_back(setup);
    }

    /// `spec.md` §4.2: "flush `immediate_queue` to the link, then for each
    /// active flow run the send phase."
    pub fn update(&mut self, now_ms: u64, link: &mut Link) {
        while let Some(packet) = self.immediate_queue.pop_front() {
            link.add_packet(packet, self.id, now_ms);
        }

        for flows in self.flows_by_dst.values_mut() {
            flows.retain_mut(|active| {
                let complete = run_send_phase(active, self.id, now_ms, link);
                if complete {
                    self.completed_flows.push(active.flow_id);
                }
                !complete
            });
        }
    }

    /// `spec.md` §4.2 "Receive": dispatch by packet kind.
    pub fn receive_packet(&mut self, packet: Packet, now_ms: u64) {
        match packet.kind() {
            PacketKind::Setup { max_data_id } => {
                self.downloads_by_src
                    .entry(packet.src())
                    .or_default()
                    .push(Download {
                        next_expected_id: packet.id().next(),
                        max_id: max_data_id,
                    });
            }
            PacketKind::Data => {
                let src = packet.src();
                let Some(downloads) = self.downloads_by_src.get_mut(&src) else {
                    // no registered Download for this source: spec.md §7
                    // treats this as a bug, not a silent ignore.
                    panic!("host {} received DATA from unregistered source {src}", self.id);
                };
                let id = packet.id();
                let Some(download) = downloads
                    .iter_mut()
                    .find(|d| d.next_expected_id.into_u64() <= id.into_u64() && id.into_u64() <= d.max_id.into_u64())
                else {
                    // out-of-window DATA: silently ignored.
                    return;
                };
                if id == download.next_expected_id {
                    download.next_expected_id = download.next_expected_id.next();
                }
                let ack_id = download.next_expected_id;
                let complete = download.is_complete();
                if complete {
                    downloads.retain(|d| d.next_expected_id.into_u64() <= d.max_id.into_u64());
                }
                let ack = Packet::ack(ack_id, ACK_SETUP_SIZE_BITS, self.id, src);
                self.immediate_queue.push_back(ack);
            }
            PacketKind::Ack => {
                let src = packet.src();
                let ack_id = packet.id();
                if let Some(flows) = self.flows_by_dst.get_mut(&src) {
                    // An ACK carries no flow id: it is routed to the one
                    // active flow whose packet-id range it falls in, since
                    // `total_packets_generated` makes a host's own flows'
                    // id ranges disjoint. `spec.md` §3 "Host" invariant.
                    if let Some(active) = flows.iter_mut().find(|a| {
                        ack_id.into_u64() >= a.first_id.into_u64()
                            && ack_id.into_u64() <= a.max_id.into_u64() + 1
                    }) {
                        let old_front = active.queue_front;
                        let max_id = active.max_id;
                        let action = active
                            .controller
                            .on_ack(ack_id, old_front, max_id, active.protocol, now_ms);
                        if ack_id.into_u64() > old_front.into_u64()
                            && ack_id.into_u64() <= max_id.into_u64() + 1
                        {
                            active.queue_front = ack_id;
                        }
                        active.pending_retransmits.extend(action.retransmit);
                    }
                }
            }
        }
    }
}

/// Runs the per-tick send phase for one `ActiveFlow`: duplicate-ACK
/// retransmit, then timer sweep, then window fill. Returns `true` if the
/// flow just completed.
///
/// This folds `spec.md` §4.3's "Duplicate ACK" retransmit command (which in
/// the spec's pseudocode calls `link.add_packet` directly from inside ACK
/// handling) into the same per-tick phase as the timer sweep and window
/// fill, since both need `&mut Link`: `Host::receive_packet` cannot take a
/// link reference (it does not own the queuing side of the tick), so the
/// retransmit produced by a duplicate ACK is carried on `ActiveFlow` as
/// pending work and drained here, at the start of the flow's send phase,
/// before the timer sweep — this runs in the same tick's Host `update` as
/// the ACK that triggered it, since both precede the next Link `update` in
/// the ordering guarantees (§5).
fn run_send_phase(active: &mut ActiveFlow, self_id: NodeId, now_ms: u64, link: &mut Link) -> bool {
    let pending_retransmits: Vec<PacketId> = active.pending_retransmits.drain(..).collect();
    for id in pending_retransmits {
        link.clear_buffer(self_id);
        link.add_packet(active.packet_for(id, self_id), self_id, now_ms);
        active.controller.on_retransmit_sent(id, now_ms);
    }

    for id in active.controller.timed_out_ids(now_ms) {
        active.controller.on_timeout(id, now_ms);
        link.clear_buffer(self_id);
        link.add_packet(active.packet_for(id, self_id), self_id, now_ms);
    }

    active.controller.take_fr_fr_exit();

    let mut candidate = active
        .controller
        .most_recent_queued
        .map(PacketId::next)
        .unwrap_or(active.first_id);

    while active.controller.has_room_in_window() && candidate.into_u64() <= active.max_id.into_u64()
    {
        let packet = active.packet_for(candidate, self_id);
        active.controller.record_send(candidate, now_ms);
        link.add_packet(packet, self_id, now_ms);
        candidate = candidate.next();
    }

    active.queue_front.into_u64() > active.max_id.into_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DATA_PACKET_SIZE_BITS;
    use crate::flow::Flow;
    use crate::link::{Link, LinkId};

    fn make_link() -> Link {
        Link::new(LinkId::new(0), NodeId::ZERO, NodeId::ONE, 1_000_000, 1, u64::MAX)
    }

    #[test]
    fn add_flow_pushes_setup_and_materializes_ids() {
        let mut host = Host::new(NodeId::ZERO);
        let flow = Flow::new(
            FlowId::new(0),
            NodeId::ZERO,
            NodeId::ONE,
            DATA_PACKET_SIZE_BITS * 3,
            0,
            Protocol::Reno,
        );
        host.add_flow(&flow);
        assert_eq!(host.immediate_queue.len(), 1);
        assert_eq!(host.total_packets_generated, 4); // 1 setup id + 3 data ids
    }

    #[test]
    fn window_fill_sends_up_to_cwnd_packets() {
        let mut host = Host::new(NodeId::ZERO);
        let flow = Flow::new(
            FlowId::new(0),
            NodeId::ZERO,
            NodeId::ONE,
            DATA_PACKET_SIZE_BITS * 5,
            0,
            Protocol::Reno,
        );
        host.add_flow(&flow);
        let mut link = make_link();
        host.update(0, &mut link); // flushes SETUP
        host.update(0, &mut link); // window fill: cwnd starts at 1
        let active = &host.flows_by_dst[&NodeId::ONE][0];
        assert_eq!(active.controller.window_occupied, 1);
    }

    #[test]
    fn receive_setup_then_data_emits_cumulative_ack() {
        let mut host = Host::new(NodeId::ONE);
        host.receive_packet(
            Packet::setup(PacketId::new(0), 512, NodeId::ZERO, NodeId::ONE, PacketId::new(2)),
            0,
        );
        host.receive_packet(
            Packet::data(PacketId::new(1), DATA_PACKET_SIZE_BITS, NodeId::ZERO, NodeId::ONE),
            1,
        );
        assert_eq!(host.immediate_queue.len(), 1);
        let ack = host.immediate_queue.front().unwrap();
        assert_eq!(ack.id(), PacketId::new(2));
    }

    #[test]
    fn out_of_window_data_is_ignored() {
        let mut host = Host::new(NodeId::ONE);
        host.receive_packet(
            Packet::setup(PacketId::new(0), 512, NodeId::ZERO, NodeId::ONE, PacketId::new(2)),
            0,
        );
        host.receive_packet(
            Packet::data(PacketId::new(99), DATA_PACKET_SIZE_BITS, NodeId::ZERO, NodeId::ONE),
            1,
        );
        assert!(host.immediate_queue.is_empty());
    }
}
