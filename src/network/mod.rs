//! The tick-driven registry and driver for a fixed topology of [`Host`]s and
//! [`Link`]s. `spec.md` §2 "SYSTEM OVERVIEW", §5, §6.
//!
//! `Network` owns the arena of components and exposes the builder surface
//! an external configuration loader drives (§6 "Configuration"), plus the
//! `tick` entry point an external driver calls once per Δ. The simulator
//! itself never reads a config file, never owns process lifetime, and never
//! calls out to an analytics sink — those are external collaborators by
//! design (§1 "OUT OF SCOPE").

use crate::flow::{Flow, FlowId, Protocol};
use crate::link::{Link, LinkId};
use crate::node::{Host, NodeId};
use crate::stats::{FlowStats, LinkStats};
use std::collections::BTreeMap;
use thiserror::Error;

/// Configuration errors the topology builder surface can report. `spec.md`
/// §7 "Configuration errors (fatal before run)": these are the only
/// `Result`-returning failures in the crate — everything else is either
/// counted (a drop) or an `assert!`/`panic!` invariant violation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    /// A `Link` or `Flow` referenced a [`NodeId`] that was never registered
    /// with [`Network::add_host`]. Not one of `spec.md` §7's named
    /// conditions, but required for a `Result`-based builder API to reject
    /// a dangling reference instead of panicking on lookup.
    #[error("node {0} is not a registered host")]
    UnknownHost(NodeId),
    /// §7: "a Host with no Link" — reported by [`Network::validate`], which
    /// a driver calls once topology construction is finished and before the
    /// first `tick`.
    #[error("host {0} has no link attached")]
    HostMissingLink(NodeId),
    /// §7: "a Link with an endpoint not matching either side" — here, a
    /// link whose two endpoints are the same host.
    #[error("link endpoints {0} and {1} must be distinct hosts")]
    LinkEndpointMismatch(NodeId, NodeId),
    /// §7: "a Flow whose src or dst is not a Host".
    #[error("flow endpoint {0} is not a registered host")]
    FlowEndpointNotHost(NodeId),
    /// §7: "negative or zero rate".
    #[error("link {0}-{1} must have a positive rate")]
    NonPositiveRate(NodeId, NodeId),
    /// §7: "negative or zero ... capacity".
    #[error("link {0}-{1} must have a positive buffer capacity")]
    NonPositiveCapacity(NodeId, NodeId),
    /// §7: "negative or zero ... delay".
    #[error("link {0}-{1} must have a positive propagation delay")]
    NonPositiveDelay(NodeId, NodeId),
}

/// The tick-driven registry of [`Host`]s, [`Link`]s and [`Flow`]s. `spec.md`
/// §2, §5, §6.
///
/// A `Network` is built up with [`add_host`](Network::add_host),
/// [`add_link`](Network::add_link) and [`add_flow`](Network::add_flow),
/// validated once with [`validate`](Network::validate), then driven one Δ
/// at a time with [`tick`](Network::tick) by an external loop — this crate
/// owns no clock and no thread (§1, §5 "single-threaded cooperative,
/// tick-driven").
pub struct Network {
    hosts: BTreeMap<NodeId, Host>,
    links: BTreeMap<LinkId, Link>,
    pending_flows: Vec<Flow>,
    completed_flow_ids: Vec<FlowId>,
    next_node_id: NodeId,
    next_link_id: LinkId,
    next_flow_id: FlowId,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Create an empty topology: no hosts, links or flows.
    pub fn new() -> Self {
        Self {
            hosts: BTreeMap::new(),
            links: BTreeMap::new(),
            pending_flows: Vec::new(),
            completed_flow_ids: Vec::new(),
            next_node_id: NodeId::ZERO,
            next_link_id: LinkId::ZERO,
            next_flow_id: FlowId::new(0),
        }
    }

    /// Register a new [`Host`] and return its [`NodeId`]. `spec.md` §6
    /// "Configuration ... a static description of Hosts (by address)".
    ///
    /// [`NodeId::ZERO`] is reserved as a sentinel and is never assigned.
    pub fn add_host(&mut self) -> NodeId {
        self.next_node_id = self.next_node_id.next();
        let id = self.next_node_id;
        self.hosts.insert(id, Host::new(id));
        id
    }

    /// Returns a reference to the [`Host`] registered under `id`, if any.
    pub fn host(&self, id: NodeId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    /// Register a bidirectional [`Link`] between two hosts. `spec.md` §6:
    /// "Links (rate in bits/ms, propagation delay in ms, buffer capacity in
    /// bits, left endpoint, right endpoint)". `spec.md` §7 validates rate,
    /// delay and capacity eagerly (constructing an invalid link is itself a
    /// config error, not deferred to [`validate`](Network::validate)).
    ///
    /// Each host attaches to at most one link, matching §1's "assumed
    /// static [routing] with one link per host" — attaching a second link
    /// to an already-linked host is an invariant violation, not a
    /// recoverable config error (`spec.md` §7), so it asserts.
    pub fn add_link(
        &mut self,
        a: NodeId,
        b: NodeId,
        rate_bpms: u64,
        propagation_delay_ms: u64,
        buffer_capacity_bits: u64,
    ) -> Result<LinkId, TopologyError> {
        if a == b {
            return Err(TopologyError::LinkEndpointMismatch(a, b));
        }
        if !self.hosts.contains_key(&a) {
            return Err(TopologyError::UnknownHost(a));
        }
        if !self.hosts.contains_key(&b) {
            return Err(TopologyError::UnknownHost(b));
        }
        if rate_bpms == 0 {
            return Err(TopologyError::NonPositiveRate(a, b));
        }
        if buffer_capacity_bits == 0 {
            return Err(TopologyError::NonPositiveCapacity(a, b));
        }
        if propagation_delay_ms == 0 {
            return Err(TopologyError::NonPositiveDelay(a, b));
        }

        self.next_link_id = self.next_link_id.next();
        let id = self.next_link_id;
        self.links.insert(
            id,
            Link::new(id, a, b, rate_bpms, propagation_delay_ms, buffer_capacity_bits),
        );

        let host_a = self.hosts.get_mut(&a).expect("checked above");
        debug_assert!(host_a.link().is_none(), "host {a} already has a link attached");
        host_a.attach_link(id);
        let host_b = self.hosts.get_mut(&b).expect("checked above");
        debug_assert!(host_b.link().is_none(), "host {b} already has a link attached");
        host_b.attach_link(id);

        Ok(id)
    }

    /// Returns a reference to the [`Link`] registered under `id`, if any.
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Register a new [`Flow`]: intent to transfer `data_bits` from `src`
    /// to `dst` starting at `start_time_ms`. `spec.md` §3 "Flow": the
    /// packet sequence is materialized lazily, the first tick `tick`
    /// observes `now_ms >= start_time_ms` (§3 "Lifecycle").
    pub fn add_flow(
        &mut self,
        src: NodeId,
        dst: NodeId,
        data_bits: u64,
        start_time_ms: u64,
        protocol: Protocol,
    ) -> Result<FlowId, TopologyError> {
        if !self.hosts.contains_key(&src) {
            return Err(TopologyError::FlowEndpointNotHost(src));
        }
        if !self.hosts.contains_key(&dst) {
            return Err(TopologyError::FlowEndpointNotHost(dst));
        }

        let id = self.next_flow_id;
        self.next_flow_id = self.next_flow_id.next();
        self.pending_flows
            .push(Flow::new(id, src, dst, data_bits, start_time_ms, protocol));
        Ok(id)
    }

    /// Validate the topology built so far. `spec.md` §7 "Configuration
    /// errors (fatal before run)": a `Host` with no `Link` attached. A
    /// driver calls this once, after construction and before the first
    /// `tick`.
    pub fn validate(&self) -> Result<(), TopologyError> {
        for (id, host) in &self.hosts {
            if host.link().is_none() {
                return Err(TopologyError::HostMissingLink(*id));
            }
        }
        Ok(())
    }

    /// The smallest tick length, in ms, for which every configured link's
    /// `rate_bpms` can move at least one bit. `spec.md` does not name this
    /// directly, but the teacher's `Network::minimum_step_duration` is the
    /// same guardrail against a tick too short to make progress on the
    /// slowest link; adapted here to the spec's integer-ms `Δ`. Returns `0`
    /// for a network with no links.
    pub fn min_tick_ms(&self) -> u64 {
        self.links
            .values()
            .map(|link| 1u64.div_ceil(link.rate_bpms().max(1)).max(1))
            .max()
            .unwrap_or(0)
    }

    /// Advance the whole topology by one tick of length `interval_ms`,
    /// ending at simulated time `now_ms`. `spec.md` §2 "Data flow per
    /// tick", §5 "Ordering guarantees": every `Host` runs its `update` to
    /// completion before any `Link`'s `update` runs; ACKs and SETUPs a
    /// `Link` delivers this tick land on the target `Host`'s
    /// `immediate_queue` and are not flushed until the *next* tick's `Host`
    /// `update`.
    pub fn tick(&mut self, interval_ms: u64, now_ms: u64) {
        self.activate_due_flows(now_ms);

        for host in self.hosts.values_mut() {
            if let Some(link_id) = host.link() {
                let link = self.links.get_mut(&link_id).expect("attached link exists");
                host.update(now_ms, link);
            }
            self.completed_flow_ids.extend(host.take_completed_flows());
        }

        for link in self.links.values_mut() {
            for delivered in link.update(interval_ms, now_ms) {
                if let Some(host) = self.hosts.get_mut(&delivered.packet.dst()) {
                    host.receive_packet(delivered.packet, now_ms);
                }
            }
        }
    }

    fn activate_due_flows(&mut self, now_ms: u64) {
        let Self {
            pending_flows,
            hosts,
            ..
        } = self;
        pending_flows.retain(|flow| {
            if now_ms < flow.start_time_ms() {
                return true;
            }
            if let Some(host) = hosts.get_mut(&flow.src()) {
                host.add_flow(flow);
            }
            false
        });
    }

    /// Ids of flows that completed (every packet cumulatively ACKed) since
    /// the last call. `spec.md` §5 "termination ... all flows are
    /// complete" is the external driver's responsibility; this is the
    /// signal it polls.
    pub fn take_completed_flows(&mut self) -> Vec<FlowId> {
        std::mem::take(&mut self.completed_flow_ids)
    }

    /// `true` once there is no pending or in-flight flow left anywhere in
    /// the topology — one of the two driver-owned termination conditions
    /// in `spec.md` §5.
    pub fn is_idle(&self) -> bool {
        self.pending_flows.is_empty() && self.hosts.values().all(|h| h.active_flow_count() == 0)
    }

    /// Point-in-time snapshot for one flow. `spec.md` §6 "Analytics sink":
    /// window size (packets) and, grounded in the controller's RTT
    /// estimate, an approximate flow rate. `None` once the flow has
    /// completed or before it has activated.
    pub fn flow_stats(&self, flow_id: FlowId) -> Option<FlowStats> {
        self.hosts.values().find_map(|h| h.flow_stats(flow_id))
    }

    /// Point-in-time snapshot for one link: per-direction buffer occupancy,
    /// throughput and cumulative drops. `spec.md` §6 "Analytics sink".
    pub fn link_stats(&self, link_id: LinkId) -> Option<LinkStats> {
        self.links.get(&link_id).map(LinkStats::from_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{ACK_SETUP_SIZE_BITS, DATA_PACKET_SIZE_BITS};

    fn topology() -> (Network, NodeId, NodeId) {
        let mut net = Network::new();
        let a = net.add_host();
        let b = net.add_host();
        net.add_link(a, b, 80, 10, 65_536).unwrap();
        (net, a, b)
    }

    #[test]
    fn add_link_rejects_self_loop() {
        let mut net = Network::new();
        let a = net.add_host();
        assert_eq!(
            net.add_link(a, a, 1, 1, 1),
            Err(TopologyError::LinkEndpointMismatch(a, a))
        );
    }

    #[test]
    fn add_link_rejects_zero_rate_capacity_delay() {
        let mut net = Network::new();
        let a = net.add_host();
        let b = net.add_host();
        assert_eq!(net.add_link(a, b, 0, 1, 1), Err(TopologyError::NonPositiveRate(a, b)));
        assert_eq!(
            net.add_link(a, b, 1, 1, 0),
            Err(TopologyError::NonPositiveCapacity(a, b))
        );
        assert_eq!(net.add_link(a, b, 1, 0, 1), Err(TopologyError::NonPositiveDelay(a, b)));
    }

    #[test]
    fn validate_reports_host_with_no_link() {
        let mut net = Network::new();
        let a = net.add_host();
        assert_eq!(net.validate(), Err(TopologyError::HostMissingLink(a)));
    }

    #[test]
    fn validate_passes_once_every_host_has_a_link() {
        let (net, _, _) = topology();
        assert!(net.validate().is_ok());
    }

    #[test]
    fn add_flow_rejects_unknown_endpoint() {
        let (mut net, a, _) = topology();
        let unknown = NodeId::new(999);
        assert_eq!(
            net.add_flow(a, unknown, 1, 0, Protocol::Reno),
            Err(TopologyError::FlowEndpointNotHost(unknown))
        );
    }

    /// S1 — single flow, lossless, Reno slow start: all 10 packets
    /// delivered in order, final ACK id = 11, zero drops.
    #[test]
    fn s1_single_flow_lossless_reno_slow_start_completes() {
        let (mut net, a, b) = topology();
        let flow = net
            .add_flow(a, b, DATA_PACKET_SIZE_BITS * 10, 0, Protocol::Reno)
            .unwrap();
        assert!(net.validate().is_ok());

        let interval_ms = 1;
        let mut now = 0;
        let mut completed = false;
        for _ in 0..20_000 {
            net.tick(interval_ms, now);
            now += interval_ms;
            if net.take_completed_flows().contains(&flow) {
                completed = true;
                break;
            }
        }
        assert!(completed, "flow never completed");
        assert_eq!(net.link_stats(net.links.keys().next().copied().unwrap()).unwrap().drops, (0, 0));
    }

    /// S2 — buffer sized for exactly 3 packets: every further DATA send
    /// this host attempts drops until the window shrinks back.
    #[test]
    fn s2_undersized_buffer_drops_and_still_completes() {
        let mut net = Network::new();
        let a = net.add_host();
        let b = net.add_host();
        net.add_link(a, b, 80, 10, DATA_PACKET_SIZE_BITS * 3 + ACK_SETUP_SIZE_BITS)
            .unwrap();
        let flow = net
            .add_flow(a, b, DATA_PACKET_SIZE_BITS * 8, 0, Protocol::Reno)
            .unwrap();

        let mut now = 0;
        let mut completed = false;
        for _ in 0..50_000 {
            net.tick(1, now);
            now += 1;
            if net.take_completed_flows().contains(&flow) {
                completed = true;
                break;
            }
        }
        assert!(completed, "flow with lossy link never completed");
    }

    #[test]
    fn is_idle_reflects_pending_and_active_flows() {
        let (mut net, a, b) = topology();
        assert!(net.is_idle());
        net.add_flow(a, b, DATA_PACKET_SIZE_BITS, 0, Protocol::Reno).unwrap();
        assert!(!net.is_idle());
    }
}
