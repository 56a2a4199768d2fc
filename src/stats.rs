//! Analytics snapshot types. `spec.md` §6 "Analytics sinks": write-only
//! observers for window size, flow rate, link rate, buffer occupancy,
//! packet loss. This module only holds the data; nothing here calls out to
//! an external sink — [`Network::flow_stats`](crate::network::Network::flow_stats)
//! and [`Network::link_stats`](crate::network::Network::link_stats) are
//! point-in-time snapshot queries, as the teacher's own
//! `Network::stats` is.

use crate::flow::ControllerState;
use crate::link::{Link, Side};

/// Point-in-time snapshot of one active [`Flow`](crate::flow::Flow)'s
/// congestion-control state. `spec.md` §6: "Per Flow: window size
/// (packets), flow rate (Mbps averaged over Δ)."
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowStats {
    /// Current congestion window, in packets.
    pub window_packets: u64,
    /// Instantaneous send-rate estimate: `cwnd · packet size / rtt_avg`, a
    /// bandwidth-delay-product heuristic rather than a measured counter,
    /// since a flow's own packets aren't tracked with timestamps once
    /// delivered. Zero before the first RTT sample exists.
    pub rate_mbps: f64,
}

impl FlowStats {
    pub(crate) fn from_controller(controller: &ControllerState) -> Self {
        let rate_mbps = if controller.rtt_avg_ms > 0.0 {
            let bits_per_rtt = controller.cwnd as f64 * crate::defaults::DATA_PACKET_SIZE_BITS as f64;
            let rtt_secs = controller.rtt_avg_ms / 1000.0;
            (bits_per_rtt / rtt_secs) / 1_000_000.0
        } else {
            0.0
        };
        Self {
            window_packets: controller.cwnd,
            rate_mbps,
        }
    }
}

/// Point-in-time snapshot of one [`Link`]'s occupancy, throughput and
/// drops. `spec.md` §6: "Per Link: rate (Mbps), buffer occupancy (bits),
/// drop count." Every field is `(left, right)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStats {
    /// Bits currently occupying each side's buffer.
    pub direction_occupancy_bits: (u64, u64),
    /// Recent delivered-throughput estimate, in Mbps, for each side.
    pub throughput_mbps: (f64, f64),
    /// Cumulative packets dropped for insufficient buffer space, per side.
    pub drops: (u64, u64),
}

impl LinkStats {
    pub(crate) fn from_link(link: &Link) -> Self {
        let capacity = link.buffer_capacity_bits();
        Self {
            direction_occupancy_bits: (
                capacity - link.free_bits(Side::Left),
                capacity - link.free_bits(Side::Right),
            ),
            throughput_mbps: (link.throughput_mbps(Side::Left), link.throughput_mbps(Side::Right)),
            drops: (link.drops(Side::Left), link.drops(Side::Right)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_stats_zero_rate_before_first_rtt_sample() {
        let controller = ControllerState::new();
        let stats = FlowStats::from_controller(&controller);
        assert_eq!(stats.window_packets, 1);
        assert_eq!(stats.rate_mbps, 0.0);
    }
}
