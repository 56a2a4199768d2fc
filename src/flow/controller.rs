//! Congestion-control state machine: TCP-Reno slow start / congestion
//! avoidance / fast recovery, plus a FAST-protocol equilibrium variant on
//! the same RTT-sample path. `spec.md` §4.3.

use crate::defaults::{DUP_ACK_THRESHOLD, INIT_CWND, INIT_SSTHRESH, INIT_TIMEOUT_MS, RTT_EWMA_ALPHA};
use crate::flow::Protocol;
use crate::packet::PacketId;
use std::collections::BTreeMap;

/// Outcome of feeding an ACK or a timer sweep to the [`ControllerState`],
/// telling the [`Host`](crate::node::Host) what to do with the link.
#[derive(Debug, Default)]
pub struct ControllerAction {
    /// Packet ids that must be (re)sent: `link.clear_buffer` then
    /// `link.add_packet` for each, in order.
    pub retransmit: Vec<PacketId>,
    /// Set when the flow's last outstanding packet was just cumulatively
    /// ACKed and the flow is complete.
    pub flow_complete: bool,
}

/// Per-flow congestion-control state, owned by the sending
/// [`Host`](crate::node::Host)'s `ActiveFlow`. `spec.md` §3.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub cwnd: u64,
    pub partial_cwnd: u64,
    pub ssthresh: u64,
    pub slow_start: bool,
    pub awaiting_retransmit: bool,
    pub last_ack_id: Option<PacketId>,
    dup_ack_count: u32,
    pub most_recent_retransmitted: Option<PacketId>,
    pub most_recent_queued: Option<PacketId>,
    pub window_occupied: u64,
    pub send_times: BTreeMap<PacketId, u64>,
    pub rtt_min_ms: Option<u64>,
    pub rtt_avg_ms: f64,
    pub rtt_stddev_ms: f64,
    pub timeout_ms: u64,
    rtt_has_sample: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            cwnd: INIT_CWND,
            partial_cwnd: 0,
            ssthresh: INIT_SSTHRESH,
            slow_start: true,
            awaiting_retransmit: false,
            last_ack_id: None,
            dup_ack_count: 0,
            most_recent_retransmitted: None,
            most_recent_queued: None,
            window_occupied: 0,
            send_times: BTreeMap::new(),
            rtt_min_ms: None,
            rtt_avg_ms: 0.0,
            rtt_stddev_ms: 0.0,
            timeout_ms: INIT_TIMEOUT_MS,
            rtt_has_sample: false,
        }
    }
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `spec.md` §4.3 "ACK reception". `queue_front` is the flow's packet
    /// queue front id (`Q`); `max_id` is the flow's last DATA packet id.
    /// Returns the action the `Host` must take on the link.
    pub fn on_ack(
        &mut self,
        ack_id: PacketId,
        queue_front: PacketId,
        max_id: PacketId,
        protocol: Protocol,
        now_ms: u64,
    ) -> ControllerAction {
        if ack_id.into_u64() > queue_front.into_u64() && ack_id.into_u64() <= max_id.into_u64() + 1
        {
            self.on_new_ack(ack_id, queue_front, max_id, protocol, now_ms)
        } else if ack_id == queue_front {
            self.on_duplicate_ack(ack_id, protocol)
        } else {
            // Stale or out-of-range ACK: nothing to do.
            ControllerAction::default()
        }
    }

    fn on_new_ack(
        &mut self,
        ack_id: PacketId,
        queue_front: PacketId,
        max_id: PacketId,
        protocol: Protocol,
        now_ms: u64,
    ) -> ControllerAction {
        for id in queue_front.into_u64()..ack_id.into_u64() {
            let id = PacketId::new(id);
            if let Some(send_time) = self.send_times.remove(&id) {
                let rtt = now_ms.saturating_sub(send_time);
                self.sample_rtt(rtt);
            }
            self.window_occupied = self.window_occupied.saturating_sub(1);
        }
        self.dup_ack_count = 0;
        self.last_ack_id = Some(ack_id);

        // `spec.md` §4.3: "If Q was max_id prior, discard the flow
        // (complete)." `queue_front` here is Q as observed *before* this
        // ack (the caller passes the pre-update front); since this branch
        // only runs for a genuinely new ack (ack_id > queue_front), Q ==
        // max_id forces ack_id == max_id + 1, the final cumulative ack.
        let flow_complete = queue_front == max_id;

        if !flow_complete {
            match protocol {
                Protocol::Reno => {
                    if self.slow_start {
                        self.cwnd += 1;
                        if self.cwnd > self.ssthresh {
                            self.slow_start = false;
                        }
                    } else {
                        self.partial_cwnd += 1;
                        if self.partial_cwnd >= self.cwnd {
                            self.cwnd += 1;
                            self.partial_cwnd = 0;
                        }
                    }
                }
                Protocol::Fast => self.fast_equilibrium_update(),
            }
        }

        ControllerAction {
            retransmit: Vec::new(),
            flow_complete,
        }
    }

    /// FAST-TCP-style equilibrium update on the RTT-sample path: nudge
    /// `cwnd` a fraction `GAMMA` of the way toward
    /// `cwnd · rtt_min / rtt_avg + ALPHA_PACKETS`, capped at doubling per
    /// sample. `spec.md` §9 open question 4 permits either treating FAST
    /// identically to RENO or implementing FAST's equation here; this
    /// crate implements the equation (decision recorded in `DESIGN.md`).
    fn fast_equilibrium_update(&mut self) {
        const GAMMA: f64 = 0.5;
        const ALPHA_PACKETS: f64 = 1.0;

        let cwnd = self.cwnd as f64;
        let rtt_min = self.rtt_min_ms.unwrap_or(1).max(1) as f64;
        let rtt_avg = self.rtt_avg_ms.max(1.0);

        let target = cwnd * (rtt_min / rtt_avg) + ALPHA_PACKETS;
        let updated = (1.0 - GAMMA) * cwnd + GAMMA * target;
        let capped = updated.min(2.0 * cwnd);

        self.cwnd = capped.max(1.0).round() as u64;
    }

    /// `spec.md` §4.3 "Duplicate ACK". Per S5, FAST does not use
    /// triple-duplicate-ACK fast retransmit: it relies on the timer path
    /// only, so no FR/FR transition (and no retransmit) happens here for
    /// `Protocol::Fast`.
    fn on_duplicate_ack(&mut self, ack_id: PacketId, protocol: Protocol) -> ControllerAction {
        self.dup_ack_count += 1;

        if protocol == Protocol::Fast {
            return ControllerAction::default();
        }

        if self.dup_ack_count >= DUP_ACK_THRESHOLD && self.most_recent_retransmitted != Some(ack_id)
        {
            self.most_recent_retransmitted = Some(ack_id);
            self.most_recent_queued = Some(ack_id);
            self.window_occupied = 1;

            if !self.awaiting_retransmit {
                self.ssthresh = (self.cwnd / 2).max(2);
                self.cwnd = self.ssthresh + self.dup_ack_count as u64;
                self.slow_start = false;
                self.awaiting_retransmit = true;
            }
            self.dup_ack_count = 0;

            ControllerAction {
                retransmit: vec![ack_id],
                flow_complete: false,
            }
        } else {
            ControllerAction::default()
        }
    }

    fn sample_rtt(&mut self, r_ms: u64) {
        self.rtt_min_ms = Some(self.rtt_min_ms.map_or(r_ms, |min| min.min(r_ms)));
        let r = r_ms as f64;
        if !self.rtt_has_sample {
            self.rtt_avg_ms = r;
            self.rtt_stddev_ms = r;
            self.rtt_has_sample = true;
        } else {
            self.rtt_avg_ms = (1.0 - RTT_EWMA_ALPHA) * self.rtt_avg_ms + RTT_EWMA_ALPHA * r;
            self.rtt_stddev_ms = (1.0 - RTT_EWMA_ALPHA) * self.rtt_stddev_ms
                + RTT_EWMA_ALPHA * (r - self.rtt_avg_ms).abs();
        }
        // timeout_ms intentionally held at INIT_TIMEOUT_MS: spec.md §9 open
        // question 2, decision recorded in DESIGN.md.
    }

    /// `spec.md` §4.3 "Window fill": called once per tick, after the timer
    /// sweep, for every packet starting at `most_recent_queued + 1` while
    /// `window_occupied < cwnd`. Returns the deflate-on-FR/FR-exit flag the
    /// caller should apply before the first send of this pass.
    pub fn take_fr_fr_exit(&mut self) -> bool {
        if self.awaiting_retransmit {
            self.cwnd = self.ssthresh;
            self.awaiting_retransmit = false;
            true
        } else {
            false
        }
    }

    pub fn has_room_in_window(&self) -> bool {
        self.window_occupied < self.cwnd
    }

    pub fn record_send(&mut self, id: PacketId, now_ms: u64) {
        self.window_occupied += 1;
        self.send_times.insert(id, now_ms);
        self.most_recent_queued = Some(id);
    }

    /// `spec.md` §4.3 "Timer-driven retransmit": ids whose
    /// `send_times[id] + timeout_ms < now` have timed out.
    pub fn timed_out_ids(&self, now_ms: u64) -> Vec<PacketId> {
        self.send_times
            .iter()
            .filter(|(_, &sent)| sent + self.timeout_ms < now_ms)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn on_timeout(&mut self, id: PacketId, now_ms: u64) {
        self.send_times.insert(id, now_ms);
        self.window_occupied = 1;
        self.most_recent_queued = Some(id);
    }

    /// Records the send time of a packet retransmitted because of a triple
    /// duplicate ACK. `window_occupied` and `most_recent_queued` were
    /// already set by [`Self::on_duplicate_ack`]; this only stamps the new
    /// `send_times` entry once the `Host` has actually re-enqueued the
    /// packet on the link. `spec.md` §4.3 "Duplicate ACK".
    pub fn on_retransmit_sent(&mut self, id: PacketId, now_ms: u64) {
        self.send_times.insert(id, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reno_slow_start_increments_cwnd_on_new_ack() {
        let mut c = ControllerState::new();
        c.record_send(PacketId::new(1), 0);
        let action = c.on_ack(
            PacketId::new(2),
            PacketId::new(1),
            PacketId::new(10),
            Protocol::Reno,
            5,
        );
        assert!(!action.flow_complete);
        assert_eq!(c.cwnd, 2);
        assert_eq!(c.window_occupied, 0);
    }

    #[test]
    fn reno_transitions_out_of_slow_start_past_ssthresh() {
        let mut c = ControllerState::new();
        c.ssthresh = 2;
        c.cwnd = 2;
        c.record_send(PacketId::new(1), 0);
        c.on_ack(
            PacketId::new(2),
            PacketId::new(1),
            PacketId::new(100),
            Protocol::Reno,
            1,
        );
        assert_eq!(c.cwnd, 3);
        assert!(!c.slow_start);
    }

    #[test]
    fn triple_dup_ack_triggers_fast_retransmit() {
        let mut c = ControllerState::new();
        c.cwnd = 10;
        c.record_send(PacketId::new(3), 0);
        for _ in 0..3 {
            let action = c.on_ack(
                PacketId::new(3),
                PacketId::new(3),
                PacketId::new(10),
                Protocol::Reno,
                1,
            );
            if !action.retransmit.is_empty() {
                assert_eq!(action.retransmit, vec![PacketId::new(3)]);
            }
        }
        assert_eq!(c.ssthresh, 5);
        assert_eq!(c.cwnd, 5 + 3);
        assert!(c.awaiting_retransmit);
    }

    #[test]
    fn repeated_dup_acks_retransmit_at_most_once() {
        let mut c = ControllerState::new();
        c.cwnd = 10;
        c.record_send(PacketId::new(1), 0);
        let mut retransmits = 0;
        for _ in 0..6 {
            let action = c.on_ack(
                PacketId::new(1),
                PacketId::new(1),
                PacketId::new(10),
                Protocol::Reno,
                1,
            );
            retransmits += action.retransmit.len();
        }
        assert_eq!(retransmits, 1);
    }

    #[test]
    fn fast_protocol_never_fast_retransmits() {
        let mut c = ControllerState::new();
        c.record_send(PacketId::new(1), 0);
        for _ in 0..10 {
            let action = c.on_ack(
                PacketId::new(1),
                PacketId::new(1),
                PacketId::new(10),
                Protocol::Fast,
                1,
            );
            assert!(action.retransmit.is_empty());
        }
        assert!(!c.awaiting_retransmit);
    }

    #[test]
    fn fr_fr_exit_deflates_cwnd_to_ssthresh() {
        let mut c = ControllerState::new();
        c.ssthresh = 7;
        c.awaiting_retransmit = true;
        c.cwnd = 13;
        assert!(c.take_fr_fr_exit());
        assert_eq!(c.cwnd, 7);
        assert!(!c.awaiting_retransmit);
    }

    #[test]
    fn timeout_detection_uses_fixed_timeout() {
        let mut c = ControllerState::new();
        c.record_send(PacketId::new(1), 0);
        assert!(c.timed_out_ids(INIT_TIMEOUT_MS + 1).contains(&PacketId::new(1)));
        assert!(c.timed_out_ids(INIT_TIMEOUT_MS).is_empty());
    }

    #[test]
    fn rtt_ewma_first_sample_seeds_avg_and_stddev() {
        let mut c = ControllerState::new();
        c.record_send(PacketId::new(1), 0);
        c.on_ack(
            PacketId::new(2),
            PacketId::new(1),
            PacketId::new(10),
            Protocol::Reno,
            20,
        );
        assert_eq!(c.rtt_avg_ms, 20.0);
        assert_eq!(c.rtt_stddev_ms, 20.0);
        assert_eq!(c.rtt_min_ms, Some(20));
    }

    #[test]
    fn flow_completes_on_final_cumulative_ack() {
        let mut c = ControllerState::new();
        c.record_send(PacketId::new(10), 0);
        let action = c.on_ack(
            PacketId::new(11),
            PacketId::new(10),
            PacketId::new(10),
            Protocol::Reno,
            5,
        );
        assert!(action.flow_complete);
    }
}
