use crate::measure::Latency;
use std::time::Duration;

/// Default propagation [`Latency`] for a [`Link`](crate::link::Link) whose
/// topology description does not set one explicitly.
///
/// ```
/// # use tcpsim_core::defaults::*;
/// assert_eq!(DEFAULT_LATENCY.to_string(), "5ms");
/// ```
pub const DEFAULT_LATENCY: Latency = Latency::new(Duration::from_millis(5));

/// Size, in bits, of a DATA packet. `spec.md` §6 constants table.
pub const DATA_PACKET_SIZE_BITS: u64 = 8192;

/// Size, in bits, of an ACK or SETUP packet. `spec.md` §6 constants table.
pub const ACK_SETUP_SIZE_BITS: u64 = 512;

/// Initial congestion window, in packets.
pub const INIT_CWND: u64 = 1;

/// Initial slow-start threshold: effectively infinite, so the flow starts
/// purely in slow start.
pub const INIT_SSTHRESH: u64 = u64::MAX;

/// Fixed retransmission timeout. `spec.md` §9 open question 2: the EWMA
/// (`rtt_avg + 4 · rtt_stddev`) is computed but the reference holds
/// `timeout_ms` at this constant; this crate follows the reference (see
/// `DESIGN.md`).
pub const INIT_TIMEOUT_MS: u64 = 3000;

/// Smoothing factor for the RTT EWMA (`rtt_avg`, `rtt_stddev`).
pub const RTT_EWMA_ALPHA: f64 = 0.1;

/// Period, in ms, at which each [`Link`](crate::link::Link) side's queuing
/// delay estimate is recomputed.
pub const BUFFER_DELAY_PERIOD_MS: u64 = 2000;

/// Number of duplicate ACKs that triggers a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;
