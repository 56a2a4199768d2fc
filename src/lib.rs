/*!
# `tcpsim-core` — TCP-like Congestion Control Simulation Primitives

`tcpsim-core` models a fixed topology of [`Host`]s connected through
half-duplex, store-and-forward [`Link`]s, and drives TCP-like [`Flow`]s
(Reno or a FAST-style equilibrium variant) across them one discrete tick at
a time. It deliberately does **not** manage wall-clock time or threads: you
control when time advances, pause for inspection, or replay deterministically.

## Mental model

```text
Network::tick(Δ, now)
      │
      ▼ Host::update — flush immediate_queue (ACK/SETUP), run send phase
                        per active Flow (retransmit, timeout, window fill)
  [ sending Host ]
      │
      ▼ Link::update — single shared transmission slot, per-side FIFO
                        buffers of fixed bit capacity
  [    Link     ]
      │
      ▼ Host::receive_packet — dispatch by kind (DATA/ACK/SETUP); ACKs
                                land on the target Host's immediate_queue,
                                drained on the *next* tick
 [ receiving Host ]
```

Within a tick, every `Host`'s `update` runs to completion before any
`Link`'s `update` runs — the ordering guarantee that keeps packet
generation, congestion-window updates and transmission deterministic for a
given configuration.

## Congestion control

Each [`Flow`] runs one of two variants ([`Protocol`]):

- **Reno**: slow start, congestion avoidance, and triple-duplicate-ACK fast
  retransmit / fast recovery.
- **Fast**: an RTT-ratio equilibrium window update on the same ACK path,
  which never triggers a duplicate-ACK fast retransmit — it relies on the
  timeout path only.

Both share an RTT EWMA (`rtt_avg`, `rtt_stddev`) and a fixed retransmission
timeout; see [`defaults::INIT_TIMEOUT_MS`].

## Building a [`Network`]

```
use tcpsim_core::network::Network;
use tcpsim_core::flow::Protocol;

# fn f() -> Result<(), tcpsim_core::network::TopologyError> {
let mut network = Network::new();

let a = network.add_host();
let b = network.add_host();
network.add_link(a, b, 80, 10, 65_536)?; // 80 bits/ms, 10ms delay, 64Kbit buffer
network.add_flow(a, b, 81_920, 0, Protocol::Reno)?; // 10 packets starting at t=0

network.validate()?;

let mut now = 0;
while !network.is_idle() {
    network.tick(1, now);
    now += 1;
}
# Ok(()) }; f().unwrap();
```

## Analytics

[`Network::flow_stats`] and [`Network::link_stats`] are point-in-time
snapshot queries — this crate never calls out to an analytics sink itself;
an external driver polls these each tick to feed whatever sink it wants.

[`Host`]: crate::node::Host
[`Link`]: crate::link::Link
[`Flow`]: crate::flow::Flow
[`Protocol`]: crate::flow::Protocol
[`Network`]: crate::network::Network
[`Network::flow_stats`]: crate::network::Network::flow_stats
[`Network::link_stats`]: crate::network::Network::link_stats
*/

pub mod defaults;
pub mod flow;
pub mod geo;
pub mod link;
pub mod measure;
pub mod network;
pub mod node;
pub mod packet;
pub mod stats;
pub mod time;

pub use self::{
    flow::{ControllerState, Flow, FlowId, Protocol},
    link::{Link, LinkId, Side},
    measure::{Latency, Rate},
    network::{Network, TopologyError},
    node::{Host, NodeId},
    packet::{Packet, PacketId, PacketKind},
    stats::{FlowStats, LinkStats},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flow_runs_to_completion_over_a_simple_link() {
        let mut network = Network::new();
        let a = network.add_host();
        let b = network.add_host();
        network.add_link(a, b, 80, 10, 65_536).unwrap();
        let flow = network.add_flow(a, b, 81_920, 0, Protocol::Reno).unwrap();
        network.validate().unwrap();

        let mut now = 0;
        let mut completed = false;
        for _ in 0..20_000 {
            network.tick(1, now);
            now += 1;
            if network.take_completed_flows().contains(&flow) {
                completed = true;
                break;
            }
        }
        assert!(completed);
        assert!(network.is_idle());
    }

    #[test]
    fn validate_rejects_a_host_with_no_link() {
        let mut network = Network::new();
        network.add_host();
        assert!(network.validate().is_err());
    }
}
