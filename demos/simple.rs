use tcpsim_core::flow::Protocol;
use tcpsim_core::network::Network;

/// Runs a single Reno flow across one link to completion and prints the
/// congestion window at the end of every tick.
fn main() -> anyhow::Result<()> {
    let mut network = Network::new();

    let sender = network.add_host();
    let receiver = network.add_host();
    network.add_link(sender, receiver, 80, 10, 65_536)?;

    let flow = network.add_flow(sender, receiver, 81_920, 0, Protocol::Reno)?;
    network.validate()?;

    let mut now = 0;
    loop {
        network.tick(1, now);
        if let Some(stats) = network.flow_stats(flow) {
            println!("t={now}ms cwnd={}", stats.window_packets);
        }
        if network.take_completed_flows().contains(&flow) {
            println!("flow {flow} completed at t={now}ms");
            break;
        }
        now += 1;
    }

    Ok(())
}
