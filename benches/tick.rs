use criterion::{BenchmarkGroup, Criterion, Throughput, criterion_group, criterion_main, measurement::WallTime};
use tcpsim_core::flow::Protocol;
use tcpsim_core::network::Network;

fn bench_tick_size(group: &mut BenchmarkGroup<'_, WallTime>, pairs: usize) {
    let mut network = Network::new();
    let mut flow_count = 0u64;

    for _ in 0..pairs {
        let a = network.add_host();
        let b = network.add_host();
        network.add_link(a, b, 80, 10, 65_536).unwrap();
        network.add_flow(a, b, 8_192 * 1_000, 0, Protocol::Reno).unwrap();
        flow_count += 1;
    }
    network.validate().unwrap();

    group.throughput(Throughput::Elements(flow_count));
    group.bench_function(format!("{pairs} host pairs"), |b| {
        b.iter(|| {
            network.tick(1, 0);
        })
    });
}

fn tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for pairs in [10, 50, 100, 200, 400] {
        bench_tick_size(&mut group, pairs);
    }

    group.finish();
}

criterion_group!(benches, tick);
criterion_main!(benches);
