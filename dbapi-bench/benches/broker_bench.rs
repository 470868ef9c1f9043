//! Channel broker benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dbapi_server::{BrokerConfig, ChannelBroker};

fn create_batch(count: usize) -> String {
    let messages: Vec<String> = (0..count)
        .map(|i| format!("{{id:{},name:'worker; {}',age:{}}}", i, i, 20 + i % 40))
        .collect();
    format!("[{}]", messages.join(";"))
}

fn bench_send_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_read");

    for count in [1, 10, 100] {
        let batch = create_batch(count);
        let broker = ChannelBroker::new(BrokerConfig::default());

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &batch, |b, batch| {
            b.iter(|| {
                broker.send("bench", batch).unwrap();
                black_box(broker.read("bench"))
            });
        });
    }

    group.finish();
}

fn bench_peek(c: &mut Criterion) {
    let broker = ChannelBroker::new(BrokerConfig::default());
    broker.send("bench", &create_batch(100)).unwrap();

    c.bench_function("peek_100", |b| {
        b.iter(|| black_box(broker.peek("bench")));
    });
}

criterion_group!(benches, bench_send_read, bench_peek);
criterion_main!(benches);
