/// Benchmarks for inbound frame decoding.
///
/// Every text frame goes through the keep-alive check before JSON parsing, so both the
/// heartbeat reply and ordinary application payloads sit on the receive hot path.
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use resilient_ws::ws::codec::{Codec, decode};
use resilient_ws::ws::config::KeepAlive;

fn bench_decode_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode_text");
    let codec = Codec::new(&KeepAlive::default());

    let pong = r#"{"type":"pong"}"#;
    group.throughput(Throughput::Bytes(pong.len() as u64));
    group.bench_function("keep_alive_exact", |b| {
        b.iter(|| codec.decode_text(std::hint::black_box(pong)));
    });

    let pong_spaced = r#"{ "type": "pong", "ts": 1712345678 }"#;
    group.throughput(Throughput::Bytes(pong_spaced.len() as u64));
    group.bench_function("keep_alive_reformatted", |b| {
        b.iter(|| codec.decode_text(std::hint::black_box(pong_spaced)));
    });

    let task_update = r#"{
        "type": "task_update",
        "task_id": "7f3c2a10",
        "status": "running",
        "progress": 0.42,
        "logs": ["fetching sources", "compiling", "linking"]
    }"#;
    group.throughput(Throughput::Bytes(task_update.len() as u64));
    group.bench_function("json_payload", |b| {
        b.iter(|| codec.decode_text(std::hint::black_box(task_update)));
    });

    let plain = "server maintenance in 5 minutes";
    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("plain_text", |b| {
        b.iter(|| codec.decode_text(std::hint::black_box(plain)));
    });

    group.finish();
}

fn bench_decode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");

    let batch = format!(
        "[{}]",
        (0..100)
            .map(|i| format!(r#"{{"id":{i},"status":"queued","owner":"worker-{i}"}}"#))
            .collect::<Vec<_>>()
            .join(",")
    );
    group.throughput(Throughput::Bytes(batch.len() as u64));
    group.bench_function("json_array_100", |b| {
        b.iter(|| decode(std::hint::black_box(&batch)));
    });

    group.finish();
}

criterion_group!(codec_benches, bench_decode_text, bench_decode_batch);
criterion_main!(codec_benches);
