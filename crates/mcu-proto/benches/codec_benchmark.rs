use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mcu_proto::codec::{decode_frame, encode_frame, encode_payload};
use mcu_proto::commands::HostCommand;

fn benchmark_encode_payload(c: &mut Criterion) {
    let cmd = HostCommand::QueueSteps { oid: 3, interval: 5000, count: 12, add1: -7, add2: 2 };

    c.bench_function("encode_payload_queue_steps", |b| {
        b.iter(|| {
            let mut out = [0u8; 32];
            encode_payload(black_box(&cmd), &mut out).unwrap();
            black_box(&out);
        })
    });
}

fn benchmark_encode_frame(c: &mut Criterion) {
    let cmd = HostCommand::QueueSteps { oid: 3, interval: 5000, count: 12, add1: -7, add2: 2 };

    c.bench_function("encode_frame_queue_steps", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            encode_frame(black_box(&cmd), 1, &mut out).unwrap();
            black_box(&out);
        })
    });
}

fn benchmark_decode_frame(c: &mut Criterion) {
    let cmd = HostCommand::QueueSteps { oid: 3, interval: 5000, count: 12, add1: -7, add2: 2 };
    let mut frame = Vec::new();
    encode_frame(&cmd, 1, &mut frame).unwrap();

    c.bench_function("decode_frame_queue_steps", |b| {
        b.iter(|| {
            let decoded = decode_frame(black_box(&frame)).unwrap();
            black_box(&decoded);
        })
    });
}

criterion_group!(benches, benchmark_encode_payload, benchmark_encode_frame, benchmark_decode_frame);
criterion_main!(benches);
