//! Throughput Benchmark for FlashRESP
//!
//! This benchmark measures frame decoding, reply encoding and a full
//! request/reply round trip through the connection handler.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashresp::commands::{EchoExecutor, Executor};
use flashresp::connection::Handler;
use flashresp::protocol::{FrameReader, Reply};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Benchmark decoding pipelined commands
fn bench_parse(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("parse");

    for (name, value_len) in [("small", 16), ("medium", 1024), ("large", 64 * 1024)] {
        let value = vec![b'x'; value_len];
        let command = encode_command(&[b"SET", b"key:1", &value]);
        let input = command.repeat(1000);

        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_function(format!("pipeline_1000_{}", name), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let mut frames = FrameReader::new(input.as_slice());
                    let mut count = 0;
                    while let Some(payload) = frames.next_payload().await {
                        if payload.is_ok() {
                            count += 1;
                        }
                    }
                    black_box(count)
                })
            });
        });
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("wide_multi_bulk", |b| {
        let args: Vec<Vec<u8>> = (0..1000).map(|i| format!("member:{}", i).into_bytes()).collect();
        let refs: Vec<&[u8]> = args.iter().map(|a| a.as_slice()).collect();
        let input = encode_command(&refs);

        b.iter(|| {
            rt.block_on(async {
                let mut frames = FrameReader::new(input.as_slice());
                black_box(frames.next_payload().await)
            })
        });
    });

    group.finish();
}

/// Benchmark reply serialization
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("status", |b| {
        let reply = Reply::ok();
        b.iter(|| black_box(reply.to_bytes()));
    });

    group.bench_function("bulk_1kb", |b| {
        let reply = Reply::bulk(Bytes::from("x".repeat(1024)));
        b.iter(|| black_box(reply.to_bytes()));
    });

    group.bench_function("multi_bulk_100", |b| {
        let reply = Reply::multi_bulk((0..100).map(|i| format!("value:{}", i)));
        let mut buf = Vec::with_capacity(4096);
        b.iter(|| {
            buf.clear();
            reply.serialize_into(&mut buf);
            black_box(buf.len())
        });
    });

    group.finish();
}

/// Benchmark full round trips through the handler
fn bench_round_trip(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("round_trip");
    group.measurement_time(Duration::from_secs(10));

    let command = encode_command(&[b"ECHO", b"hello"]);
    let batch = command.repeat(100);
    let reply_len = batch.len();

    group.throughput(Throughput::Elements(100));
    group.bench_function("echo_pipeline_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let executor: Arc<dyn Executor> = Arc::new(EchoExecutor::new());
                let handler = Arc::new(Handler::new(executor));
                let (mut client, server) = tokio::io::duplex(64 * 1024);

                let task = {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.handle(server, "127.0.0.1:6379".parse().unwrap()).await
                    })
                };

                client.write_all(&batch).await.unwrap();
                let mut replies = vec![0u8; reply_len];
                client.read_exact(&mut replies).await.unwrap();
                drop(client);
                task.await.unwrap();

                black_box(replies)
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_encode, bench_round_trip);

criterion_main!(benches);
