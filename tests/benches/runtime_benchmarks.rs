//! # ValueMesh Runtime Benchmarks
//!
//! Hot paths that run once per message:
//!
//! | Area | Operation |
//! |------|-----------|
//! | vm-04 RPC | multipart frame encode/decode, request parsing |
//! | vm-02 Survey | reply reduction, pending-table bookkeeping |
//! | node-runtime | applying a peer update to a hosted value |

#![allow(clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use node_runtime::value::ValueCore;
use rand::Rng;
use serde_json::{json, Map, Value};
use shared_types::{RequestId, Tags, Timestamp};
use tokio_util::codec::{Decoder, Encoder};
use vm_02_survey::{reducers, PendingTable, Reply};
use vm_04_rpc::{MultipartCodec, RpcRequest};

// ============================================================================
// VM-04: RPC framing
// ============================================================================

fn bench_multipart_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm-04-multipart");
    let mut rng = rand::thread_rng();

    for size in [64_usize, 1024, 16 * 1024] {
        let payload: Vec<u8> = (0..size).map(|_| rng.gen()).collect();
        let parts = vec![
            Bytes::from_static(b"route"),
            Bytes::from_static(b"|"),
            Bytes::from(payload),
        ];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode_decode", size), &parts, |b, parts| {
            let mut codec = MultipartCodec::new(16 * 1024 * 1024);
            b.iter(|| {
                let mut buf = BytesMut::new();
                codec.encode(parts.clone(), &mut buf).unwrap();
                black_box(codec.decode(&mut buf).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_request_parsing(c: &mut Criterion) {
    let mut kwargs = Map::new();
    kwargs.insert("unit".into(), json!("C"));
    let request = RpcRequest {
        route: vec![Bytes::from_static(b"client")],
        req_id: RequestId::generate(),
        procedure: "house://kitchen/temp".into(),
        args: vec![json!([1.0, 2.0]), json!("x")],
        kwargs,
    };
    let parts = request.to_parts().unwrap();

    c.bench_function("vm-04-request-from-parts", |b| {
        b.iter(|| black_box(RpcRequest::from_parts(&parts).is_ok()))
    });
}

// ============================================================================
// VM-02: Survey bookkeeping
// ============================================================================

fn snapshot_replies(count: usize) -> Vec<Reply> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let ts: f64 = rng.gen_range(1_000.0..2_000.0);
            (format!("peer-{i}"), json!([i, ts, {"peer_name": format!("peer-{i}")}]))
        })
        .collect()
}

fn bench_reducers(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm-02-reducers");

    for count in [3_usize, 30, 300] {
        let replies = snapshot_replies(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("max_by_timestamp", count), &replies, |b, replies| {
            b.iter(|| black_box(reducers::max_by_timestamp(replies.clone())))
        });

        let uri_sets: Vec<Reply> = (0..count)
            .map(|i| (format!("peer-{i}"), json!([format!("uri://{i}/a"), format!("uri://{i}/b")])))
            .collect();
        group.bench_with_input(BenchmarkId::new("union_of_sets", count), &uri_sets, |b, replies| {
            b.iter(|| black_box(reducers::union_of_sets(replies.clone())))
        });
    }

    group.finish();
}

fn bench_pending_table(c: &mut Criterion) {
    let table = PendingTable::new();

    c.bench_function("vm-02-pending-open-record-retire", |b| {
        b.iter(|| {
            let (guard, _done) = table.open(3);
            let id = guard.id().clone();
            for peer in ["a", "b", "c"] {
                black_box(table.record(&id, peer, Value::Bool(true)));
            }
            black_box(guard.retire())
        })
    });
}

// ============================================================================
// node-runtime: value state
// ============================================================================

fn bench_peer_update(c: &mut Criterion) {
    let core = ValueCore::new("bench://value", None);
    let mut micros = 1_i64;

    c.bench_function("node-runtime-update-from-peer", |b| {
        b.iter(|| {
            micros += 1;
            black_box(core.update_from_peer(json!(micros), Timestamp::from_micros(micros), Tags::new()))
        })
    });
}

criterion_group!(
    benches,
    bench_multipart_codec,
    bench_request_parsing,
    bench_reducers,
    bench_pending_table,
    bench_peer_update,
);
criterion_main!(benches);
