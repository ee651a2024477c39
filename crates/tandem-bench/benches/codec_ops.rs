//! Criterion micro-benchmarks for the value codec and command frames.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tandem_core::{Command, HandlerId, ScopeId, TickId};
use tandem_registry::{PrimKind, RefCategory, RegistryBuilder, TypeRef, TypeRegistry, Value};
use tandem_test_utils::{worker_ref, Colony};
use tandem_wire::{decode_command, encode_command, ByteReader, ByteWriter, WireContext};

fn registry() -> TypeRegistry {
    RegistryBuilder::new()
        .reference("Worker", &[RefCategory::Spawned])
        .record(
            "Order",
            &[
                ("worker", TypeRef::named("Worker")),
                ("amount", PrimKind::I32.into()),
                ("note", PrimKind::Str.into()),
            ],
        )
        .build()
        .unwrap()
}

/// A list of 64 orders, each referencing a worker.
fn orders() -> (TypeRef, Value) {
    let ty = TypeRef::list(TypeRef::named("Order"));
    let items = (0..64)
        .map(|i| {
            Value::record(
                "Order",
                vec![worker_ref(i % 16 + 1), Value::I32(i as i32), Value::Str(format!("order {i}"))],
            )
        })
        .collect();
    (ty, Value::List(items))
}

fn bench_encode_orders(c: &mut Criterion) {
    let reg = registry();
    let (ty, value) = orders();
    c.bench_function("codec_encode_64_orders", |b| {
        b.iter(|| {
            let mut w = ByteWriter::new();
            reg.encode(&mut w, &ty, &value).unwrap();
            black_box(w.into_bytes());
        });
    });
}

fn bench_decode_orders(c: &mut Criterion) {
    let reg = registry();
    let (ty, value) = orders();
    let bytes = reg.to_bytes(&ty, &value).unwrap();
    let mut colony = Colony::new();
    for id in 1..=16 {
        colony.add_worker(ScopeId::Map(1), id, "w");
    }

    c.bench_function("codec_decode_64_orders", |b| {
        b.iter(|| {
            let mut r = ByteReader::with_context(&bytes, WireContext::for_scope(ScopeId::Map(1)));
            black_box(reg.decode(&mut r, &ty, &colony).unwrap());
        });
    });
}

fn bench_command_frames(c: &mut Criterion) {
    let cmd = Command {
        handler: HandlerId(12),
        tick: TickId(4_000),
        scope: ScopeId::Map(3),
        payload: vec![0xAB; 48],
    };
    let bytes = encode_command(&cmd).unwrap();

    c.bench_function("frame_encode_command", |b| {
        b.iter(|| black_box(encode_command(black_box(&cmd)).unwrap()));
    });
    c.bench_function("frame_decode_command", |b| {
        b.iter(|| black_box(decode_command(black_box(&bytes)).unwrap()));
    });
}

criterion_group!(benches, bench_encode_orders, bench_decode_orders, bench_command_frames);
criterion_main!(benches);
