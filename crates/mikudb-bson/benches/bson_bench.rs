use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use mikudb_bson::{doc, Codec, Document, ObjectId, Value};

fn sample_document() -> Document {
    doc! {
        "name": "Miku",
        "age": 16,
        "active": true,
        "score": 99.5,
        "_id": (ObjectId::new()),
        "tags": ["vocaloid", "crypton", "2007"],
        "address": { "street": "123 Main St", "city": "Sapporo" }
    }
}

fn bench_document_creation(c: &mut Criterion) {
    c.bench_function("document_create", |b| b.iter(sample_document));
}

fn bench_document_serialize(c: &mut Criterion) {
    let codec = Codec::new();
    let doc = sample_document();

    c.bench_function("document_serialize", |b| {
        b.iter(|| codec.serialize(black_box(&doc), false, false))
    });
    c.bench_function("document_serialize_move_id_check_keys", |b| {
        b.iter(|| codec.serialize(black_box(&doc), true, true))
    });
}

fn bench_document_deserialize(c: &mut Criterion) {
    let codec = Codec::new();
    let encoded = codec.serialize(&sample_document(), false, true).unwrap();

    c.bench_function("document_deserialize", |b| {
        b.iter(|| codec.deserialize(black_box(&encoded)))
    });
}

fn bench_large_array(c: &mut Criterion) {
    let codec = Codec::new();
    let doc = doc! { "values": (Value::Array((0..10_000).map(Value::Int32).collect())) };

    c.bench_function("array_10k_serialize", |b| {
        b.iter(|| codec.serialize(black_box(&doc), false, false))
    });
}

fn bench_object_id(c: &mut Criterion) {
    c.bench_function("object_id_generate", |b| b.iter(ObjectId::new));
}

criterion_group!(
    benches,
    bench_document_creation,
    bench_document_serialize,
    bench_document_deserialize,
    bench_large_array,
    bench_object_id,
);

criterion_main!(benches);
