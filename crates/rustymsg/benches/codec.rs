use criterion::{criterion_group, criterion_main, Criterion};
use rustymsg::{decode, encode, sample_message, Schema};
use std::hint::black_box;

const SCHEMA: &str = r#"{
    "types": [{"name": "Sample", "desc": "one reading", "fields": [
        {"name": "channel", "type": "uint8", "desc": "channel"},
        {"name": "value", "type": "int16", "desc": "value"}
    ]}],
    "messages": [{"name": "Telemetry", "desc": "telemetry", "id": 16, "fields": [
        {"name": "uptime", "type": "uint32", "desc": "uptime"},
        {"name": "samples", "type": "Sample[]", "desc": "samples"}
    ]}]
}"#;

fn bench_codec(c: &mut Criterion) {
    let schema = Schema::from_json_str(SCHEMA).expect("schema loads");
    let def = schema.def("Telemetry").expect("message exists");
    let mut rng = rand::rng();
    let msg = sample_message(&schema, def, &mut rng);
    let bytes = encode(&schema, &msg).expect("encode");

    c.bench_function("encode_telemetry", |b| {
        b.iter(|| encode(&schema, black_box(&msg)).expect("encode"))
    });
    c.bench_function("decode_telemetry", |b| {
        b.iter(|| decode(&schema, def, black_box(&bytes)).expect("decode"))
    });
    c.bench_function("schema_load", |b| {
        b.iter(|| Schema::from_json_str(black_box(SCHEMA)).expect("schema loads"))
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
