//! Encode/decode throughput for representative row shapes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eddy_codec::{AlgebraicType, AlgebraicValue, Reader, Writer};

fn row_type() -> AlgebraicType {
    AlgebraicType::product([
        ("id", AlgebraicType::U64),
        ("name", AlgebraicType::String),
        ("balance", AlgebraicType::I128),
        ("tags", AlgebraicType::array(AlgebraicType::String)),
        ("avatar", AlgebraicType::option(AlgebraicType::Bytes)),
    ])
}

fn row_value() -> AlgebraicValue {
    AlgebraicValue::product(vec![
        AlgebraicValue::U64(0xfeed_beef),
        AlgebraicValue::string("benchmark-user"),
        AlgebraicValue::I128(-1),
        AlgebraicValue::Array(vec![
            AlgebraicValue::string("alpha"),
            AlgebraicValue::string("beta"),
        ]),
        AlgebraicValue::option_none(),
    ])
}

fn bench_encode(c: &mut Criterion) {
    let value = row_value();
    c.bench_function("encode_row", |b| {
        b.iter(|| {
            let mut w = Writer::with_capacity(64);
            black_box(&value).encode(&mut w);
            black_box(w.finish())
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    let ty = row_type();
    let bytes = row_value().to_bytes();
    c.bench_function("decode_row", |b| {
        b.iter(|| {
            let mut r = Reader::new(black_box(&bytes));
            black_box(AlgebraicValue::decode(&ty, &mut r).unwrap())
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
