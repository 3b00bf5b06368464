use criterion::{black_box, criterion_group, criterion_main, Criterion};
use razor::codec;

fn primitive_roundtrip(c: &mut Criterion) {
    let mut buf = [0u8; 16];

    c.bench_function("codec_u64_roundtrip", |b| {
        b.iter(|| {
            codec::write_u64(&mut buf, 0, black_box(0x0102_0304_0506_0708));
            black_box(codec::read_u64(&buf, 0));
        })
    });
}

fn bitvec_roundtrip(c: &mut Criterion) {
    let bools: Vec<bool> = (0..64).map(|i| i % 3 == 0).collect();
    let mut buf = [0u8; 16];

    c.bench_function("codec_bitvec64_roundtrip", |b| {
        b.iter(|| {
            codec::write_bitvec(&mut buf, 0, black_box(&bools)).unwrap();
            black_box(codec::read_bitvec(&buf, 0).unwrap());
        })
    });
}

fn bytes_roundtrip(c: &mut Criterion) {
    let payload = vec![7u8; 256];
    let mut buf = [0u8; 512];

    c.bench_function("codec_bytes256_roundtrip", |b| {
        b.iter(|| {
            codec::write_bytes(&mut buf, 0, black_box(&payload));
            black_box(codec::read_bytes(&buf, 0));
        })
    });
}

criterion_group!(benches, primitive_roundtrip, bitvec_roundtrip, bytes_roundtrip);
criterion_main!(benches);
