use criterion::{criterion_group, criterion_main, Criterion};
use improve::Ksuid;
use std::hint::black_box;

fn bench_ksuid(c: &mut Criterion) {
    c.bench_function("ksuid_generate", |b| {
        b.iter(|| black_box(Ksuid::generate().unwrap()))
    });

    let id = Ksuid::generate().unwrap();
    let s = id.to_string();
    c.bench_function("ksuid_to_string", |b| b.iter(|| black_box(black_box(&id).to_string())));
    c.bench_function("ksuid_parse", |b| {
        b.iter(|| black_box(black_box(s.as_str()).parse::<Ksuid>().unwrap()))
    });
}

criterion_group!(benches, bench_ksuid);
criterion_main!(benches);
