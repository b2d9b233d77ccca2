use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use improve::{EncoderConfig, FeatureEncoder, Givens, Variant};
use std::hint::black_box;

fn variant(i: usize) -> Variant {
    Variant::mapping([
        ("text", Variant::from(format!("greeting number {i}"))),
        ("size", Variant::from((i % 7) as i64)),
        ("bold", Variant::from(i % 2 == 0)),
        (
            "tags",
            Variant::from(vec![Variant::from("a"), Variant::from(format!("t{}", i % 5))]),
        ),
    ])
}

fn bench_encode(c: &mut Criterion) {
    let encoder = FeatureEncoder::new(EncoderConfig::default()).unwrap();
    let givens: Givens = [
        ("lang".to_string(), Variant::from("en")),
        ("weekday".to_string(), Variant::from(3.25)),
        ("d".to_string(), Variant::from(17i64)),
    ]
    .into_iter()
    .collect();

    let mut group = c.benchmark_group("encode_variants");
    for &n in &[1usize, 16, 256] {
        let variants: Vec<Variant> = (0..n).map(variant).collect();
        group.bench_with_input(BenchmarkId::new("with_givens", n), &n, |b, &_n| {
            b.iter(|| {
                let fvs = encoder
                    .encode_variants(black_box(&variants), Some(&givens), 0.5)
                    .unwrap();
                black_box(fvs);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
