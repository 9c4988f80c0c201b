use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use simd_kernels::{mean_abs, simd_available, sum_parallel, sum_portable, sum_scalar, sum_simd};

const INPUT_SIZES: &[(&str, usize)] = &[
    ("l1_8k", 8 * 1024),
    ("l2_64k", 64 * 1024),
    ("l3_1m", 1024 * 1024),
    ("mem_16m_odd", 16 * 1024 * 1024 + 3),
];

#[inline]
fn next_u64(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

/// Uniform samples in `[1, 2)`.
fn make_samples(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(1.0 + (next_u64(&mut state) >> 40) as f32 / (1u64 << 24) as f32);
    }
    out
}

fn bench_variant(c: &mut Criterion, name: &str, func: fn(&[f32]) -> f64) {
    let mut group = c.benchmark_group(name);
    for &(label, len) in INPUT_SIZES {
        group.throughput(Throughput::Bytes((len * size_of::<f32>()) as u64));

        let samples = make_samples(len, 0x5EED_F00D_CAFE_BAAEu64 ^ len as u64);
        group.bench_function(BenchmarkId::new("uniform", label), |b| {
            b.iter(|| black_box(func(black_box(&samples))));
        });
    }
    group.finish();
}

fn bench_sum(c: &mut Criterion) {
    bench_variant(c, "sum_scalar", sum_scalar);
    bench_variant(c, "sum_portable", sum_portable);
    if simd_available() {
        bench_variant(c, "sum_simd", sum_simd);
    }
    bench_variant(c, "sum_parallel", sum_parallel);
    bench_variant(c, "mean_abs", mean_abs);
}

criterion_group!(benches, bench_sum);
criterion_main!(benches);
