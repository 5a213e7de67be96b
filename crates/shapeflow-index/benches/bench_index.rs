use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use shapeflow_index::{LatentIndex, LatentMatrix};

fn random_latents(rng: &mut StdRng, rows: usize, dims: usize) -> LatentMatrix {
    let data = (0..rows * dims).map(|_| rng.random::<f32>()).collect();
    LatentMatrix::new(rows, dims, data).unwrap()
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("latent_index");
    let mut rng = StdRng::seed_from_u64(0);

    for (rows, dims) in [(1000, 8), (5000, 32), (5000, 64)] {
        let latents = random_latents(&mut rng, rows, dims);
        let queries = random_latents(&mut rng, 16, dims);
        let id = format!("{}x{}", rows, dims);

        group.bench_with_input(BenchmarkId::new("build", &id), &latents, |b, l| {
            b.iter(|| LatentIndex::new(black_box(l.clone())))
        });

        let index = LatentIndex::new(latents);
        group.bench_with_input(BenchmarkId::new("query_k10", &id), &queries, |b, q| {
            b.iter(|| index.query(black_box(q), 10))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_index);
criterion_main!(benches);
