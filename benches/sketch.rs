use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

use prgmap::index::MinimizerIndex;
use prgmap::map::{cluster_hits, hits_for_read, sketch_read};
use prgmap::prg::LocalPrg;

/// Random DNA of a given length.
fn generate_sequence(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bases = ['A', 'C', 'G', 'T'];
    (0..len).map(|_| bases[rng.gen_range(0..4)]).collect()
}

fn bench_read_sketching(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_sketching");

    for read_len in [150usize, 1000, 10000] {
        let read = generate_sequence(read_len);
        group.throughput(Throughput::Bytes(read_len as u64));
        group.bench_with_input(BenchmarkId::new("w14_k15", read_len), &read, |b, read| {
            b.iter(|| black_box(sketch_read(read.as_bytes(), 14, 15)));
        });
    }
    group.finish();
}

fn bench_prg_sketch(c: &mut Criterion) {
    let mut group = c.benchmark_group("prg_sketch");

    for num_sites in [2usize, 6, 10] {
        // alternating runs and biallelic sites
        let mut text = generate_sequence(60);
        for _ in 0..num_sites {
            text.push('(');
            text.push_str(&generate_sequence(20));
            text.push('|');
            text.push_str(&generate_sequence(20));
            text.push(')');
            text.push_str(&generate_sequence(60));
        }

        group.bench_with_input(BenchmarkId::new("w4_k11", num_sites), &text, |b, text| {
            b.iter(|| {
                let mut index = MinimizerIndex::new(4, 11);
                let mut prg = LocalPrg::new(0, "bench", text).unwrap();
                prg.minimizer_sketch(&mut index, 4, 11).unwrap();
                black_box(index.num_records())
            });
        });
    }
    group.finish();
}

fn bench_hit_clustering(c: &mut Criterion) {
    // one locus indexed, many reads clustered against it
    let locus = generate_sequence(2000);
    let mut index = MinimizerIndex::new(4, 11);
    let mut prg = LocalPrg::new(0, "bench", &locus).unwrap();
    prg.minimizer_sketch(&mut index, 4, 11).unwrap();

    let read = &locus[400..1400];

    c.bench_function("hit_clustering", |b| {
        b.iter(|| {
            let minimizers = sketch_read(read.as_bytes(), 4, 11);
            let hits = hits_for_read(0, &minimizers, &index);
            black_box(cluster_hits(hits, 500, 4))
        });
    });
}

criterion_group!(
    benches,
    bench_read_sketching,
    bench_prg_sketch,
    bench_hit_clustering
);
criterion_main!(benches);
