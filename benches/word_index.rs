//! Word index benchmarks.
//!
//! Key questions:
//! - What does a query cost while words are pending versus after a rebuild?
//! - How long does a rebuild take as the vocabulary grows?
//! - Where does the kd-tree start beating the linear scan?

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use visword::{
    Descriptors, KdTreeParams, LazyRebuildConfig, NnStrategy, SignatureIndex, VisualWordIndex, Word,
};

const DIM: usize = 64;
const QUERY_ROWS: usize = 200;

fn random_rows(rng: &mut StdRng, n: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
        .collect()
}

fn vocabulary(n: usize) -> Vec<Word> {
    let mut rng = StdRng::seed_from_u64(42);
    random_rows(&mut rng, n, DIM)
        .into_iter()
        .enumerate()
        .map(|(i, v)| Word::new(i as u32 + 1, v))
        .collect()
}

fn queries() -> Descriptors {
    let mut rng = StdRng::seed_from_u64(7);
    Descriptors::from_f32_rows(&random_rows(&mut rng, QUERY_ROWS, DIM)).unwrap()
}

/// Index over `words`; the last `pending` of them are added after the rebuild.
fn index_with_pending(strategy: NnStrategy, words: &[Word], pending: usize) -> VisualWordIndex {
    let config = LazyRebuildConfig {
        max_pending: usize::MAX,
        auto_rebuild: false,
    };
    let mut index = VisualWordIndex::with_config(strategy, config);
    let split = words.len() - pending;
    for word in &words[..split] {
        index.add_word(word.clone()).unwrap();
    }
    index.update().unwrap();
    for word in &words[split..] {
        index.add_word(word.clone()).unwrap();
    }
    index
}

fn bench_pending_vs_built(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_nn_pending");
    group.throughput(Throughput::Elements(QUERY_ROWS as u64));

    let words = vocabulary(5_000);
    let q = queries();

    for pending in [0, 10, 100, 1_000].iter() {
        let index = index_with_pending(NnStrategy::default(), &words, *pending);
        group.bench_with_input(BenchmarkId::from_parameter(pending), pending, |bench, _| {
            bench.iter(|| index.find_nn(black_box(&q)));
        });
    }

    group.finish();
}

fn bench_removed_overfetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_nn_removed");
    group.throughput(Throughput::Elements(QUERY_ROWS as u64));

    let words = vocabulary(5_000);
    let q = queries();

    for removed in [0usize, 10, 100].iter() {
        let mut index = index_with_pending(NnStrategy::default(), &words, 0);
        let ids: Vec<u32> = (1..=*removed as u32).collect();
        index.remove_words(&ids);
        group.bench_with_input(BenchmarkId::from_parameter(removed), removed, |bench, _| {
            bench.iter(|| index.find_nn(black_box(&q)));
        });
    }

    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    group.sample_size(20);

    for n in [1_000, 5_000, 20_000].iter() {
        let words = vocabulary(*n);
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |bench, _| {
            bench.iter_batched(
                || {
                    let mut index = VisualWordIndex::default();
                    for word in &words {
                        index.add_word(word.clone()).unwrap();
                    }
                    index
                },
                |mut index| black_box(index.update().unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_kdtree_vs_linear(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy");
    group.throughput(Throughput::Elements(QUERY_ROWS as u64));
    let q = queries();

    for n in [500, 5_000, 20_000].iter() {
        let words = vocabulary(*n);
        let strategies = [
            ("kdtree", NnStrategy::default()),
            (
                "kdtree_bounded",
                NnStrategy::KdTree(KdTreeParams {
                    max_checks: Some(256),
                    ..KdTreeParams::default()
                }),
            ),
            ("linear", NnStrategy::Linear),
        ];
        for (name, strategy) in strategies {
            let index = index_with_pending(strategy, &words, 0);
            group.bench_with_input(BenchmarkId::new(name, n), n, |bench, _| {
                bench.iter(|| index.find_nn(black_box(&q)));
            });
        }
    }

    group.finish();
}

fn bench_signature_ranking(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut index = SignatureIndex::default();
    index.put_signatures((1..=2_000u32).map(|sig| {
        let words: Vec<u32> = (0..300).map(|_| rng.gen_range(1..=10_000)).collect();
        (sig, words)
    }));
    let query: Vec<u32> = (0..500).map(|_| rng.gen_range(1..=10_000)).collect();

    c.bench_function("rank_signatures", |bench| {
        bench.iter(|| index.rank_signatures(black_box(&query), 10));
    });
}

criterion_group!(
    benches,
    bench_pending_vs_built,
    bench_removed_overfetch,
    bench_rebuild,
    bench_kdtree_vs_linear,
    bench_signature_ranking
);
criterion_main!(benches);
