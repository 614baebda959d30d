//! Benchmarks for the core tree operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shadowtree::{BPlusTree, BlockFile, MemoryMedium, TreeConfig};
use tempfile::tempdir;

fn filled(count: usize) -> BPlusTree<BlockFile<MemoryMedium>> {
    let mut tree = BPlusTree::create_on(MemoryMedium::new(), TreeConfig::new(16)).unwrap();
    for i in 0..count {
        tree.set(format!("key{:08}", i), i as i64).unwrap();
    }
    tree.commit().unwrap();
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_insert");

    for count in [1_000usize, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("sequential", count), count, |b, &count| {
            b.iter(|| black_box(filled(count)));
        });
        group.bench_with_input(BenchmarkId::new("scattered", count), count, |b, &count| {
            b.iter(|| {
                let mut tree =
                    BPlusTree::create_on(MemoryMedium::new(), TreeConfig::new(16)).unwrap();
                for i in 0..count {
                    let k = (i * 7919) % count;
                    tree.set(format!("key{:08}", k), k as i64).unwrap();
                }
                tree.commit().unwrap();
                black_box(tree)
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_lookup");
    let count = 10_000;

    for limit in [5usize, 100, 10_000].iter() {
        let mut tree = filled(count);
        tree.set_footprint_limit(*limit).unwrap();
        group.bench_with_input(BenchmarkId::new("footprint", limit), limit, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % count;
                black_box(tree.get(format!("key{:08}", i)).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.bpt");
    let mut tree = BPlusTree::create_file(&path, TreeConfig::new(16)).unwrap();
    for i in 0..10_000 {
        tree.set(format!("key{:08}", i), i).unwrap();
    }
    tree.commit().unwrap();

    c.bench_function("commit_100_updates", |b| {
        let mut round = 0i64;
        b.iter(|| {
            round += 1;
            for i in 0..100 {
                tree.set(format!("key{:08}", (i * 97) % 10_000), round).unwrap();
            }
            tree.commit().unwrap();
        });
    });
}

criterion_group!(benches, bench_insert, bench_lookup, bench_commit);
criterion_main!(benches);
