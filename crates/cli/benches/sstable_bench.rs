use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use memtable::{MemTable, Table};
use sstable::{SsTable, SsTableWriter};
use std::path::Path;
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn build_memtable() -> MemTable {
    let mem = MemTable::new();
    for i in 0..N_KEYS {
        mem.upsert(format!("key{:05}", i), vec![b'x'; VALUE_SIZE], i as i64 + 1);
    }
    mem
}

fn write_table(dir: &Path, mem: &MemTable) -> SsTable {
    SsTableWriter::write_entries(&dir.join("0.tmp"), &dir.join("0.db"), mem.iter_all()).unwrap()
}

fn sstable_write_benchmark(c: &mut Criterion) {
    c.bench_function("sstable_write_from_memtable_10k", |b| {
        b.iter_batched(
            || (tempdir().unwrap(), build_memtable()),
            |(dir, mem)| {
                write_table(dir.path(), &mem);
            },
            BatchSize::SmallInput,
        );
    });
}

fn sstable_get_hit_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let table = write_table(dir.path(), &build_memtable());

    c.bench_function("sstable_get_hit_10k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("key{:05}", i);
                assert!(table.get(key.as_bytes()).is_some());
            }
        });
    });
}

fn sstable_get_miss_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let table = write_table(dir.path(), &build_memtable());

    c.bench_function("sstable_get_miss_10k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("missing{}", i);
                assert!(table.get(key.as_bytes()).is_none());
            }
        });
    });
}

fn sstable_scan_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let table = write_table(dir.path(), &build_memtable());

    c.bench_function("sstable_full_scan_10k", |b| {
        b.iter(|| assert_eq!(table.iter_all().count(), N_KEYS));
    });
}

criterion_group!(
    benches,
    sstable_write_benchmark,
    sstable_get_hit_benchmark,
    sstable_get_miss_benchmark,
    sstable_scan_benchmark
);
criterion_main!(benches);
