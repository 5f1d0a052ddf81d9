//! Performance benchmarks for difftree
//!
//! Covers the snapshot table, the file format and a full walk-and-diff pass.

#![cfg_attr(feature = "quick-bench", allow(dead_code))]

use chrono::Local;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use difftree::codec::{write_snapshot, SnapshotReader};
use difftree::digest::digest_reader;
use difftree::tokenizer::tokenize;
use difftree::{
    CancelToken, ContentSummary, DiffConfigBuilder, DigestKind, EntryKind, FileRecord,
    HashTable, ReportLine, RunState, ScanMode, Snapshot,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::hint::black_box;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn sample_record(rng: &mut StdRng) -> FileRecord {
    let data: Vec<u8> = (0..64).map(|_| rng.random()).collect();
    FileRecord {
        kind: EntryKind::Regular,
        size: rng.random_range(0..1_000_000),
        uid: 1000,
        gid: 1000,
        permissions: 0o644,
        mtime: 1_700_000_000,
        atime: 1_700_000_000,
        ctime: 1_700_000_000,
        inode: rng.random(),
        hardlinks: 1,
        blocks: 8,
        content: ContentSummary::Digest(digest_reader(&data[..], DigestKind::Strong32).unwrap()),
    }
}

fn sample_snapshot(count: usize) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(42);
    let mut snapshot = Snapshot::default();
    for i in 0..count {
        let key = format!("dir_{}/sub_{}/file_{}.txt", i % 17, i % 5, i);
        let _ = snapshot.insert_unique(key.as_bytes(), sample_record(&mut rng));
        snapshot = snapshot.grow_if_needed();
    }
    snapshot
}

/// Benchmark table inserts with growth, then lookups
fn bench_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("table");
    group.measurement_time(Duration::from_secs(2));

    for count in [1_000usize, 10_000, 100_000].iter() {
        let keys: Vec<String> = (0..*count).map(|i| format!("usr/share/doc/pkg_{}/README", i)).collect();

        group.bench_with_input(BenchmarkId::new("insert", count), &keys, |b, keys| {
            b.iter(|| {
                let mut table: HashTable<usize> = HashTable::default();
                for (i, key) in keys.iter().enumerate() {
                    let _ = table.insert_unique(key.as_bytes(), i);
                    table = table.grow_if_needed();
                }
                black_box(table.record_count());
            });
        });

        let mut table: HashTable<usize> = HashTable::default();
        for (i, key) in keys.iter().enumerate() {
            let _ = table.insert_unique(key.as_bytes(), i);
            table = table.grow_if_needed();
        }
        group.bench_with_input(BenchmarkId::new("lookup", count), &keys, |b, keys| {
            b.iter(|| {
                let mut hits = 0usize;
                for key in keys {
                    if table.contains(key.as_bytes()) {
                        hits += 1;
                    }
                }
                black_box(hits);
            });
        });
    }

    group.finish();
}

/// Benchmark writing and re-reading a snapshot in memory
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(20);

    for count in [1_000usize, 10_000].iter() {
        let snapshot = sample_snapshot(*count);
        let mut encoded = Vec::new();
        write_snapshot(&mut encoded, &snapshot, Path::new("/bench"), ScanMode::Hash, &Local::now()).unwrap();

        group.bench_with_input(BenchmarkId::new("write", count), &snapshot, |b, snapshot| {
            b.iter(|| {
                let mut out = Vec::with_capacity(encoded.len());
                write_snapshot(&mut out, snapshot, Path::new("/bench"), ScanMode::Hash, &Local::now()).unwrap();
                black_box(out);
            });
        });

        group.bench_with_input(BenchmarkId::new("read", count), &encoded, |b, encoded| {
            b.iter(|| {
                let mut reader = SnapshotReader::new(Cursor::new(encoded.as_slice())).unwrap();
                let mut n = 0usize;
                while let Some(record) = reader.next_record().unwrap() {
                    black_box(record);
                    n += 1;
                }
                black_box(n);
            });
        });
    }

    let line = br#"KEY="usr/share/doc/pkg|1/README"|TYPE=f|SIZE=1234|UID=0|GID=0|PERM=0644|MTIME=1700000000|ATIME=1700000000|CTIME=1700000000|INODE=42|HLINKS=1|BLOCKS=8|SHA256=2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824|"#;
    group.bench_function("tokenize_line", |b| {
        b.iter(|| black_box(tokenize(black_box(line)).unwrap()));
    });

    group.finish();
}

/// Benchmark a full hash-mode walk of two identical trees
fn bench_walk_and_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_and_diff");
    group.measurement_time(Duration::from_secs(3));
    group.sample_size(10);

    for file_count in [100usize, 1_000].iter() {
        let temp_dir = TempDir::new().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..*file_count {
            let dir = temp_dir.path().join(format!("dir_{}", i % 10));
            fs::create_dir_all(&dir).unwrap();
            let size = rng.random_range(100..4_000);
            let content: Vec<u8> = (0..size).map(|_| rng.random()).collect();
            fs::write(dir.join(format!("file_{}.bin", i)), content).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(file_count), file_count, |b, _| {
            b.iter(|| {
                let config = DiffConfigBuilder::new()
                    .digest(DigestKind::Strong32)
                    .build()
                    .unwrap();
                let mut state = RunState::new(config, CancelToken::new()).unwrap();
                let mut lines: Vec<ReportLine> = Vec::new();
                state.process_argument(temp_dir.path(), &mut lines).unwrap();
                state.process_argument(temp_dir.path(), &mut lines).unwrap();
                black_box(lines);
            });
        });
    }

    group.finish();
}

#[cfg(feature = "quick-bench")]
criterion_group!(benches, bench_table, bench_codec);

#[cfg(not(feature = "quick-bench"))]
criterion_group!(benches, bench_table, bench_codec, bench_walk_and_diff);

criterion_main!(benches);
