//! Benchmarks for the CSV codec and join engine
//!
//! Run with: cargo bench -p csvhub-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use csvhub_core::{csv, join::join, CellValue, TabularDataset};

/// Helper to build a CSV document with `rows` data lines
fn create_bench_csv(rows: usize) -> Vec<u8> {
    let mut text = String::from("id,name,region,amount\n");
    for i in 0..rows {
        text.push_str(&format!("{},customer_{},\"north, east\",{}.25\n", i, i, i % 97));
    }
    text.into_bytes()
}

/// Helper to build the right-hand side as a remote API would return it
fn create_bench_remote(rows: usize) -> TabularDataset {
    let columns = vec!["uid".to_string(), "score".to_string(), "tier".to_string()];
    let rows = (0..rows)
        .map(|i| {
            vec![
                CellValue::from((i * 2) as i64),
                CellValue::from((i % 100) as i64),
                CellValue::from(if i % 3 == 0 { "gold" } else { "silver" }),
            ]
        })
        .collect();
    TabularDataset::from_rows(columns, rows).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv_parse");
    for rows in [1_000, 10_000] {
        let input = create_bench_csv(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &input, |b, input| {
            b.iter(|| csv::parse(black_box(input)).unwrap());
        });
    }
    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("left_join");
    for rows in [1_000, 10_000, 100_000] {
        let left = csv::parse(&create_bench_csv(rows)).unwrap().dataset;
        let right = create_bench_remote(rows);
        group.bench_with_input(
            BenchmarkId::from_parameter(rows),
            &(left, right),
            |b, (left, right)| {
                b.iter(|| join(black_box(left), black_box(right), "id", "uid").unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_join);
criterion_main!(benches);
