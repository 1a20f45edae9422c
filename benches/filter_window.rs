//! Criterion benchmarks for the moving-average hot path.
//!
//! Covers the per-sample `push` used by the controller loop and the bulk
//! `filter_in_place` pass used by the `filter` subcommand.
//!
//! Run with: cargo bench --bench filter_window

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sensor_link::filter::FilterWindow;
use sensor_link::history::History;

fn series(len: usize) -> Vec<f64> {
    (0..len).map(|i| ((i as f64).sin() * 10.0).round()).collect()
}

/// Per-sample push for several window widths.
fn filter_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_push");
    group.throughput(Throughput::Elements(1));

    for width in [3usize, 16, 128] {
        let mut window = FilterWindow::new(width).unwrap();
        let mut x = 0.0;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                x += 1.0;
                black_box(window.push(black_box(x)));
            });
        });
    }

    group.finish();
}

/// Bulk filtering of a whole series.
fn filter_in_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_in_place");

    for len in [100usize, 10_000] {
        let input = series(len);
        let mut window = FilterWindow::default();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &input, |b, input| {
            b.iter(|| {
                let mut values = input.clone();
                window.filter_in_place(&mut values);
                black_box(values);
            });
        });
    }

    group.finish();
}

/// Max/min over a growing history, as done on every batch report.
fn history_stats(c: &mut Criterion) {
    let mut history = History::new();
    for value in series(10_000) {
        history.push(value);
    }

    c.bench_function("history_stats_10k", |b| {
        b.iter(|| black_box(history.stats().unwrap()));
    });
}

criterion_group!(benches, filter_push, filter_in_place, history_stats);
criterion_main!(benches);
