//! Criterion benchmarks for the three execution modes.
//!
//! Benchmarks:
//! 1. Batch recompute over a full series (SMA, ATR, RSI)
//! 2. Buffer list incremental adds
//! 3. Hub tail appends through a quote provider, single and chained
//! 4. Late insert near the head of a long hub cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barflow_core::sample::sample_bars;
use barflow_core::{Bar, BufferList, ChainProvider, Formula, QuoteProvider};
use barflow_indicators::{Atr, Ema, Rsi, Sma};

const BAR_COUNTS: [usize; 3] = [252, 1260, 2520];

// ── 1. Batch ─────────────────────────────────────────────────────────

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_recompute");

    for &bar_count in &BAR_COUNTS {
        let bars = sample_bars(7, bar_count);
        let sma = Sma::new(20).unwrap();
        let atr = Atr::new(14).unwrap();
        let rsi = Rsi::new(14).unwrap();

        group.bench_with_input(BenchmarkId::new("sma_20", bar_count), &bars, |b, bars| {
            b.iter(|| Formula::<Bar>::compute_all(&sma, black_box(bars)));
        });
        group.bench_with_input(BenchmarkId::new("atr_14", bar_count), &bars, |b, bars| {
            b.iter(|| Formula::<Bar>::compute_all(&atr, black_box(bars)));
        });
        group.bench_with_input(BenchmarkId::new("rsi_14", bar_count), &bars, |b, bars| {
            b.iter(|| Formula::<Bar>::compute_all(&rsi, black_box(bars)));
        });
    }

    group.finish();
}

// ── 2. Buffer ────────────────────────────────────────────────────────

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_add");

    for &bar_count in &BAR_COUNTS {
        let bars = sample_bars(7, bar_count);

        group.bench_with_input(BenchmarkId::new("atr_14", bar_count), &bars, |b, bars| {
            b.iter(|| {
                let mut buffer = BufferList::new(Atr::new(14).unwrap());
                for bar in bars {
                    buffer.add(black_box(*bar)).unwrap();
                }
                buffer.len()
            });
        });
    }

    group.finish();
}

// ── 3. Hub tail appends ──────────────────────────────────────────────

fn bench_hub_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_append");

    for &bar_count in &BAR_COUNTS {
        let bars = sample_bars(7, bar_count);

        group.bench_with_input(BenchmarkId::new("atr_14", bar_count), &bars, |b, bars| {
            b.iter(|| {
                let provider = QuoteProvider::new();
                let hub = provider.attach(Atr::new(14).unwrap()).unwrap();
                for bar in bars {
                    provider.append(black_box(*bar)).unwrap();
                }
                hub.len()
            });
        });

        // Provider → EMA(10) → RSI(14)
        group.bench_with_input(BenchmarkId::new("ema_rsi_chain", bar_count), &bars, |b, bars| {
            b.iter(|| {
                let provider = QuoteProvider::new();
                let ema = provider.attach(Ema::new(10).unwrap()).unwrap();
                let rsi = ema.attach(Rsi::new(14).unwrap()).unwrap();
                for bar in bars {
                    provider.append(black_box(*bar)).unwrap();
                }
                rsi.len()
            });
        });
    }

    group.finish();
}

// ── 4. Late insert ───────────────────────────────────────────────────

fn bench_late_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_late_insert");
    group.sample_size(20);

    for &bar_count in &BAR_COUNTS {
        let bars = sample_bars(7, bar_count);
        let late = bars[10];
        let rest: Vec<Bar> = bars.iter().copied().filter(|b| *b != late).collect();

        group.bench_with_input(BenchmarkId::new("atr_14", bar_count), &rest, |b, rest| {
            b.iter(|| {
                let provider = QuoteProvider::new();
                let hub = provider.attach(Atr::new(14).unwrap()).unwrap();
                provider.add_batch(rest.iter().copied()).unwrap();
                provider.insert(black_box(late)).unwrap();
                hub.len()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_batch,
    bench_buffer,
    bench_hub_append,
    bench_late_insert
);
criterion_main!(benches);
