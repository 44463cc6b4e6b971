//! Property tests for the streaming contract.
//!
//! Uses proptest to verify:
//! 1. Exactness: after any mutation sequence, hub results equal the batch fold
//! 2. Path independence: arrival order does not change the settled results
//! 3. Buffer partitions: any split of the input into batches gives the same results
//! 4. Chains: a two-level chain tracks the composed batch computation

use barflow_core::formula::require_period;
use barflow_core::{
    Bar, BufferList, ChainProvider, Formula, QuoteProvider, Reusable, Series, StreamResult,
    Timestamp,
};
use chrono::NaiveDate;
use proptest::prelude::*;

// ── Test formula ─────────────────────────────────────────────────────

/// Trailing sum over `period` values plus a carried count of defined inputs.
#[derive(Debug, Clone)]
struct TrailingSum {
    period: usize,
}

impl TrailingSum {
    fn new(period: usize) -> StreamResult<Self> {
        Ok(Self {
            period: require_period("period", period, 1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SumResult {
    timestamp: Timestamp,
    sum: Option<f64>,
    seen: u64,
}

impl Series for SumResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for SumResult {
    fn value(&self) -> f64 {
        self.sum.unwrap_or(f64::NAN)
    }
}

impl<T: Reusable> Formula<T> for TrailingSum {
    type Output = SumResult;
    type State = u64;

    fn label(&self) -> String {
        format!("SUM({})", self.period)
    }

    fn window(&self) -> usize {
        self.period
    }

    fn step(&self, window: &[T], seen: &u64) -> (SumResult, u64) {
        let current = &window[window.len() - 1];
        let seen = if current.value().is_nan() { *seen } else { seen + 1 };
        let sum = (window.len() == self.period)
            .then(|| window.iter().map(|w| w.value()).sum::<f64>())
            .filter(|s| !s.is_nan());
        (
            SumResult {
                timestamp: current.timestamp(),
                sum,
                seen,
            },
            seen,
        )
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn bars_from(closes: &[f64]) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2021, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            Bar::new(
                base + chrono::Duration::days(i as i64),
                c,
                c + 1.0,
                c - 1.0,
                c,
                100.0,
            )
        })
        .collect()
}

fn batch(period: usize, bars: &[Bar]) -> Vec<SumResult> {
    Formula::<Bar>::compute_all(&TrailingSum::new(period).unwrap(), bars)
}

#[derive(Debug, Clone)]
enum Op {
    /// Append the next unused bar.
    Append,
    /// Insert a withheld bar at its chronological position.
    InsertWithheld,
    /// Remove the bar at (index mod len).
    Remove(usize),
    /// Resend the last bar unchanged.
    Resend,
    /// Replace the last bar's close.
    Revise(f64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Append),
        2 => Just(Op::InsertWithheld),
        1 => (0usize..64).prop_map(Op::Remove),
        1 => Just(Op::Resend),
        1 => (1.0..50.0_f64).prop_map(Op::Revise),
    ]
}

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..100.0_f64, 8..40)
}

// ── 1. Exactness ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn hub_equals_batch_after_any_mutation(
        closes in arb_closes(),
        ops in prop::collection::vec(arb_op(), 1..60),
        period in 1usize..6,
    ) {
        let bars = bars_from(&closes);
        let provider = QuoteProvider::new();
        let hub = provider.attach(TrailingSum::new(period).unwrap()).unwrap();

        let mut next = 0;
        let mut withheld: Vec<Bar> = Vec::new();
        for op in ops {
            match op {
                Op::Append => {
                    if next < bars.len() {
                        // Every third bar is held back for a late insert.
                        if next % 3 == 1 {
                            withheld.push(bars[next]);
                        } else {
                            provider.append(bars[next]).unwrap();
                        }
                        next += 1;
                    }
                }
                Op::InsertWithheld => {
                    if let Some(bar) = withheld.pop() {
                        provider.insert(bar).unwrap();
                    }
                }
                Op::Remove(i) => {
                    let len = provider.len();
                    if len > 0 {
                        provider.remove_at(i % len).unwrap();
                    }
                }
                Op::Resend => {
                    if let Some(last) = provider.last() {
                        provider.append(last).unwrap();
                    }
                }
                Op::Revise(close) => {
                    if let Some(mut last) = provider.last() {
                        last.close = close;
                        provider.append(last).unwrap();
                    }
                }
            }
            prop_assert_eq!(hub.results(), batch(period, &provider.quotes()));
        }
    }
}

// ── 2. Path independence ─────────────────────────────────────────────

proptest! {
    #[test]
    fn arrival_order_does_not_matter(
        closes in arb_closes(),
        order in any::<u64>(),
        period in 1usize..6,
    ) {
        let bars = bars_from(&closes);
        let mut shuffled = bars.clone();
        // Deterministic shuffle from the drawn seed.
        let mut seed = order;
        for i in (1..shuffled.len()).rev() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (seed >> 33) as usize % (i + 1);
            shuffled.swap(i, j);
        }

        let provider = QuoteProvider::new();
        let hub = provider.attach(TrailingSum::new(period).unwrap()).unwrap();
        for bar in shuffled {
            provider.insert(bar).unwrap();
        }
        prop_assert_eq!(provider.quotes(), bars.clone());
        prop_assert_eq!(hub.results(), batch(period, &bars));
    }
}

// ── 3. Buffer partitions ─────────────────────────────────────────────

proptest! {
    #[test]
    fn buffer_batches_partition_freely(
        closes in arb_closes(),
        cuts in prop::collection::vec(0usize..40, 0..5),
        period in 1usize..6,
    ) {
        let bars = bars_from(&closes);
        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (bars.len() + 1)).collect();
        cuts.push(0);
        cuts.push(bars.len());
        cuts.sort_unstable();
        cuts.dedup();

        let mut buffer = BufferList::new(TrailingSum::new(period).unwrap());
        for pair in cuts.windows(2) {
            buffer.add_batch(bars[pair[0]..pair[1]].to_vec()).unwrap();
        }
        prop_assert_eq!(buffer.results(), batch(period, &bars));
    }
}

// ── 4. Chains ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn chain_equals_composed_batch(
        closes in arb_closes(),
        removals in prop::collection::vec(0usize..64, 0..6),
    ) {
        let mut bars = bars_from(&closes);
        let provider = QuoteProvider::new();
        let first = provider.attach(TrailingSum::new(2).unwrap()).unwrap();
        let second = first.attach(TrailingSum::new(3).unwrap()).unwrap();
        provider.add_batch(bars.clone()).unwrap();

        for r in removals {
            if bars.is_empty() {
                break;
            }
            let index = r % bars.len();
            provider.remove_at(index).unwrap();
            bars.remove(index);
        }

        let expected = Formula::<SumResult>::compute_all(
            &TrailingSum::new(3).unwrap(),
            &batch(2, &bars),
        );
        prop_assert_eq!(second.results(), expected);
    }
}

// ── Concurrency ──────────────────────────────────────────────────────

#[test]
fn concurrent_writers_settle_to_batch() {
    let bars = bars_from(&(0..200).map(|i| 10.0 + (i % 13) as f64).collect::<Vec<_>>());
    let provider = QuoteProvider::new();
    let hub = provider.attach(TrailingSum::new(5).unwrap()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|k| {
            let provider = provider.clone();
            let mine: Vec<Bar> = bars.iter().skip(k).step_by(4).copied().collect();
            std::thread::spawn(move || {
                for bar in mine {
                    provider.insert(bar).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(provider.quotes(), bars);
    assert_eq!(hub.results(), batch(5, &bars));
}
