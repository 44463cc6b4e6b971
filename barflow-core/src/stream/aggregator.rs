//! Aggregator: rolls a finer series up into fixed-period bars.
//!
//! Each upstream item falls in the bucket starting at its timestamp floored
//! to the period, counted from 0001-01-01T00:00, so weekly buckets start on
//! Mondays. Items sharing a bucket merge into one bar: first open, highest
//! high, lowest low, latest close and summed volume. With gap filling, empty
//! buckets between two bars become flat bars at the previous close with zero
//! volume.
//!
//! An aggregator subscribes like a hub and serves its bars like a provider,
//! so hubs attach to it directly. A change to an earlier upstream item
//! re-folds from the bucket of the item just before it; bars before that
//! bucket are untouched.
//!
//! When the upstream prunes, the part of the new first bucket that was
//! dropped is kept as a partial bar. Re-folds that reach the head of the
//! cache start from it, so bars stay equal to aggregating the full history.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{Datelike, Duration, Timelike};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::domain::{Bar, Ohlcv, StreamItem, Timestamp};
use crate::error::{StreamError, StreamResult};

use super::chain::ChainProvider;
use super::change::Change;
use super::hub::HubStatus;
use super::observer::{Observable, Observer, SubscriberId, SubscriberList};
use super::search::index_gte;

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_DAY: i128 = 86_400 * NANOS_PER_SECOND;

/// Named aggregation periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodSize {
    OneMinute,
    TwoMinutes,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    Day,
    Week,
    Month,
}

impl PeriodSize {
    /// Fixed length of the period; `None` for calendar months.
    pub fn to_duration(self) -> Option<Duration> {
        let duration = match self {
            PeriodSize::OneMinute => Duration::minutes(1),
            PeriodSize::TwoMinutes => Duration::minutes(2),
            PeriodSize::ThreeMinutes => Duration::minutes(3),
            PeriodSize::FiveMinutes => Duration::minutes(5),
            PeriodSize::FifteenMinutes => Duration::minutes(15),
            PeriodSize::ThirtyMinutes => Duration::minutes(30),
            PeriodSize::OneHour => Duration::hours(1),
            PeriodSize::TwoHours => Duration::hours(2),
            PeriodSize::FourHours => Duration::hours(4),
            PeriodSize::Day => Duration::days(1),
            PeriodSize::Week => Duration::weeks(1),
            PeriodSize::Month => return None,
        };
        Some(duration)
    }
}

impl fmt::Display for PeriodSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            PeriodSize::OneMinute => "1m",
            PeriodSize::TwoMinutes => "2m",
            PeriodSize::ThreeMinutes => "3m",
            PeriodSize::FiveMinutes => "5m",
            PeriodSize::FifteenMinutes => "15m",
            PeriodSize::ThirtyMinutes => "30m",
            PeriodSize::OneHour => "1h",
            PeriodSize::TwoHours => "2h",
            PeriodSize::FourHours => "4h",
            PeriodSize::Day => "1d",
            PeriodSize::Week => "1w",
            PeriodSize::Month => "1mo",
        };
        f.write_str(code)
    }
}

fn period_nanos(period: Duration) -> StreamResult<i64> {
    match period.num_nanoseconds() {
        Some(nanos) if nanos > 0 => Ok(nanos),
        _ => Err(StreamError::out_of_range(
            "period",
            format!("must be a positive duration, got {period}"),
        )),
    }
}

/// Start of the bucket holding `timestamp`.
fn bucket_start(timestamp: Timestamp, period_nanos: i64) -> Timestamp {
    let days = i128::from(timestamp.date().num_days_from_ce() - 1);
    let time = timestamp.time();
    let since_epoch = days * NANOS_PER_DAY
        + i128::from(time.num_seconds_from_midnight()) * NANOS_PER_SECOND
        + i128::from(time.nanosecond());
    let offset = since_epoch.rem_euclid(i128::from(period_nanos));
    // offset < period_nanos, which fits in i64
    timestamp - Duration::nanoseconds(offset as i64)
}

fn open_bar<I: Ohlcv>(start: Timestamp, item: &I) -> Bar {
    Bar::new(start, item.open(), item.high(), item.low(), item.close(), item.volume())
}

fn merge_into<I: Ohlcv>(bar: &mut Bar, item: &I) {
    bar.high = bar.high.max(item.high());
    bar.low = bar.low.min(item.low());
    bar.close = item.close();
    bar.volume += item.volume();
}

/// Fold one item onto the tail of `bars`.
fn fold_item<I: Ohlcv>(bars: &mut Vec<Bar>, item: &I, period_nanos: i64, fill_gaps: bool) {
    let start = bucket_start(item.timestamp(), period_nanos);
    if let Some(last) = bars.last_mut() {
        if last.timestamp == start {
            merge_into(last, item);
            return;
        }
    }
    if fill_gaps {
        if let Some(&last) = bars.last() {
            let step = Duration::nanoseconds(period_nanos);
            let mut next = last.timestamp + step;
            while next < start {
                bars.push(Bar::new(next, last.close, last.close, last.close, last.close, 0.0));
                next = next + step;
            }
        }
    }
    bars.push(open_bar(start, item));
}

/// Batch aggregation of a timestamp-ordered series into `period` bars.
pub fn aggregate<I: Ohlcv>(items: &[I], period: Duration, fill_gaps: bool) -> StreamResult<Vec<Bar>> {
    let nanos = period_nanos(period)?;
    let mut bars = Vec::new();
    for item in items {
        fold_item(&mut bars, item, nanos, fill_gaps);
    }
    Ok(bars)
}

/// Cloneable handle to a streaming aggregation.
pub struct Aggregator<I> {
    core: Arc<AggregatorCore<I>>,
}

impl<I> Clone for Aggregator<I> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

struct AggregatorCore<I> {
    period: Duration,
    nanos: i64,
    fill_gaps: bool,
    label: String,
    upstream: Arc<dyn Observable<I>>,
    subscription: Mutex<Option<SubscriberId>>,
    cache: RwLock<AggregatorCache>,
    subscribers: Mutex<SubscriberList>,
}

struct AggregatorCache {
    bars: Vec<Bar>,
    /// Pruned part of the first bucket.
    head: Option<Bar>,
    status: HubStatus,
}

impl<I: Ohlcv + StreamItem> Aggregator<I> {
    /// Aggregate `source` into bars of a fixed `period`.
    pub fn new<P: ChainProvider<I>>(source: &P, period: Duration, fill_gaps: bool) -> StreamResult<Self> {
        Self::subscribe_to(source.observable(), period, fill_gaps, format!("AGG({period})"))
    }

    /// Aggregate `source` into bars of a named period. Months are rejected.
    pub fn with_period_size<P: ChainProvider<I>>(
        source: &P,
        size: PeriodSize,
        fill_gaps: bool,
    ) -> StreamResult<Self> {
        let period = size.to_duration().ok_or_else(|| {
            StreamError::InvalidArgument(format!(
                "{size} has no fixed length; pass a duration for custom periods"
            ))
        })?;
        Self::subscribe_to(source.observable(), period, fill_gaps, format!("AGG({size})"))
    }

    fn subscribe_to(
        upstream: Arc<dyn Observable<I>>,
        period: Duration,
        fill_gaps: bool,
        label: String,
    ) -> StreamResult<Self> {
        let nanos = period_nanos(period)?;
        let core = Arc::new(AggregatorCore {
            period,
            nanos,
            fill_gaps,
            label,
            upstream,
            subscription: Mutex::new(None),
            cache: RwLock::new(AggregatorCache {
                bars: Vec::new(),
                head: None,
                status: HubStatus::Subscribed,
            }),
            subscribers: Mutex::new(SubscriberList::new()),
        });
        let observer: Arc<dyn Observer> = core.clone();
        let weak: Weak<dyn Observer> = Arc::downgrade(&observer);
        let id = core.upstream.subscribe(weak, &mut |items| {
            let mut cache = core.cache.write();
            core.refold(&mut cache, items, None);
            cache.status = HubStatus::Active;
        })?;
        *core.subscription.lock() = Some(id);
        info!(
            label = %core.label,
            upstream = %core.upstream.label(),
            upstream_len = core.upstream.item_count(),
            fill_gaps,
            "aggregator subscribed"
        );
        Ok(Self { core })
    }

    /// Re-fold every bar and notify downstream hubs with `Changed(0)`.
    pub fn rebuild(&self) -> StreamResult<()> {
        self.ensure_live()?;
        if let Some(change) = self.core.rebuild_suffix(|_| None) {
            self.core.notify(change);
        }
        Ok(())
    }

    /// Re-fold from the bucket holding `timestamp` on.
    pub fn rebuild_from(&self, timestamp: Timestamp) -> StreamResult<()> {
        self.ensure_live()?;
        let start = bucket_start(timestamp, self.core.nanos);
        if let Some(change) = self.core.rebuild_suffix(|_| Some(start)) {
            self.core.notify(change);
        }
        Ok(())
    }

    /// Forget the partial bar kept across prunes and re-fold the current items.
    pub fn reinitialize(&self) -> StreamResult<()> {
        self.ensure_live()?;
        if let Some(change) = self.core.reset() {
            self.core.notify(change);
        }
        Ok(())
    }

    fn ensure_live(&self) -> StreamResult<()> {
        match self.status() {
            HubStatus::Closed => Err(StreamError::Closed),
            HubStatus::Unsubscribed => Err(StreamError::Unsubscribed),
            HubStatus::Subscribed | HubStatus::Active => Ok(()),
        }
    }

    /// Detach from the upstream. Idempotent; bars are frozen.
    pub fn unsubscribe(&self) {
        if let Some(id) = self.core.subscription.lock().take() {
            self.core.upstream.unsubscribe(id);
        }
        let mut cache = self.core.cache.write();
        if matches!(cache.status, HubStatus::Subscribed | HubStatus::Active) {
            cache.status = HubStatus::Unsubscribed;
            info!(label = %self.core.label, "aggregator unsubscribed");
        }
    }

    pub fn status(&self) -> HubStatus {
        self.core.cache.read().status
    }

    pub fn label(&self) -> String {
        self.core.label.clone()
    }

    pub fn period(&self) -> Duration {
        self.core.period
    }

    pub fn fill_gaps(&self) -> bool {
        self.core.fill_gaps
    }

    /// Snapshot of the aggregated bars.
    pub fn results(&self) -> Vec<Bar> {
        self.core.cache.read().bars.clone()
    }

    pub fn len(&self) -> usize {
        self.core.cache.read().bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Bar> {
        self.core.cache.read().bars.get(index).copied()
    }

    pub fn last(&self) -> Option<Bar> {
        self.core.cache.read().bars.last().copied()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.lock().len()
    }
}

impl<I> fmt::Debug for Aggregator<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.core.cache.read();
        f.debug_struct("Aggregator")
            .field("label", &self.core.label)
            .field("bars", &cache.bars.len())
            .field("status", &cache.status)
            .finish()
    }
}

impl<I: Ohlcv + StreamItem> ChainProvider<Bar> for Aggregator<I> {
    fn observable(&self) -> Arc<dyn Observable<Bar>> {
        self.core.clone()
    }
}

impl<I: Ohlcv + StreamItem> AggregatorCore<I> {
    /// Truncate the bars at bucket `start` (all of them when `None`) and fold
    /// the upstream items from there. Returns the first rewritten position.
    fn refold(&self, cache: &mut AggregatorCache, items: &[I], start: Option<Timestamp>) -> usize {
        let (from_bar, from_item) = match start {
            Some(start) => (index_gte(&cache.bars, start), index_gte(items, start)),
            None => (0, 0),
        };
        let from_item = if from_bar == 0 { 0 } else { from_item };
        cache.bars.truncate(from_bar);
        if cache.bars.is_empty() {
            cache.bars.extend(cache.head);
        }
        for item in &items[from_item..] {
            fold_item(&mut cache.bars, item, self.nanos, self.fill_gaps);
        }
        from_bar
    }

    /// Bucket of the item just before `position`, which a change at
    /// `position` leaves intact.
    fn resume_bucket(&self, items: &[I], position: usize) -> Option<Timestamp> {
        let position = position.min(items.len());
        position
            .checked_sub(1)
            .map(|p| bucket_start(items[p].timestamp(), self.nanos))
    }

    fn on_added(&self, position: usize) -> Vec<Change> {
        let mut forward = Vec::new();
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if cache.status != HubStatus::Active {
                return;
            }
            if position + 1 != items.len() {
                // Out of step with the upstream; fall back to a suffix re-fold.
                let start = self.resume_bucket(items, position);
                let from = self.refold(&mut cache, items, start);
                debug!(from, upstream_len = items.len(), "aggregator resynced");
                forward.push(Change::Changed(from));
                return;
            }
            let before = cache.bars.len();
            fold_item(&mut cache.bars, &items[position], self.nanos, self.fill_gaps);
            let after = cache.bars.len();
            if after == before {
                trace!(position = before - 1, "aggregator merged into last bar");
                forward.push(Change::Changed(before - 1));
            } else {
                trace!(from = before, to = after, "aggregator opened bars");
                forward.extend((before..after).map(Change::Added));
            }
        });
        forward
    }

    fn rebuild_suffix(&self, start: impl Fn(&[I]) -> Option<Timestamp>) -> Option<Change> {
        let mut forward = None;
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if !matches!(cache.status, HubStatus::Active | HubStatus::Subscribed) {
                return;
            }
            let from = self.refold(&mut cache, items, start(items));
            debug!(
                from,
                upstream_len = items.len(),
                label = %self.label,
                "aggregator rebuilt"
            );
            forward = Some(Change::Changed(from));
        });
        forward
    }

    fn reset(&self) -> Option<Change> {
        let mut forward = None;
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if !matches!(cache.status, HubStatus::Active | HubStatus::Subscribed) {
                return;
            }
            cache.head = None;
            self.refold(&mut cache, items, None);
            info!(label = %self.label, upstream_len = items.len(), "aggregator reinitialized");
            forward = Some(Change::Changed(0));
        });
        forward
    }

    /// Fold the outgoing part of the new first bucket into `head`.
    ///
    /// Runs while the upstream still holds the outgoing items. Returns how
    /// many bars fall entirely before the new first bucket.
    fn prepare_prune(&self, count: usize) -> Option<usize> {
        let mut prepared = None;
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if cache.status != HubStatus::Active {
                return;
            }
            let count = count.min(items.len());
            if count == 0 {
                return;
            }
            let first_kept = bucket_start(items[count.min(items.len() - 1)].timestamp(), self.nanos);
            let mut head = cache.head.filter(|bar| bar.timestamp == first_kept);
            let from = index_gte(&items[..count], first_kept);
            for item in &items[from..count] {
                head = Some(match head {
                    Some(mut bar) => {
                        merge_into(&mut bar, item);
                        bar
                    }
                    None => open_bar(first_kept, item),
                });
            }
            cache.head = head;
            let dropped = index_gte(&cache.bars, first_kept);
            if dropped > 0 {
                prepared = Some(dropped);
            }
        });
        prepared
    }

    fn finish_prune(&self, count: usize) {
        let mut cache = self.cache.write();
        let count = count.min(cache.bars.len());
        cache.bars.drain(..count);
        debug!(pruned = count, label = %self.label, "aggregator pruned");
    }

    fn on_closed(&self) -> Option<Change> {
        self.subscription.lock().take();
        let mut cache = self.cache.write();
        if cache.status != HubStatus::Active {
            return None;
        }
        cache.status = HubStatus::Closed;
        Some(Change::Closed)
    }

    fn notify(&self, change: Change) {
        let targets = self.subscribers.lock().live();
        for target in targets {
            target.on_change(change);
        }
    }
}

impl<I: Ohlcv + StreamItem> Observer for AggregatorCore<I> {
    fn on_change(&self, change: Change) {
        let forward: Vec<Change> = match change {
            Change::Added(p) => self.on_added(p),
            Change::Pruned(count) => {
                if let Some(count) = self.prepare_prune(count) {
                    self.notify(Change::Pruned(count));
                    self.finish_prune(count);
                }
                return;
            }
            Change::Closed => self.on_closed().into_iter().collect(),
            other => other
                .invalidates_from()
                .and_then(|p| self.rebuild_suffix(|items| self.resume_bucket(items, p)))
                .into_iter()
                .collect(),
        };
        for change in forward {
            self.notify(change);
            if change == Change::Closed {
                self.subscribers.lock().clear();
            }
        }
    }
}

impl<I: Ohlcv + StreamItem> Observable<Bar> for AggregatorCore<I> {
    fn subscribe(
        &self,
        observer: Weak<dyn Observer>,
        backlog: &mut dyn FnMut(&[Bar]),
    ) -> StreamResult<SubscriberId> {
        let cache = self.cache.read();
        match cache.status {
            HubStatus::Closed => return Err(StreamError::Closed),
            HubStatus::Unsubscribed => return Err(StreamError::Unsubscribed),
            HubStatus::Subscribed | HubStatus::Active => {}
        }
        backlog(&cache.bars);
        Ok(self.subscribers.lock().add(observer))
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(id)
    }

    fn read_items(&self, reader: &mut dyn FnMut(&[Bar])) {
        reader(&self.cache.read().bars);
    }

    fn item_count(&self) -> usize {
        self.cache.read().bars.len()
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
