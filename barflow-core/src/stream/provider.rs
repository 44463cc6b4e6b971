//! Quote provider: owner of the bar sequence and root of every chain.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::config::StreamSettings;
use crate::domain::{StreamItem, Timestamp};
use crate::error::{StreamError, StreamResult};

use super::change::{Act, Change};
use super::observer::{Observable, Observer, SubscriberId, SubscriberList};
use super::search::{index_gte, index_of};

/// Cloneable handle to a timestamp-ordered sequence of bars.
///
/// Every mutation runs to completion, including the synchronous cascade
/// through all attached hubs, before the call returns. Mutations from
/// several threads are serialized; readers never see a half-applied change.
pub struct QuoteProvider<Q> {
    core: Arc<ProviderCore<Q>>,
}

impl<Q> Clone for QuoteProvider<Q> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

pub(crate) struct ProviderCore<Q> {
    /// Held for a whole mutation plus its cascade.
    gate: Mutex<()>,
    state: RwLock<ProviderState<Q>>,
    subscribers: Mutex<SubscriberList>,
}

struct ProviderState<Q> {
    quotes: Vec<Q>,
    settings: StreamSettings,
    closed: bool,
    faulted: bool,
    overflow_count: u32,
}

impl<Q> ProviderState<Q> {
    fn ensure_writable(&self) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if self.faulted {
            return Err(StreamError::Faulted);
        }
        Ok(())
    }

    /// Count one identical resend; faults once the threshold is passed.
    fn count_resend(&mut self) -> StreamResult<Act> {
        self.overflow_count += 1;
        if self.overflow_count > self.settings.overflow_threshold {
            self.faulted = true;
            warn!(
                threshold = self.settings.overflow_threshold,
                "identical resend threshold exceeded, provider faulted"
            );
            return Err(StreamError::Overflow {
                threshold: self.settings.overflow_threshold,
            });
        }
        Ok(Act::DoNothing)
    }

    /// Oldest items to drop so the cache fits its limit.
    fn excess(&self) -> usize {
        match self.settings.max_cache_size {
            Some(max) => self.quotes.len().saturating_sub(max),
            None => 0,
        }
    }
}

impl<Q: StreamItem> QuoteProvider<Q> {
    pub fn new() -> Self {
        Self::build(Vec::new(), StreamSettings::default())
    }

    pub fn with_settings(settings: StreamSettings) -> StreamResult<Self> {
        Ok(Self::build(Vec::new(), settings.validated()?))
    }

    /// Start from an existing ordered history.
    ///
    /// The quotes must already be in strictly increasing timestamp order.
    /// A history longer than the cache limit keeps only its newest part.
    pub fn from_quotes(quotes: Vec<Q>, settings: StreamSettings) -> StreamResult<Self> {
        let settings = settings.validated()?;
        for pair in quotes.windows(2) {
            let (last, next) = (pair[0].timestamp(), pair[1].timestamp());
            if next == last {
                return Err(StreamError::InvalidArgument(format!(
                    "duplicate timestamp {next} in initial quotes"
                )));
            }
            if next < last {
                return Err(StreamError::OutOfOrder {
                    timestamp: next,
                    last,
                });
            }
        }
        let mut quotes = quotes;
        if let Some(max) = settings.max_cache_size {
            let excess = quotes.len().saturating_sub(max);
            quotes.drain(..excess);
        }
        Ok(Self::build(quotes, settings))
    }

    fn build(quotes: Vec<Q>, settings: StreamSettings) -> Self {
        Self {
            core: Arc::new(ProviderCore {
                gate: Mutex::new(()),
                state: RwLock::new(ProviderState {
                    quotes,
                    settings,
                    closed: false,
                    faulted: false,
                    overflow_count: 0,
                }),
                subscribers: Mutex::new(SubscriberList::new()),
            }),
        }
    }

    /// Append a bar at the tail.
    ///
    /// A bar at the last timestamp replaces it when different (`Act::Update`)
    /// and is ignored when identical (`Act::DoNothing`). An older timestamp
    /// is rejected; use [`insert`](Self::insert) for late arrivals.
    pub fn append(&self, quote: Q) -> StreamResult<Act> {
        let _gate = self.core.gate.lock();
        let (act, change) = {
            let mut st = self.core.state.write();
            st.ensure_writable()?;
            let len = st.quotes.len();
            let timestamp = quote.timestamp();
            match st.quotes.last().map(|last| last.timestamp()) {
                Some(last) if timestamp < last => {
                    warn!(%timestamp, %last, "rejected out-of-order append");
                    return Err(StreamError::OutOfOrder { timestamp, last });
                }
                Some(last) if timestamp == last => {
                    if st.quotes[len - 1] == quote {
                        return st.count_resend();
                    }
                    st.quotes[len - 1] = quote;
                    st.overflow_count = 0;
                    (Act::Update, Change::Changed(len - 1))
                }
                _ => {
                    st.quotes.push(quote);
                    st.overflow_count = 0;
                    trace!(position = len, "appended bar");
                    (Act::Add, Change::Added(len))
                }
            }
        };
        self.core.notify(change);
        if act == Act::Add {
            self.core.prune();
        }
        Ok(act)
    }

    /// Append several bars, sorted by timestamp first.
    ///
    /// Stops at the first error; bars before it stay applied. Returns how
    /// many bars changed the sequence.
    pub fn add_batch(&self, quotes: impl IntoIterator<Item = Q>) -> StreamResult<usize> {
        let mut quotes: Vec<Q> = quotes.into_iter().collect();
        quotes.sort_by_key(|q| q.timestamp());
        let mut applied = 0;
        for quote in quotes {
            if self.append(quote)? != Act::DoNothing {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Place a bar at its chronological position.
    ///
    /// A new timestamp before the tail shifts later bars right and invalidates
    /// every result from that position on. An existing timestamp behaves like
    /// a resend of that bar.
    pub fn insert(&self, quote: Q) -> StreamResult<Act> {
        let _gate = self.core.gate.lock();
        let (act, change) = {
            let mut st = self.core.state.write();
            st.ensure_writable()?;
            let len = st.quotes.len();
            let position = index_gte(&st.quotes, quote.timestamp());
            if position < len && st.quotes[position].timestamp() == quote.timestamp() {
                if st.quotes[position] == quote {
                    return st.count_resend();
                }
                st.quotes[position] = quote;
                st.overflow_count = 0;
                (Act::Update, Change::Changed(position))
            } else if position == len {
                st.quotes.push(quote);
                st.overflow_count = 0;
                (Act::Add, Change::Added(position))
            } else {
                st.quotes.insert(position, quote);
                st.overflow_count = 0;
                debug!(position, "inserted late bar");
                (Act::Insert, Change::Inserted(position))
            }
        };
        self.core.notify(change);
        if act == Act::Add {
            self.core.prune();
        }
        Ok(act)
    }

    /// Remove the bar with this bar's timestamp.
    pub fn remove(&self, quote: &Q) -> StreamResult<Act> {
        let timestamp = quote.timestamp();
        self.remove_where(|quotes| {
            index_of(quotes, timestamp).ok_or(StreamError::NotFound(timestamp))
        })
    }

    /// Remove the bar at `index`.
    pub fn remove_at(&self, index: usize) -> StreamResult<Act> {
        self.remove_where(|quotes| {
            if index < quotes.len() {
                Ok(index)
            } else {
                Err(StreamError::IndexOutOfBounds {
                    index,
                    len: quotes.len(),
                })
            }
        })
    }

    fn remove_where(
        &self,
        locate: impl FnOnce(&[Q]) -> StreamResult<usize>,
    ) -> StreamResult<Act> {
        let _gate = self.core.gate.lock();
        let position = {
            let mut st = self.core.state.write();
            st.ensure_writable()?;
            let position = locate(&st.quotes)?;
            st.quotes.remove(position);
            st.overflow_count = 0;
            position
        };
        debug!(position, "removed bar");
        self.core.notify(Change::Removed(position));
        Ok(Act::Remove)
    }

    /// Remove every bar at or after `from`. Returns how many were removed.
    ///
    /// Subscribers see a single `Removed` at the first removed position.
    pub fn remove_range(&self, from: Timestamp) -> StreamResult<usize> {
        let _gate = self.core.gate.lock();
        let (position, removed) = {
            let mut st = self.core.state.write();
            st.ensure_writable()?;
            let position = index_gte(&st.quotes, from);
            let removed = st.quotes.len() - position;
            st.quotes.truncate(position);
            if removed > 0 {
                st.overflow_count = 0;
            }
            (position, removed)
        };
        if removed > 0 {
            debug!(position, removed, "removed range");
            self.core.notify(Change::Removed(position));
        }
        Ok(removed)
    }

    /// Stop the stream. Idempotent.
    ///
    /// Subscribers receive `Closed` once and are then detached. Further
    /// mutations fail with [`StreamError::Closed`].
    pub fn close(&self) {
        let _gate = self.core.gate.lock();
        {
            let mut st = self.core.state.write();
            if st.closed {
                return;
            }
            st.closed = true;
        }
        self.core.notify(Change::Closed);
        self.core.subscribers.lock().clear();
        info!("provider closed");
    }

    /// Clear a fault raised by the resend guard.
    pub fn reset_fault(&self) {
        let mut st = self.core.state.write();
        st.faulted = false;
        st.overflow_count = 0;
        info!("provider fault reset");
    }

    pub fn is_closed(&self) -> bool {
        self.core.state.read().closed
    }

    pub fn is_faulted(&self) -> bool {
        self.core.state.read().faulted
    }

    /// Consecutive identical resends seen since the last real change.
    pub fn overflow_count(&self) -> u32 {
        self.core.state.read().overflow_count
    }

    pub fn settings(&self) -> StreamSettings {
        self.core.state.read().settings
    }

    pub fn len(&self) -> usize {
        self.core.state.read().quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current bars.
    pub fn quotes(&self) -> Vec<Q> {
        self.core.state.read().quotes.clone()
    }

    pub fn get(&self, index: usize) -> Option<Q> {
        self.core.state.read().quotes.get(index).cloned()
    }

    pub fn last(&self) -> Option<Q> {
        self.core.state.read().quotes.last().cloned()
    }

    /// Position of the bar with this timestamp.
    pub fn index_of(&self, timestamp: Timestamp) -> Option<usize> {
        index_of(&self.core.state.read().quotes, timestamp)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.lock().len()
    }

    pub(crate) fn as_observable(&self) -> Arc<dyn Observable<Q>> {
        self.core.clone()
    }
}

impl<Q: StreamItem> Default for QuoteProvider<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: StreamItem> std::fmt::Debug for QuoteProvider<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.core.state.read();
        f.debug_struct("QuoteProvider")
            .field("quotes", &st.quotes.len())
            .field("closed", &st.closed)
            .field("faulted", &st.faulted)
            .finish()
    }
}

impl<Q: StreamItem> ProviderCore<Q> {
    /// Deliver a change to every live subscriber, outside the state lock.
    fn notify(&self, change: Change) {
        let targets = self.subscribers.lock().live();
        for target in targets {
            target.on_change(change);
        }
    }

    /// Drop the oldest bars beyond the cache limit.
    ///
    /// Subscribers are told first and can still read the outgoing bars while
    /// they handle the notice.
    fn prune(&self) {
        let excess = self.state.read().excess();
        if excess == 0 {
            return;
        }
        self.notify(Change::Pruned(excess));
        self.state.write().quotes.drain(..excess);
        debug!(pruned = excess, "pruned oldest bars");
    }
}

impl<Q: StreamItem> Observable<Q> for ProviderCore<Q> {
    fn subscribe(
        &self,
        observer: Weak<dyn Observer>,
        backlog: &mut dyn FnMut(&[Q]),
    ) -> StreamResult<SubscriberId> {
        let _gate = self.gate.lock();
        let st = self.state.read();
        if st.closed {
            return Err(StreamError::Closed);
        }
        backlog(&st.quotes);
        Ok(self.subscribers.lock().add(observer))
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(id)
    }

    fn read_items(&self, reader: &mut dyn FnMut(&[Q])) {
        reader(&self.state.read().quotes);
    }

    fn item_count(&self) -> usize {
        self.state.read().quotes.len()
    }

    fn label(&self) -> String {
        format!("QUOTES({})", self.state.read().quotes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::testing::{day, make_bars, Recorder};

    const DEFAULT_THRESHOLD: u32 = crate::config::DEFAULT_OVERFLOW_THRESHOLD;

    fn recorded(provider: &QuoteProvider<Bar>) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn Observer> = recorder.clone();
        provider
            .as_observable()
            .subscribe(Arc::downgrade(&observer), &mut |_| {})
            .unwrap();
        recorder
    }

    // ── Append ──

    #[test]
    fn append_notifies_tail_position() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        for bar in make_bars(&[1.0, 2.0, 3.0]) {
            assert_eq!(provider.append(bar).unwrap(), Act::Add);
        }
        assert_eq!(
            rec.changes(),
            vec![Change::Added(0), Change::Added(1), Change::Added(2)]
        );
        assert_eq!(provider.len(), 3);
    }

    #[test]
    fn identical_resend_does_nothing() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        let bars = make_bars(&[1.0, 2.0]);
        provider.append(bars[0]).unwrap();
        provider.append(bars[1]).unwrap();
        assert_eq!(provider.append(bars[1]).unwrap(), Act::DoNothing);
        assert_eq!(rec.changes().len(), 2);
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn identical_resend_with_nan_field_does_nothing() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        let mut bar = make_bars(&[1.0])[0];
        bar.volume = f64::NAN;
        assert_eq!(provider.append(bar).unwrap(), Act::Add);
        assert_eq!(provider.append(bar).unwrap(), Act::DoNothing);
        assert_eq!(rec.changes(), vec![Change::Added(0)]);
        assert_eq!(provider.overflow_count(), 1);
    }

    #[test]
    fn different_bar_at_last_timestamp_updates() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        let bars = make_bars(&[1.0, 2.0]);
        provider.add_batch(bars.clone()).unwrap();
        let mut revised = bars[1];
        revised.close = 9.0;
        assert_eq!(provider.append(revised).unwrap(), Act::Update);
        assert_eq!(provider.last().unwrap().close, 9.0);
        assert_eq!(rec.changes().last(), Some(&Change::Changed(1)));
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let provider = QuoteProvider::new();
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        provider.append(bars[2]).unwrap();
        let err = provider.append(bars[0]).unwrap_err();
        assert_eq!(
            err,
            StreamError::OutOfOrder {
                timestamp: day(0),
                last: day(2)
            }
        );
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn add_batch_sorts_first() {
        let provider = QuoteProvider::new();
        let mut bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        bars.reverse();
        assert_eq!(provider.add_batch(bars).unwrap(), 4);
        assert_eq!(provider.quotes(), make_bars(&[1.0, 2.0, 3.0, 4.0]));
    }

    // ── Insert / remove ──

    #[test]
    fn insert_places_late_bar_chronologically() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        for (i, bar) in bars.iter().enumerate() {
            if i != 1 {
                provider.append(*bar).unwrap();
            }
        }
        assert_eq!(provider.insert(bars[1]).unwrap(), Act::Insert);
        assert_eq!(provider.quotes(), bars);
        assert_eq!(rec.changes().last(), Some(&Change::Inserted(1)));

        let mut tail = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0])[4];
        assert_eq!(provider.insert(tail).unwrap(), Act::Add);
        tail.close = 7.0;
        assert_eq!(provider.insert(tail).unwrap(), Act::Update);
        assert_eq!(provider.insert(tail).unwrap(), Act::DoNothing);
    }

    #[test]
    fn remove_by_timestamp_and_index() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        provider.add_batch(bars.clone()).unwrap();

        assert_eq!(provider.remove(&bars[2]).unwrap(), Act::Remove);
        assert_eq!(rec.changes().last(), Some(&Change::Removed(2)));
        assert_eq!(
            provider.remove(&bars[2]).unwrap_err(),
            StreamError::NotFound(day(2))
        );

        provider.remove_at(0).unwrap();
        assert_eq!(rec.changes().last(), Some(&Change::Removed(0)));
        assert_eq!(
            provider.remove_at(5).unwrap_err(),
            StreamError::IndexOutOfBounds { index: 5, len: 2 }
        );
        assert_eq!(provider.quotes(), vec![bars[1], bars[3]]);
    }

    #[test]
    fn remove_range_truncates_with_one_notification() {
        let provider = QuoteProvider::new();
        provider
            .add_batch(make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        let rec = recorded(&provider);
        assert_eq!(provider.remove_range(day(2)).unwrap(), 3);
        assert_eq!(rec.changes(), vec![Change::Removed(2)]);
        assert_eq!(provider.remove_range(day(10)).unwrap(), 0);
        assert_eq!(rec.changes().len(), 1);
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn remove_range_resets_resend_count() {
        let provider = QuoteProvider::new();
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        provider.add_batch(bars.clone()).unwrap();
        provider.append(bars[2]).unwrap();
        provider.append(bars[2]).unwrap();
        assert_eq!(provider.overflow_count(), 2);
        assert_eq!(provider.remove_range(day(5)).unwrap(), 0);
        assert_eq!(provider.overflow_count(), 2);
        assert_eq!(provider.remove_range(day(1)).unwrap(), 2);
        assert_eq!(provider.overflow_count(), 0);
    }

    // ── Lifecycle ──

    #[test]
    fn close_is_idempotent_and_blocks_mutation() {
        let provider = QuoteProvider::new();
        let rec = recorded(&provider);
        provider.close();
        provider.close();
        assert_eq!(rec.changes(), vec![Change::Closed]);
        assert_eq!(provider.subscriber_count(), 0);
        let bar = make_bars(&[1.0])[0];
        assert_eq!(provider.append(bar).unwrap_err(), StreamError::Closed);
        assert_eq!(provider.insert(bar).unwrap_err(), StreamError::Closed);
        assert!(provider.is_closed());
    }

    #[test]
    fn subscribing_to_closed_provider_fails() {
        let provider = QuoteProvider::<Bar>::new();
        provider.close();
        let observer: Arc<dyn Observer> = Arc::new(Recorder::default());
        let err = provider
            .as_observable()
            .subscribe(Arc::downgrade(&observer), &mut |_| {})
            .unwrap_err();
        assert_eq!(err, StreamError::Closed);
    }

    #[test]
    fn resend_guard_faults_past_threshold() {
        let provider = QuoteProvider::new();
        let bar = make_bars(&[1.0])[0];
        provider.append(bar).unwrap();
        for _ in 0..DEFAULT_THRESHOLD {
            assert_eq!(provider.append(bar).unwrap(), Act::DoNothing);
        }
        assert_eq!(provider.overflow_count(), DEFAULT_THRESHOLD);
        assert!(!provider.is_faulted());
        assert_eq!(
            provider.append(bar).unwrap_err(),
            StreamError::Overflow {
                threshold: DEFAULT_THRESHOLD
            }
        );
        assert!(provider.is_faulted());
        let next = make_bars(&[1.0, 2.0])[1];
        assert_eq!(provider.append(next).unwrap_err(), StreamError::Faulted);

        provider.reset_fault();
        assert_eq!(provider.append(next).unwrap(), Act::Add);
    }

    #[test]
    fn cache_limit_prunes_oldest() {
        let provider = QuoteProvider::with_settings(
            StreamSettings::with_max_cache_size(3).unwrap(),
        )
        .unwrap();
        let rec = recorded(&provider);
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        provider.add_batch(bars.clone()).unwrap();
        assert_eq!(provider.quotes(), bars[2..].to_vec());
        assert_eq!(
            rec.changes()[3..],
            [Change::Added(3), Change::Pruned(1), Change::Added(3), Change::Pruned(1)]
        );
    }

    #[test]
    fn from_quotes_validates_order() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        let provider = QuoteProvider::from_quotes(bars.clone(), StreamSettings::default()).unwrap();
        assert_eq!(provider.len(), 3);

        bars.swap(0, 2);
        let err = QuoteProvider::from_quotes(bars.clone(), StreamSettings::default()).unwrap_err();
        assert!(matches!(err, StreamError::OutOfOrder { .. }));

        bars[1].timestamp = bars[0].timestamp;
        let err = QuoteProvider::from_quotes(bars, StreamSettings::default()).unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }
}
