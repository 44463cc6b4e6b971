//! Hub: a subscriber whose results track a fresh batch computation.
//!
//! A hub caches one result and one carried state per upstream position.
//! Tail appends extend both with a single `step`. Any change that touches an
//! earlier position truncates both caches to that position and re-runs `step`
//! from the state just before it, so the suffix is recomputed exactly as the
//! batch fold would compute it.
//!
//! When the upstream prunes its oldest items the hub keeps the state carried
//! into its new first position and the last `window() - 1` outgoing items.
//! Rebuilds that reach the head of the cache read those instead of
//! restarting warm-up, so results stay equal to the fold over the full history.

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::domain::{StreamItem, Timestamp};
use crate::error::{StreamError, StreamResult};
use crate::formula::{trailing, Formula};

use super::change::Change;
use super::observer::{Observable, Observer, SubscriberId, SubscriberList};
use super::search::index_gte;

/// Lifecycle of a hub.
///
/// `Subscribed` only lasts for the initial compute. `Closed` and
/// `Unsubscribed` are terminal: results stay frozen at their last value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubStatus {
    Subscribed,
    Active,
    Closed,
    Unsubscribed,
}

/// Cloneable handle to one subscribed indicator.
pub struct Hub<I, F: Formula<I>> {
    core: Arc<HubCore<I, F>>,
}

impl<I, F: Formula<I>> Clone for Hub<I, F> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

pub(crate) struct HubCore<I, F: Formula<I>> {
    formula: F,
    upstream: Arc<dyn Observable<I>>,
    subscription: Mutex<Option<SubscriberId>>,
    cache: RwLock<HubCache<I, F::Output, F::State>>,
    subscribers: Mutex<SubscriberList>,
}

struct HubCache<I, R, S> {
    results: Vec<R>,
    states: Vec<S>,
    /// State carried into position 0; the default until the upstream prunes.
    base: S,
    /// Up to `window() - 1` pruned upstream items that preceded position 0.
    head: Vec<I>,
    status: HubStatus,
}

impl<I, R, S: Default> HubCache<I, R, S> {
    fn clear(&mut self) {
        self.results.clear();
        self.states.clear();
        self.base = S::default();
        self.head.clear();
    }
}

/// Trailing window ending at `index`, reaching back into `head` when the
/// current items are too few.
fn window_at<'a, I: Clone>(head: &[I], items: &'a [I], index: usize, window: usize) -> Cow<'a, [I]> {
    let window = window.max(1);
    let slice = trailing(items, index, window);
    let missing = window - slice.len();
    if missing == 0 || head.is_empty() {
        return Cow::Borrowed(slice);
    }
    let mut joined = head[head.len().saturating_sub(missing)..].to_vec();
    joined.extend_from_slice(slice);
    Cow::Owned(joined)
}

impl<I: StreamItem, F: Formula<I>> Hub<I, F> {
    /// Subscribe a new hub to `upstream` and compute its backlog.
    pub(crate) fn subscribe_to(upstream: Arc<dyn Observable<I>>, formula: F) -> StreamResult<Self> {
        let core = Arc::new(HubCore {
            formula,
            upstream,
            subscription: Mutex::new(None),
            cache: RwLock::new(HubCache {
                results: Vec::new(),
                states: Vec::new(),
                base: F::State::default(),
                head: Vec::new(),
                status: HubStatus::Subscribed,
            }),
            subscribers: Mutex::new(SubscriberList::new()),
        });
        let observer: Arc<dyn Observer> = core.clone();
        let weak: Weak<dyn Observer> = Arc::downgrade(&observer);
        let id = core.upstream.subscribe(weak, &mut |items| {
            let mut cache = core.cache.write();
            core.recompute(&mut cache, items, 0);
            cache.status = HubStatus::Active;
        })?;
        *core.subscription.lock() = Some(id);
        info!(
            label = %core.formula.label(),
            upstream = %core.upstream.label(),
            upstream_len = core.upstream.item_count(),
            "hub subscribed"
        );
        Ok(Self { core })
    }

    /// Recompute every result and notify downstream hubs with `Changed(0)`.
    ///
    /// State carried across a prune is kept; see [`reinitialize`](Self::reinitialize)
    /// for a reset that forgets it.
    pub fn rebuild(&self) -> StreamResult<()> {
        self.rebuild_at(0)
    }

    /// Recompute results from the first position at or after `timestamp`.
    pub fn rebuild_from(&self, timestamp: Timestamp) -> StreamResult<()> {
        let position = self.read(|results| index_gte(results, timestamp));
        self.rebuild_at(position)
    }

    /// Recompute results from `index` on and notify downstream hubs.
    pub fn rebuild_at(&self, index: usize) -> StreamResult<()> {
        self.ensure_live()?;
        let len = self.len();
        if index > len {
            return Err(StreamError::IndexOutOfBounds { index, len });
        }
        if let Some(change) = self.core.rebuild_suffix(Change::Changed(index), index) {
            self.core.notify(change);
        }
        Ok(())
    }

    /// Drop every cached result and carried state, including what was kept
    /// across prunes, and recompute from the upstream's current items.
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

    /// Detach from the upstream. Idempotent.
    ///
    /// Results are frozen. Hubs attached to this one keep their own results
    /// and receive no further changes.
    pub fn unsubscribe(&self) {
        if let Some(id) = self.core.subscription.lock().take() {
            self.core.upstream.unsubscribe(id);
        }
        let mut cache = self.core.cache.write();
        if matches!(cache.status, HubStatus::Subscribed | HubStatus::Active) {
            cache.status = HubStatus::Unsubscribed;
            info!(label = %self.core.formula.label(), "hub unsubscribed");
        }
    }

    pub fn status(&self) -> HubStatus {
        self.core.cache.read().status
    }

    pub fn formula(&self) -> &F {
        &self.core.formula
    }

    pub fn label(&self) -> String {
        self.core.formula.label()
    }

    /// Snapshot of the current results.
    pub fn results(&self) -> Vec<F::Output> {
        self.core.cache.read().results.clone()
    }

    /// Run `reader` over the results without copying them.
    pub fn read<T>(&self, reader: impl FnOnce(&[F::Output]) -> T) -> T {
        reader(&self.core.cache.read().results)
    }

    pub fn len(&self) -> usize {
        self.core.cache.read().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<F::Output> {
        self.core.cache.read().results.get(index).cloned()
    }

    pub fn last(&self) -> Option<F::Output> {
        self.core.cache.read().results.last().cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.lock().len()
    }

    pub(crate) fn as_observable(&self) -> Arc<dyn Observable<F::Output>> {
        self.core.clone()
    }
}

impl<I, F: Formula<I>> std::fmt::Debug for Hub<I, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.core.cache.read();
        f.debug_struct("Hub")
            .field("label", &self.core.formula.label())
            .field("results", &cache.results.len())
            .field("status", &cache.status)
            .finish()
    }
}

impl<I: StreamItem, F: Formula<I>> HubCore<I, F> {
    /// Truncate both caches to `from` and fold `step` over the rest of `items`.
    fn recompute(&self, cache: &mut HubCache<I, F::Output, F::State>, items: &[I], from: usize) {
        let from = from.min(items.len()).min(cache.results.len());
        cache.results.truncate(from);
        cache.states.truncate(from);
        let window = self.formula.window();
        let mut state = cache.states.last().unwrap_or(&cache.base).clone();
        for index in from..items.len() {
            let (result, next) = self
                .formula
                .step(&window_at(&cache.head, items, index, window), &state);
            cache.results.push(result);
            cache.states.push(next.clone());
            state = next;
        }
    }

    fn on_added(&self, position: usize) -> Option<Change> {
        let mut forward = None;
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if cache.status != HubStatus::Active {
                return;
            }
            let len = cache.results.len();
            if position == len && position < items.len() {
                let cache = &mut *cache;
                let window = window_at(&cache.head, items, position, self.formula.window());
                let prev = cache.states.last().unwrap_or(&cache.base);
                let (result, state) = self.formula.step(&window, prev);
                cache.results.push(result);
                cache.states.push(state);
                trace!(position, "hub appended");
                forward = Some(Change::Added(position));
            } else {
                // Out of step with the upstream; fall back to a suffix rebuild.
                let from = position.min(len);
                self.recompute(&mut cache, items, from);
                debug!(from, upstream_len = items.len(), "hub resynced");
                forward = Some(Change::Changed(from));
            }
        });
        forward
    }

    fn rebuild_suffix(&self, change: Change, position: usize) -> Option<Change> {
        let mut forward = None;
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if !matches!(cache.status, HubStatus::Active | HubStatus::Subscribed) {
                return;
            }
            let from = position.min(cache.results.len());
            self.recompute(&mut cache, items, from);
            debug!(
                from,
                upstream_len = items.len(),
                label = %self.formula.label(),
                "hub rebuilt"
            );
            forward = Some(change.at(from));
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
            cache.clear();
            self.recompute(&mut cache, items, 0);
            info!(
                label = %self.formula.label(),
                upstream_len = items.len(),
                "hub reinitialized"
            );
            forward = Some(Change::Changed(0));
        });
        forward
    }

    /// Carry the `count` outgoing positions into `base` and `head`.
    ///
    /// Runs while the upstream still holds the outgoing items. Returns how
    /// many results this hub will drop once its own subscribers have seen
    /// the notice.
    fn prepare_prune(&self, count: usize) -> Option<usize> {
        let mut prepared = None;
        self.upstream.read_items(&mut |items| {
            let mut cache = self.cache.write();
            if cache.status != HubStatus::Active {
                return;
            }
            let count = count.min(cache.results.len()).min(items.len());
            if count == 0 {
                return;
            }
            let cache = &mut *cache;
            let keep = self.formula.window().max(1) - 1;
            cache.head.extend_from_slice(&items[..count]);
            let excess = cache.head.len().saturating_sub(keep);
            cache.head.drain(..excess);
            cache.base = cache.states[count - 1].clone();
            prepared = Some(count);
        });
        prepared
    }

    fn finish_prune(&self, count: usize) {
        let mut cache = self.cache.write();
        let count = count.min(cache.results.len());
        cache.results.drain(..count);
        cache.states.drain(..count);
        debug!(pruned = count, label = %self.formula.label(), "hub pruned");
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

impl<I: StreamItem, F: Formula<I>> Observer for HubCore<I, F> {
    fn on_change(&self, change: Change) {
        let forward = match change {
            Change::Added(p) => self.on_added(p),
            Change::Pruned(count) => {
                // Downstream hubs read our outgoing results before we drop them.
                if let Some(count) = self.prepare_prune(count) {
                    self.notify(Change::Pruned(count));
                    self.finish_prune(count);
                }
                return;
            }
            Change::Closed => self.on_closed(),
            other => other
                .invalidates_from()
                .and_then(|p| self.rebuild_suffix(other, p)),
        };
        if let Some(change) = forward {
            self.notify(change);
            if change == Change::Closed {
                self.subscribers.lock().clear();
            }
        }
    }
}

impl<I: StreamItem, F: Formula<I>> Observable<F::Output> for HubCore<I, F> {
    fn subscribe(
        &self,
        observer: Weak<dyn Observer>,
        backlog: &mut dyn FnMut(&[F::Output]),
    ) -> StreamResult<SubscriberId> {
        let cache = self.cache.read();
        match cache.status {
            HubStatus::Closed => return Err(StreamError::Closed),
            HubStatus::Unsubscribed => return Err(StreamError::Unsubscribed),
            HubStatus::Subscribed | HubStatus::Active => {}
        }
        backlog(&cache.results);
        Ok(self.subscribers.lock().add(observer))
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(id)
    }

    fn read_items(&self, reader: &mut dyn FnMut(&[F::Output])) {
        reader(&self.cache.read().results);
    }

    fn item_count(&self) -> usize {
        self.cache.read().results.len()
    }

    fn label(&self) -> String {
        self.formula.label()
    }
}
