//! Append-only incremental results without subscriptions.

use std::collections::VecDeque;

use crate::domain::{Series, Timestamp};
use crate::error::{StreamError, StreamResult};
use crate::formula::Formula;

/// Incremental container for one formula.
///
/// Each `add` runs one `step` over the trailing inputs, the same step a hub
/// runs on a tail append, so the results equal the batch computation over
/// everything added so far. Only the last `window()` inputs are retained.
#[derive(Debug, Clone)]
pub struct BufferList<I, F: Formula<I>> {
    formula: F,
    inputs: VecDeque<I>,
    state: F::State,
    results: VecDeque<F::Output>,
    last_timestamp: Option<Timestamp>,
    max_size: Option<usize>,
}

impl<I: Series + Clone, F: Formula<I>> BufferList<I, F> {
    pub fn new(formula: F) -> Self {
        Self {
            formula,
            inputs: VecDeque::new(),
            state: F::State::default(),
            results: VecDeque::new(),
            last_timestamp: None,
            max_size: None,
        }
    }

    /// Keep at most `max_size` results; the oldest are dropped first.
    pub fn with_max_size(formula: F, max_size: usize) -> StreamResult<Self> {
        if max_size == 0 {
            return Err(StreamError::out_of_range("max_size", "must be at least 1, got 0"));
        }
        let mut buffer = Self::new(formula);
        buffer.max_size = Some(max_size);
        Ok(buffer)
    }

    pub fn from_items(formula: F, items: impl IntoIterator<Item = I>) -> StreamResult<Self> {
        let mut buffer = Self::new(formula);
        buffer.add_batch(items)?;
        Ok(buffer)
    }

    /// Add the next item; its timestamp must be newer than the last one.
    pub fn add(&mut self, item: I) -> StreamResult<()> {
        self.check_next(self.last_timestamp, item.timestamp())?;
        self.push(item);
        Ok(())
    }

    /// Add several items in order.
    ///
    /// The whole batch is checked first; on error nothing is added.
    pub fn add_batch(&mut self, items: impl IntoIterator<Item = I>) -> StreamResult<usize> {
        let items: Vec<I> = items.into_iter().collect();
        let mut last = self.last_timestamp;
        for item in &items {
            self.check_next(last, item.timestamp())?;
            last = Some(item.timestamp());
        }
        let count = items.len();
        for item in items {
            self.push(item);
        }
        Ok(count)
    }

    /// Drop every input, result and carried state.
    pub fn clear(&mut self) {
        self.inputs.clear();
        self.results.clear();
        self.state = F::State::default();
        self.last_timestamp = None;
    }

    fn check_next(&self, last: Option<Timestamp>, timestamp: Timestamp) -> StreamResult<()> {
        match last {
            Some(last) if timestamp <= last => Err(StreamError::OutOfOrder { timestamp, last }),
            _ => Ok(()),
        }
    }

    fn push(&mut self, item: I) {
        self.last_timestamp = Some(item.timestamp());
        self.inputs.push_back(item);
        while self.inputs.len() > self.formula.window().max(1) {
            self.inputs.pop_front();
        }
        let (result, state) = self.formula.step(self.inputs.make_contiguous(), &self.state);
        self.state = state;
        self.results.push_back(result);
        if let Some(max) = self.max_size {
            while self.results.len() > max {
                self.results.pop_front();
            }
        }
    }

    pub fn results(&self) -> Vec<F::Output> {
        self.results.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &F::Output> {
        self.results.iter()
    }

    pub fn get(&self, index: usize) -> Option<&F::Output> {
        self.results.get(index)
    }

    pub fn last(&self) -> Option<&F::Output> {
        self.results.back()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn formula(&self) -> &F {
        &self.formula
    }

    pub fn label(&self) -> String {
        self.formula.label()
    }
}
