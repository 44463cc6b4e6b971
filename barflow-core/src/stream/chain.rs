//! Chain capability: anything a hub can be attached to.

use std::sync::Arc;

use crate::domain::{Reusable, StreamItem};
use crate::error::StreamResult;
use crate::formula::Formula;

use super::hub::Hub;
use super::observer::Observable;
use super::provider::QuoteProvider;

/// A source that hubs can subscribe to.
///
/// Implemented by `QuoteProvider` and by every `Hub` whose results expose a
/// reusable value, so hubs compose into chains and fan out without limit.
pub trait ChainProvider<T: StreamItem> {
    /// The observable face subscribed hubs hold on to.
    fn observable(&self) -> Arc<dyn Observable<T>>;

    /// Subscribe a new hub running `formula` over this source.
    ///
    /// The formula was validated when it was built; the hub computes the
    /// existing backlog before this returns.
    fn attach<F: Formula<T>>(&self, formula: F) -> StreamResult<Hub<T, F>>
    where
        Self: Sized,
    {
        Hub::subscribe_to(self.observable(), formula)
    }
}

impl<Q: StreamItem> ChainProvider<Q> for QuoteProvider<Q> {
    fn observable(&self) -> Arc<dyn Observable<Q>> {
        self.as_observable()
    }
}

impl<I: StreamItem, F> ChainProvider<F::Output> for Hub<I, F>
where
    F: Formula<I>,
    F::Output: Reusable,
{
    fn observable(&self) -> Arc<dyn Observable<F::Output>> {
        self.as_observable()
    }
}
