//! Push-based computation graph.
//!
//! A `QuoteProvider` owns the bar sequence. Each mutation is applied, then
//! delivered synchronously to every subscribed `Hub` as a `Change`. A hub
//! updates its own results and, when something is attached to it, forwards the
//! same `Change` downstream. The mutating call returns only after the whole
//! dependent graph has settled.
//!
//! Ownership runs one way: a hub holds a strong reference to its upstream, an
//! upstream holds only weak handles to its subscribers. There are no cycles.
//!
//! An `Aggregator` sits in the same graph: it subscribes like a hub and
//! serves fixed-period bars like a provider.

pub mod aggregator;
pub mod chain;
pub mod change;
pub mod hub;
pub mod observer;
pub mod provider;
pub mod search;

pub use aggregator::{aggregate, Aggregator, PeriodSize};
pub use chain::ChainProvider;
pub use change::{Act, Change};
pub use hub::{Hub, HubStatus};
pub use observer::{Observable, Observer, SubscriberId, SubscriberList};
pub use provider::QuoteProvider;
