//! Distributed crawling over a message broker.
//!
//! Replaces the in-process frontier with two broker topics: a single
//! [`Coordinator`] publishes seeds and newly discovered URLs to `tasks`
//! and owns the global visited set and budget, while any number of
//! [`CrawlWorker`]s consume tasks and publish [`messages::ResultMessage`]s.
//! Delivery is at-least-once; the coordinator's visited set provides
//! idempotence, and un-acked tasks are redelivered after the broker's
//! visibility timeout.

mod broker;
mod coordinator;
pub mod messages;
mod worker;

pub use broker::{Broker, Delivery, InMemoryBroker, Topic};
pub use coordinator::Coordinator;
pub use worker::CrawlWorker;
