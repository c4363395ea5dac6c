//! Reactive layer — change bus and live query streams.
//!
//! [`bus`] is the publish/subscribe fabric writes notify through;
//! [`live`] turns a prepared read into a stream that re-executes whenever
//! a matching change is published.

pub mod bus;
pub mod live;

pub use bus::{BusSubscription, ChangeBus};
pub use live::{LiveStream, OverflowPolicy};
