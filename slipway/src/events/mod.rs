//! Run lifecycle events and the sinks that receive them.
//!
//! The orchestrator and its stages emit [`RunEvent`]s through an injected
//! [`EventSink`]. There is no ambient global sink; callers pass the sink
//! they want.

mod event;
mod sink;

pub use event::RunEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
