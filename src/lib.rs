pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod pdu;
pub mod signal;
pub mod sink;
pub mod store;

// Re-export the pieces most callers need
pub use config::{ChannelSpec, SinkConfig};
pub use error::{Result, SinkError};
pub use event::{Event, EventId, SampleTime, Tag};
pub use signal::{Outbound, OutboundPort};
pub use sink::dispatch::CongestionPolicy;
pub use sink::live_index::SearchStrategyKind;
pub use sink::pool::{EventHandler, FnHandler};
pub use sink::EventSink;
pub use store::{EarlyBehavior, MemoryEventStore, ReadyEventStore};
