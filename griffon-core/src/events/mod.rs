//! Plugin log events and their distribution

mod broadcaster;
mod ring;
mod types;

pub use broadcaster::{LogBroadcaster, LogSubscription};
pub use ring::{DEFAULT_HISTORY_CAPACITY, EventRing};
pub use types::{CommandReply, EventSeq, Lifecycle, LogEvent, LogPayload};
