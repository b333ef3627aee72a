// =============================================================================
// Event envelope — adapter -> InboundQueue
// =============================================================================
//
// Events are immutable once constructed. Whatever feed adapter is wired in
// (the synthetic stand-in here, a real broker feed in production) is the
// sole producer; the Engine is the sole consumer.
// =============================================================================

use crate::types::MdMode;

/// A single normalized event emitted by the feed adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status {
        connected: bool,
        md_mode: MdMode,
        reason: Option<String>,
        mono_ns: u64,
        unix_ms: u64,
    },
    Quote {
        bid: Option<f64>,
        ask: Option<f64>,
        last: Option<f64>,
        bid_size: Option<u64>,
        ask_size: Option<u64>,
        ts_recv_mono_ns: u64,
        ts_recv_unix_ms: u64,
        ts_exch_unix_ms: Option<u64>,
    },
    AdapterError {
        code: i32,
        message: String,
        mono_ns: u64,
        unix_ms: u64,
    },
}

impl Event {
    /// The monotonic instant this event was produced, used to update
    /// `last_any_event_mono_ns` regardless of event kind.
    pub fn mono_ns(&self) -> u64 {
        match self {
            Event::Status { mono_ns, .. } => *mono_ns,
            Event::Quote {
                ts_recv_mono_ns, ..
            } => *ts_recv_mono_ns,
            Event::AdapterError { mono_ns, .. } => *mono_ns,
        }
    }
}
