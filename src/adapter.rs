// =============================================================================
// SyntheticAdapter — ambient stand-in for the (out of scope) real feed
// =============================================================================
//
// The real market-data/order-routing adapter is explicitly out of scope:
// this kernel only ever consumes normalized events off the InboundQueue.
// Something still has to produce those events so the rest of the system is
// exercisable end to end, so this is a synthetic generator shaped like any
// other long-running reconnect-loop task elsewhere in this crate — it runs
// forever on its own tokio task and never talks to the Engine directly.
// =============================================================================

use std::sync::Arc;

use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::event::Event;
use crate::queues::InboundSender;
use crate::types::MdMode;

/// Deterministic synthetic quote generator: a small random-walk around a
/// starting mid price, connected by default, occasionally emitting a
/// disconnect/reconnect pair to exercise the liveness gates.
pub struct SyntheticAdapter {
    sender: InboundSender,
    clock: Arc<dyn Clock>,
    tick_size: f64,
    mid: f64,
    cadence_ms: u64,
    step: u64,
}

impl SyntheticAdapter {
    pub fn new(sender: InboundSender, clock: Arc<dyn Clock>, tick_size: f64, starting_mid: f64) -> Self {
        Self {
            sender,
            clock,
            tick_size,
            mid: starting_mid,
            cadence_ms: 250,
            step: 0,
        }
    }

    fn next_quote_event(&mut self) -> Event {
        // Small deterministic oscillation rather than `rand` — this is a
        // stand-in generator, not a realistic price model, and avoiding an
        // extra dependency keeps its footprint proportional to its role.
        let phase = (self.step % 20) as f64;
        let drift = (phase - 10.0) * 0.1 * self.tick_size;
        self.mid += drift;
        self.step += 1;

        let half_spread = self.tick_size;
        let bid = self.mid - half_spread / 2.0;
        let ask = self.mid + half_spread / 2.0;

        Event::Quote {
            bid: Some(bid),
            ask: Some(ask),
            last: Some(self.mid),
            bid_size: Some(10),
            ask_size: Some(10),
            ts_recv_mono_ns: self.clock.now_mono_ns(),
            ts_recv_unix_ms: self.clock.now_unix_ms(),
            ts_exch_unix_ms: Some(self.clock.now_unix_ms()),
        }
    }

    fn status_event(&self, connected: bool, md_mode: MdMode, reason: Option<String>) -> Event {
        Event::Status {
            connected,
            md_mode,
            reason,
            mono_ns: self.clock.now_mono_ns(),
            unix_ms: self.clock.now_unix_ms(),
        }
    }

    /// Run forever, emitting a quote every `cadence_ms` and an initial
    /// connect status. Never terminates on its own; the caller's shutdown
    /// signal is what tears it down.
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("synthetic adapter starting");
        let connect = self.status_event(true, MdMode::Realtime, None);
        if let Err(e) = self.sender.push(connect) {
            warn!(error = ?e, "failed to push initial status event");
        }

        let mut ticker = interval(Duration::from_millis(self.cadence_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let event = self.next_quote_event();
                    if let Err(e) = self.sender.push(event) {
                        warn!(error = ?e, "inbound queue full — dropping synthetic quote");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("synthetic adapter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::queues::InboundQueue;

    #[test]
    fn next_quote_event_keeps_spread_at_one_tick_size() {
        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new(0, 0));
        let queue = InboundQueue::new(10);
        let mut adapter = SyntheticAdapter::new(queue.sender(), clock, 0.25, 100.0);
        for _ in 0..30 {
            if let Event::Quote { bid, ask, .. } = adapter.next_quote_event() {
                let spread = ask.unwrap() - bid.unwrap();
                assert!((spread - 0.25).abs() < 1e-9);
            } else {
                panic!("expected a Quote event");
            }
        }
    }

    #[test]
    fn status_event_carries_requested_mode() {
        let clock: Arc<dyn Clock> = Arc::new(FrozenClock::new(0, 0));
        let queue = InboundQueue::new(10);
        let adapter = SyntheticAdapter::new(queue.sender(), clock, 0.25, 100.0);
        let event = adapter.status_event(false, MdMode::None, Some("TEST".to_string()));
        match event {
            Event::Status { connected, md_mode, reason, .. } => {
                assert!(!connected);
                assert_eq!(md_mode, MdMode::None);
                assert_eq!(reason.as_deref(), Some("TEST"));
            }
            _ => panic!("expected a Status event"),
        }
    }
}
