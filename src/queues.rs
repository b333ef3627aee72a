// =============================================================================
// InboundQueue & CommandQueue — bounded, multi-producer single-consumer FIFOs
// =============================================================================
//
// Both queues wrap `std::sync::mpsc::sync_channel`, which already gives
// bounded-capacity, non-blocking-push, FIFO-drain semantics; this module
// exposes that behind a small named vocabulary (`push`/`drain`) rather than
// leaking `try_send`/`try_recv`, the way shared collections elsewhere in
// this crate are wrapped behind named accessor methods instead of exposed
// directly.
// =============================================================================

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

use thiserror::Error;

use crate::command::Command;
use crate::event::Event;

/// Default bounded capacity for the InboundQueue.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1000;
/// Default bounded capacity for the CommandQueue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 100;
/// Anti-starvation ceiling the Engine applies to its own inbound drain.
pub const ENGINE_DRAIN_CEILING: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue has no consumer")]
    Disconnected,
}

/// Bounded, thread-safe FIFO of normalized events from the feed adapter to
/// the Engine. Producers: adapter thread(s). Consumer: the Engine thread.
pub struct InboundQueue {
    tx: SyncSender<Event>,
    rx: Receiver<Event>,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = sync_channel(capacity.max(1));
        Self { tx, rx }
    }

    /// A cloneable handle producers use to push events without owning the
    /// consumer side.
    pub fn sender(&self) -> InboundSender {
        InboundSender {
            tx: self.tx.clone(),
        }
    }

    /// Drain up to `max` events in FIFO order, non-blocking. `None` drains
    /// fully (bounded in practice by whatever is currently queued).
    pub fn drain(&self, max: Option<usize>) -> Vec<Event> {
        let limit = max.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        while out.len() < limit {
            match self.rx.try_recv() {
                Ok(event) => out.push(event),
                Err(_) => break,
            }
        }
        out
    }
}

/// Cloneable producer handle for [`InboundQueue`].
#[derive(Clone)]
pub struct InboundSender {
    tx: SyncSender<Event>,
}

impl InboundSender {
    /// Non-blocking push. On overflow the event is dropped; the caller
    /// (the adapter) is responsible for logging and for preferentially
    /// retaining status events under pressure — the queue itself is lossy.
    pub fn push(&self, event: Event) -> Result<(), QueueError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }
}

/// Bounded FIFO of user commands. Producer: the UI/command surface.
/// Consumer: the Engine, at cycle boundaries only.
pub struct CommandQueue {
    tx: SyncSender<Command>,
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = sync_channel(capacity.max(1));
        Self { tx, rx }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Drain all commands currently pending, non-blocking, in FIFO order.
    /// Commands that arrive after this call returns are deferred to the
    /// next cycle boundary.
    pub fn drain_all(&self) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            out.push(cmd);
        }
        out
    }
}

#[derive(Clone)]
pub struct CommandSender {
    tx: SyncSender<Command>,
}

impl CommandSender {
    pub fn push(&self, command: Command) -> Result<(), QueueError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::types::{Intent, MdMode};

    fn status_event(connected: bool) -> Event {
        Event::Status {
            connected,
            md_mode: MdMode::Realtime,
            reason: None,
            mono_ns: 0,
            unix_ms: 0,
        }
    }

    #[test]
    fn drain_preserves_fifo_order_of_successful_pushes() {
        let q = InboundQueue::new(10);
        let sender = q.sender();
        for i in 0..5u64 {
            sender
                .push(Event::AdapterError {
                    code: i as i32,
                    message: String::new(),
                    mono_ns: i,
                    unix_ms: i,
                })
                .unwrap();
        }
        let drained = q.drain(None);
        assert_eq!(drained.len(), 5);
        for (i, ev) in drained.iter().enumerate() {
            assert_eq!(ev.mono_ns(), i as u64);
        }
    }

    #[test]
    fn push_fails_with_full_when_capacity_exceeded() {
        let q = InboundQueue::new(2);
        let sender = q.sender();
        sender.push(status_event(true)).unwrap();
        sender.push(status_event(true)).unwrap();
        let err = sender.push(status_event(true)).unwrap_err();
        assert_eq!(err, QueueError::Full);
    }

    #[test]
    fn drain_with_max_caps_batch_size() {
        let q = InboundQueue::new(10);
        let sender = q.sender();
        for _ in 0..5 {
            sender.push(status_event(true)).unwrap();
        }
        let first = q.drain(Some(3));
        assert_eq!(first.len(), 3);
        let rest = q.drain(Some(10));
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn command_queue_drains_all_pending_in_order() {
        let q = CommandQueue::new(DEFAULT_COMMAND_CAPACITY);
        let sender = q.sender();
        sender
            .push(Command {
                id: 1,
                ts_unix_ms: 1,
                kind: CommandKind::SetIntent(Intent::Long),
            })
            .unwrap();
        sender
            .push(Command {
                id: 2,
                ts_unix_ms: 2,
                kind: CommandKind::SetArm(true),
            })
            .unwrap();
        let drained = q.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, 1);
        assert_eq!(drained[1].id, 2);
        // A second drain sees nothing new.
        assert!(q.drain_all().is_empty());
    }
}
