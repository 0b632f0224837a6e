//! Progress/log events and cooperative cancellation
//!
//! The organizer never blocks on its caller: events go through an unbounded
//! crossbeam channel, and a dropped receiver just silences them.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Aggregate counts of a finished or cancelled run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub moved: usize,
    pub duplicates: usize,
    pub already_there: usize,
    pub errors: usize,
}

impl RunSummary {
    /// Everything that was not moved
    pub fn skipped(&self) -> usize {
        self.duplicates + self.already_there + self.errors
    }
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizerEvent {
    /// Human-readable log line
    Log(String),
    /// Percent complete, 0..=100; non-decreasing within a run except the reset to 0 on cancel
    Progress(u8),
    /// Number of media files found by the scan
    TotalFiles(usize),
    /// Run finished normally
    Completed(RunSummary),
    /// Run stopped by cancellation
    Cancelled(RunSummary),
}

/// Sending half, cloned into workers
#[derive(Clone)]
pub struct EventSender {
    inner: Option<Sender<OrganizerEvent>>,
}

impl EventSender {
    /// A sender that drops every event
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn send(&self, event: OrganizerEvent) {
        if let Some(sender) = &self.inner {
            // Receiver gone means nobody is listening
            let _ = sender.send(event);
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(OrganizerEvent::Log(message.into()));
    }

    pub fn progress(&self, percent: u8) {
        self.send(OrganizerEvent::Progress(percent.min(100)));
    }
}

/// Receiving half, held by the UI or CLI
pub struct EventReceiver {
    inner: Receiver<OrganizerEvent>,
}

impl EventReceiver {
    /// Events until every sender is gone
    pub fn iter(&self) -> impl Iterator<Item = OrganizerEvent> + '_ {
        self.inner.iter()
    }
}

/// Event channel constructor
pub struct EventChannel;

impl EventChannel {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender {
                inner: Some(sender),
            },
            EventReceiver { inner: receiver },
        )
    }

    /// Channel holding at most `cap` undelivered events; senders wait for the receiver
    ///
    /// With `cap == 0` every event is a rendezvous, so the organizer cannot
    /// run ahead of the caller.
    pub fn bounded(cap: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = crossbeam_channel::bounded(cap);
        (
            EventSender {
                inner: Some(sender),
            },
            EventReceiver { inner: receiver },
        )
    }
}

/// Cancellation flag for one run: set once, read many times
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
