//! Bounded event queue between native context and the scripting thread.
//!
//! Producers hold a [`BridgeSender`] and may post from any thread, inside or
//! outside an async runtime. Posting never blocks: when the queue is full the
//! new message is dropped, counted and reported to the caller. The single
//! consumer holds the [`EventQueue`] and pops messages in FIFO order.

use super::message::BridgeMessage;
use crate::script::{ScriptError, ScriptRuntime, StatusCode};
use log::{debug, error, warn};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Largest queue a context may be configured with.
pub const MAX_QUEUE_CAPACITY: usize = 4096;

/// Errors returned when posting to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The queue is at capacity; the message was dropped.
    QueueFull { capacity: usize },
    /// The consumer has shut down.
    Closed,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { capacity } => {
                write!(f, "bridge queue full ({} messages), message dropped", capacity)
            }
            Self::Closed => write!(f, "bridge queue closed"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl StatusCode for BridgeError {
    fn code(&self) -> i32 {
        match self {
            Self::QueueFull { .. } => 3,
            Self::Closed => -1,
        }
    }
}

/// Counters shared by all ends of one queue.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Messages accepted into the queue.
    pub posted: AtomicUsize,
    /// Messages dropped because the queue was full.
    pub dropped: AtomicUsize,
}

impl BridgeStats {
    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer handle. Cheap to clone and safe to move to any thread.
#[derive(Clone)]
pub struct BridgeSender {
    tx: mpsc::Sender<BridgeMessage>,
    stats: Arc<BridgeStats>,
    capacity: usize,
}

impl BridgeSender {
    /// Post a message without blocking.
    pub fn post(&self, message: BridgeMessage) -> Result<(), BridgeError> {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.stats.posted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(message)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "bridge queue full ({}), dropping {}",
                    self.capacity,
                    message.kind()
                );
                Err(BridgeError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(message)) => {
                debug!("bridge closed, discarding {}", message.kind());
                Err(BridgeError::Closed)
            }
        }
    }

    /// Post a closure to run on the scripting thread.
    pub fn post_call<F>(&self, name: &'static str, handler: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut dyn ScriptRuntime) -> Result<(), ScriptError> + Send + 'static,
    {
        self.post(BridgeMessage::call(name, handler))
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for BridgeSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSender")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Consumer end, owned by the scripting thread.
pub struct EventQueue {
    rx: mpsc::Receiver<BridgeMessage>,
    stats: Arc<BridgeStats>,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` messages, clamped to
    /// `1..=MAX_QUEUE_CAPACITY`.
    pub fn bounded(capacity: usize) -> (BridgeSender, EventQueue) {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(BridgeStats::default());
        let sender = BridgeSender {
            tx,
            stats: stats.clone(),
            capacity,
        };
        let queue = EventQueue {
            rx,
            stats,
            capacity,
        };
        (sender, queue)
    }

    /// Pop the next message if one is waiting.
    pub fn try_next(&mut self) -> Option<BridgeMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next message. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.rx.recv().await
    }

    /// Block the current thread until the next message arrives.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<BridgeMessage> {
        self.rx.blocking_recv()
    }

    /// Pop and dispatch the messages waiting on entry.
    ///
    /// Anything posted during the pass is left for the next one.
    pub fn drain<D: Dispatch + ?Sized>(&mut self, target: &mut D) -> DrainReport {
        let mut report = DrainReport::default();
        for _ in 0..self.len() {
            let Some(message) = self.try_next() else {
                break;
            };
            report.record(dispatch_isolated(target, message));
        }
        report
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }
}

/// Consumer-side handling of a single message.
pub trait Dispatch {
    fn dispatch(&mut self, message: BridgeMessage) -> Result<(), ScriptError>;
}

/// Outcome of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Ok,
    Failed,
}

/// Dispatch one message, containing handler errors and panics.
///
/// A failing handler is logged and reported as [`Handled::Failed`]; the queue
/// itself is never touched, so the caller can keep draining.
pub fn dispatch_isolated<D: Dispatch + ?Sized>(target: &mut D, message: BridgeMessage) -> Handled {
    let kind = message.kind();
    match catch_unwind(AssertUnwindSafe(|| target.dispatch(message))) {
        Ok(Ok(())) => Handled::Ok,
        Ok(Err(e)) => {
            error!("bridge handler for {} failed: {}", kind, e);
            Handled::Failed
        }
        Err(panic_info) => {
            error!(
                "bridge handler for {} panicked: {}",
                kind,
                extract_panic_message(&panic_info)
            );
            Handled::Failed
        }
    }
}

/// Extract a human-readable message from panic payload.
fn extract_panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Counts from a drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages whose handler completed.
    pub dispatched: usize,
    /// Messages whose handler returned an error or panicked.
    pub failed: usize,
}

impl DrainReport {
    pub fn record(&mut self, handled: Handled) {
        match handled {
            Handled::Ok => self.dispatched += 1,
            Handled::Failed => self.failed += 1,
        }
    }

    /// Total messages taken off the queue.
    pub fn total(&self) -> usize {
        self.dispatched + self.failed
    }
}

impl std::ops::AddAssign for DrainReport {
    fn add_assign(&mut self, other: Self) {
        self.dispatched += other.dispatched;
        self.failed += other.failed;
    }
}
