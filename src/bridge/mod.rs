//! Cross-thread bridge from native callbacks to the scripting thread.
//!
//! Native code never touches scripting state directly. It posts a
//! [`BridgeMessage`] through a [`BridgeSender`]; the scripting thread drains
//! the [`EventQueue`] and dispatches each message in order.

mod message;
mod queue;

pub use message::{BridgeMessage, CallHandler};
pub use queue::{
    dispatch_isolated, BridgeError, BridgeSender, BridgeStats, Dispatch, DrainReport, EventQueue,
    Handled, DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY,
};
