//! # parley-receive
//!
//! Fans decrypted messages out to registered handlers.
//!
//! - [`ReceiveHandler`], [`HandlerKind`]: callbacks and whether they keep
//!   the receive loop alive
//! - [`HandlerRegistry`]: the strong and weak handler sets
//! - [`MessageSource`]: the blocking receive primitives
//! - [`ReceiveSession`]: continuous vs. synchronous receiving
//! - [`MemorySource`]: queue-fed source for tests and simulations

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod handler;
pub mod memory;
pub mod registry;
pub mod session;
pub mod source;

pub use backoff::ReconnectBackoff;
pub use errors::ReceiveError;
pub use handler::{HandlerKind, ReceiveHandler, SharedHandler, handler_fn};
pub use memory::{MemorySource, MemorySourceHandle};
pub use registry::HandlerRegistry;
pub use session::{ReceiveMode, ReceiveSession};
pub use source::{Dispatch, MessageSource, ReceiveLimits};
