//! # parley-client
//!
//! One handle over the connection core: [`Client`] pairs the
//! [`HealthMonitor`](parley_transport::HealthMonitor) with a
//! [`ReceiveSession`](parley_receive::ReceiveSession) sharing the same
//! transport, and shuts both down together.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;

pub use client::{Client, ClosedListener};
pub use errors::ClientError;
