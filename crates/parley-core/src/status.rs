//! Protocol status codes the client reacts to.

/// Server status signalling that the local device list is stale
/// (the "mismatched devices" condition).
pub const CONFLICT: u16 = 409;
