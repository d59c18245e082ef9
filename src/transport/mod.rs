//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! transport traits. The in-memory pair is always available and serves as
//! the reference implementation; the NATS adapter is hidden behind a
//! feature flag and exposed only through its constructor function.
//!
//! Domain code must not depend on transport-specific types.

mod memory;

#[cfg(feature = "transport_nats")]
mod nats;

pub use memory::create_memory_transports;

#[cfg(feature = "transport_nats")]
pub use nats::create_nats_transports;
