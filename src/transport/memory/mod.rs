//! In-memory transport pair.
//!
//! Reference implementation of the broadcast and durable transport
//! contracts; see `transport.rs` for the semantics it pins down.

mod transport;

pub use transport::create_memory_transports;
