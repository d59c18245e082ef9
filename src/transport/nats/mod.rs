//! NATS transport adapters (feature `transport_nats`).

mod transport;

pub use transport::create_nats_transports;
