//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations, protocols, or infrastructure concerns.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod ack;
mod message;
mod transport;

// --- Message domain re-exports ---

pub use ack::{AckRecord, AckToken};
pub use message::{ConfigDocument, Payload, ReceivedMessage, SignedSubscription};

// --- Transport domain re-exports ---

pub use transport::{
    //
    BroadcastControlPtr,
    BroadcastDelivery,
    BroadcastPtr,
    BroadcastSubscription,
    BroadcastSubscriptionControl,
    BroadcastTransport,
    DeliverPolicy,
    DurableControlPtr,
    DurableDelivery,
    DurablePtr,
    DurableSubscribeOptions,
    DurableSubscription,
    DurableSubscriptionControl,
    DurableTransport,
};
