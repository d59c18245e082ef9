//! Topic-addressed pub/sub over two messaging transports.
//!
//! This library multiplexes a lightweight fire-and-forget **broadcast**
//! transport and a durable, ordered, acknowledged **streaming** transport
//! behind one topic-addressed API. Callers publish and subscribe by topic
//! name alone; the layer decides, per topic, which transport semantics
//! apply, and normalizes delivery and acknowledgment into a single
//! `(payload, ack-token)` message shape delivered over one channel.
//!

// Import all sub modules once...
mod backplane;
mod config;
mod domain;
mod subscription;
mod topic;
mod transport;

mod error;
mod macros;

// Re-export main types
pub use backplane::Backplane;
pub use config::BackplaneConfig;

pub use error::{Error, Result};

pub use subscription::SubscriptionHandle;
pub use topic::{classify, TopicClass};

pub use transport::create_memory_transports;

#[cfg(feature = "transport_nats")]
pub use transport::create_nats_transports;

// --- public re-exports
pub use domain::{
    //
    AckRecord,
    AckToken,
    BroadcastControlPtr,
    BroadcastDelivery,
    BroadcastPtr,
    BroadcastSubscription,
    BroadcastSubscriptionControl,
    BroadcastTransport,
    ConfigDocument,
    DeliverPolicy,
    DurableControlPtr,
    DurableDelivery,
    DurablePtr,
    DurableSubscribeOptions,
    DurableSubscription,
    DurableSubscriptionControl,
    DurableTransport,
    Payload,
    ReceivedMessage,
    SignedSubscription,
};
