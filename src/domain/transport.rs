// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the domain-level contracts for the two transports
//! the backplane multiplexes. It intentionally avoids any reference to
//! concrete protocols, brokers, or client libraries.
//!
//! The **broadcast** transport is fire-and-forget: at-most-once delivery,
//! no backlog, no acknowledgment concept. The **durable** transport is
//! ordered and acknowledged: messages are retained per subject with
//! transport-assigned sequence numbers, delivered at least once, and
//! redelivered until acknowledged.
//!
//! Concrete implementations of these contracts live under
//! `src/transport/`. The in-memory pair is the reference implementation
//! of these semantics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::Result;

/// Cursor position for a new durable subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Redeliver every message retained on the subject, oldest first,
    /// regardless of when the subscriber connects.
    All,

    /// Deliver only messages stored after the subscription is
    /// established.
    New,
}

/// Options for opening a durable subscription.
///
/// Durable subscriptions are always opened in manual-acknowledgment mode:
/// the transport redelivers a message if no ack record reaches the
/// subscription's ack inbox within `ack_wait`.
#[derive(Debug, Clone)]
pub struct DurableSubscribeOptions {
    /// Cursor position for the new subscription.
    pub deliver: DeliverPolicy,

    /// Redelivery timeout for unacknowledged messages.
    pub ack_wait: Duration,

    /// Durable identity. When set, the transport retains the
    /// subscription's acked position across close/resubscribe.
    pub durable_name: Option<Arc<str>>,
}

/// A message delivered by the durable transport.
#[derive(Debug, Clone)]
pub struct DurableDelivery {
    /// Subject the message is stored under.
    pub subject: Arc<str>,

    /// Transport-assigned sequence number, unique and ascending per
    /// subject.
    pub sequence: u64,

    /// Raw payload bytes.
    pub payload: Bytes,
}

/// A frame delivered by the broadcast transport.
#[derive(Debug, Clone)]
pub struct BroadcastDelivery {
    /// Subject the frame was published to.
    pub subject: Arc<str>,

    /// Raw payload bytes.
    pub payload: Bytes,
}

/// Control surface of a live durable subscription.
#[async_trait]
pub trait DurableSubscriptionControl: Send + Sync {
    /// Stop delivery while retaining the transport-side durable state
    /// (acked position, durable registration), so the subscription can be
    /// resumed later under the same durable identity.
    ///
    /// Calling `close` twice is transport-defined.
    async fn close(&self) -> Result<()>;
}

/// Control surface of a live broadcast subscription.
#[async_trait]
pub trait BroadcastSubscriptionControl: Send + Sync {
    /// Fully unsubscribe. No state is retained and no resumption is
    /// possible.
    async fn unsubscribe(&self) -> Result<()>;
}

/// Shared durable-subscription control pointer.
pub type DurableControlPtr = Arc<dyn DurableSubscriptionControl>;

/// Shared broadcast-subscription control pointer.
pub type BroadcastControlPtr = Arc<dyn BroadcastSubscriptionControl>;

/// A live durable subscription.
pub struct DurableSubscription {
    /// Subject on which the transport accepts ack records for this
    /// subscription. Fixed for the lifetime of the subscription.
    ///
    /// Supplying this at subscribe time is a required capability of every
    /// durable adapter; message handling never needs to recover it from
    /// transport internals.
    pub ack_inbox: Arc<str>,

    /// Delivery channel. The transport's delivery loop blocks when this
    /// channel is full; a slow consumer back-pressures delivery.
    pub inbox: mpsc::Receiver<DurableDelivery>,

    /// Close control.
    pub control: DurableControlPtr,
}

/// A live broadcast subscription.
pub struct BroadcastSubscription {
    /// Delivery channel for frames published after the subscription was
    /// established.
    pub inbox: mpsc::Receiver<BroadcastDelivery>,

    /// Unsubscribe control.
    pub control: BroadcastControlPtr,
}

/// Fire-and-forget broadcast transport.
///
/// Implementations must ensure that once `subscribe()` returns
/// successfully, frames published *after* that point on the same subject
/// are deliverable to the returned inbox.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Publish payload bytes to a subject. At-most-once; returns once the
    /// transport has accepted the frame.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Open a subscription delivering frames published after this call.
    async fn subscribe(&self, subject: &str) -> Result<BroadcastSubscription>;

    /// Close the connection and release associated resources.
    async fn close(&self) -> Result<()>;
}

/// Durable, ordered, acknowledged streaming transport.
#[async_trait]
pub trait DurableTransport: Send + Sync {
    /// Submit a publish.
    ///
    /// Returns once the transport has accepted the request, not once the
    /// message is durably stored; storage confirmation is intentionally
    /// not surfaced by this contract.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Open a manual-acknowledgment subscription on a subject.
    async fn subscribe(
        &self,
        subject: &str,
        opts: DurableSubscribeOptions,
    ) -> Result<DurableSubscription>;

    /// Close the connection and release associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared broadcast-transport pointer.
///
/// An `Arc<dyn BroadcastTransport>`: cheap to clone, shared read-only by
/// all publishers and subscribers for the process lifetime.
pub type BroadcastPtr = Arc<dyn BroadcastTransport>;

/// Shared durable-transport pointer.
pub type DurablePtr = Arc<dyn DurableTransport>;
