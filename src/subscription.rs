// src/subscription.rs

//! Caller-facing subscription handle.

use crate::domain::{
    BroadcastControlPtr, BroadcastSubscriptionControl, DurableControlPtr,
    DurableSubscriptionControl,
};
use crate::{Error, Result};

/// Opaque handle wrapping exactly one transport-native subscription.
///
/// The populated variant always matches the transport the topic
/// classifier selected for the topic the handle was opened against.
pub struct SubscriptionHandle {
    inner: Option<Inner>,
}

enum Inner {
    Durable(DurableControlPtr),
    Broadcast(BroadcastControlPtr),
}

impl SubscriptionHandle {
    pub(crate) fn durable(control: DurableControlPtr) -> Self {
        Self {
            inner: Some(Inner::Durable(control)),
        }
    }

    pub(crate) fn broadcast(control: BroadcastControlPtr) -> Self {
        Self {
            inner: Some(Inner::Broadcast(control)),
        }
    }

    /// True when the handle wraps a durable subscription.
    pub fn is_durable(&self) -> bool {
        matches!(self.inner, Some(Inner::Durable(_)))
    }

    /// Close the wrapped subscription.
    ///
    /// Closing a durable subscription **retains** its transport-side state
    /// (acked position, durable registration): a client can disconnect and
    /// later resume the same durable subscription without losing its
    /// position. Closing a broadcast subscription fully unsubscribes; no
    /// resumption is possible.
    ///
    /// Known limitation: closing an already-closed handle is forwarded to
    /// the transport as-is, and the outcome is transport-defined.
    pub async fn close(&self) -> Result<()> {
        match &self.inner {
            Some(Inner::Durable(control)) => control.close().await,
            Some(Inner::Broadcast(control)) => control.unsubscribe().await,
            // The subscribe path always populates one variant; just in case.
            None => Err(Error::NoSubscriptionFound),
        }
    }
}
