// src/topic.rs

//! Topic classification.
//!
//! Topics are routed by a closed set of prefix rules. Classification is
//! pure and total: every string maps to exactly one class, and the class
//! fully determines the transport and delivery options used by
//! [`Backplane::subscribe`].
//!
//! [`Backplane::subscribe`]: crate::Backplane::subscribe

/// Routing class of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    /// `config.*` — durable transport, replay of all retained messages.
    Config,

    /// `subscription.*` — broadcast transport; no backlog, no acks.
    SubscriptionControl,

    /// Everything else — durable transport, new messages only.
    Default,
}

/// Classify a topic by its routing prefix.
///
/// Rules are checked in priority order; the first match wins.
pub fn classify(topic: &str) -> TopicClass {
    // ---
    if topic.starts_with("config.") {
        TopicClass::Config
    } else if topic.starts_with("subscription.") {
        TopicClass::SubscriptionControl
    } else {
        TopicClass::Default
    }
}
