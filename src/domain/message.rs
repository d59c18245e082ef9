// src/domain/message.rs

//! Domain message types.
//!
//! [`Payload`] is the closed set of kinds a caller may publish. The kind
//! determines both serialization and the target transport (see
//! [`Backplane::publish`]); adding a kind is a compile error until every
//! dispatch site handles it.
//!
//! [`Backplane::publish`]: crate::Backplane::publish

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A signed subscription-control descriptor.
///
/// Carries an encoded subscription descriptor together with a detached
/// signature over those bytes. The backplane does not verify signatures;
/// that is the consumer's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSubscription {
    /// Encoded subscription descriptor.
    pub descriptor: Bytes,

    /// Detached signature over `descriptor`.
    pub signature: Bytes,
}

/// A keyed configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Document key, unique within the cluster.
    pub key: String,

    /// Monotonic revision assigned by the producer.
    pub revision: u64,

    /// Document body; format is producer-defined.
    pub body: Bytes,
}

/// The closed set of publishable payload kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Subscription-control descriptor; published on the broadcast
    /// transport, at most once.
    SignedSubscription(SignedSubscription),

    /// Configuration document; published on the durable transport.
    ConfigDocument(ConfigDocument),

    /// Arbitrary bytes, published verbatim on the durable transport.
    RawBytes(Bytes),
}

impl Payload {
    /// Kind name of [`Payload::SignedSubscription`].
    pub const KIND_SIGNED_SUBSCRIPTION: &'static str = "signed-subscription";

    /// Kind name of [`Payload::ConfigDocument`].
    pub const KIND_CONFIG_DOCUMENT: &'static str = "config-document";

    /// Kind name of [`Payload::RawBytes`].
    pub const KIND_RAW_BYTES: &'static str = "raw-bytes";

    /// Stable kind name, used in logs and wire-level decoding.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::SignedSubscription(_) => Self::KIND_SIGNED_SUBSCRIPTION,
            Payload::ConfigDocument(_) => Self::KIND_CONFIG_DOCUMENT,
            Payload::RawBytes(_) => Self::KIND_RAW_BYTES,
        }
    }

    /// Serialize for the wire.
    ///
    /// Structured kinds encode as JSON; raw bytes pass through verbatim.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Payload::SignedSubscription(descriptor) => Ok(serde_json::to_vec(descriptor)?.into()),
            Payload::ConfigDocument(document) => Ok(serde_json::to_vec(document)?.into()),
            Payload::RawBytes(bytes) => Ok(bytes.clone()),
        }
    }

    /// Decode received payload bytes as the named kind.
    ///
    /// Subscribers know from the topic which kind to expect; this is the
    /// inverse of [`Payload::encode`]. Kind names outside the closed set
    /// fail with [`Error::InvalidPayloadKind`].
    pub fn decode(kind: &str, bytes: &[u8]) -> Result<Self> {
        match kind {
            Self::KIND_SIGNED_SUBSCRIPTION => {
                Ok(Payload::SignedSubscription(serde_json::from_slice(bytes)?))
            }
            Self::KIND_CONFIG_DOCUMENT => Ok(Payload::ConfigDocument(serde_json::from_slice(bytes)?)),
            Self::KIND_RAW_BYTES => Ok(Payload::RawBytes(Bytes::copy_from_slice(bytes))),
            other => Err(Error::InvalidPayloadKind(other.to_string())),
        }
    }
}

/// Normalized unit delivered to subscribers, regardless of origin
/// transport.
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    /// Raw payload bytes; interpretation is left to the caller.
    pub payload: Bytes,

    /// Opaque ack token to hand back to [`Backplane::acknowledge`].
    ///
    /// Empty when the source transport has no ack concept.
    ///
    /// [`Backplane::acknowledge`]: crate::Backplane::acknowledge
    pub ack_token: Bytes,
}

impl ReceivedMessage {
    /// True when this message expects an acknowledgment.
    pub fn needs_ack(&self) -> bool {
        !self.ack_token.is_empty()
    }
}
