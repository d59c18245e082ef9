// src/domain/ack.rs

//! Acknowledgment tokens and transport-native ack records.
//!
//! Subscribers receive an [`AckToken`] as opaque bytes alongside every
//! durable message and hand it back, unmodified, to
//! [`Backplane::acknowledge`]. The forwarder decodes the token, rebuilds a
//! transport-native [`AckRecord`], and publishes it to the token's ack
//! inbox.
//!
//! [`Backplane::acknowledge`]: crate::Backplane::acknowledge

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque acknowledgment token attached to durable deliveries.
///
/// The ack inbox is resolved once per subscription and is fixed for the
/// subscription's lifetime, so every token minted for that subscription
/// carries the same inbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckToken {
    /// Subject on which the durable transport accepts ack records for the
    /// originating subscription.
    pub ack_inbox: String,

    /// Subject of the acknowledged message.
    pub subject: String,

    /// Sequence number of the acknowledged message.
    pub sequence: u64,
}

impl AckToken {
    /// Serialize the token to opaque bytes.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }

    /// Decode token bytes submitted by a caller.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| Error::AckDecode(err.to_string()))
    }
}

/// Transport-native acknowledgment record, published to an ack inbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckRecord {
    /// Subject of the acknowledged message.
    pub subject: String,

    /// Sequence number of the acknowledged message.
    pub sequence: u64,
}

impl AckRecord {
    /// Serialize the record for publishing.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }

    /// Decode a record received on an ack inbox.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|err| Error::AckDecode(err.to_string()))
    }
}
