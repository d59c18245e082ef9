// src/backplane.rs

//! Core pub/sub access layer.
//!
//! A [`Backplane`] multiplexes two transport connections behind one
//! topic-addressed API. Callers publish and subscribe by topic name
//! alone; this layer decides which transport semantics apply and
//! normalizes delivery and acknowledgment into a single message shape.
//!
//! ## Routing
//!
//! Publish-side routing dispatches on the **payload kind**; subscribe-side
//! routing dispatches on the **topic class**. The two are independent
//! decisions driven by different signals — an intentional asymmetry.
//!
//! ## Concurrency
//!
//! Each subscription gets its own forwarding task and bounded channel.
//! Writing a delivered message onto the channel blocks when the consumer
//! is slow, which back-pressures the transport's delivery loop — an
//! explicit, accepted coupling. No internal buffering or dropping layer
//! is introduced.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::domain::{
    //
    AckRecord,
    AckToken,
    BroadcastPtr,
    BroadcastTransport,
    DeliverPolicy,
    DurablePtr,
    DurableSubscribeOptions,
    DurableTransport,
    Payload,
    ReceivedMessage,
};
use crate::macros::{log_debug, log_error, log_info};
use crate::subscription::SubscriptionHandle;
use crate::topic::{classify, TopicClass};
use crate::{BackplaneConfig, Result};

/// Capacity of each subscription's normalized message channel.
const STREAM_CAPACITY: usize = 16;

/// Unified access layer over one broadcast and one durable streaming
/// connection.
///
/// Both connections are established once and shared read-only by all
/// publish, subscribe, and acknowledge operations for the process
/// lifetime; no subscription ever owns a connection.
pub struct Backplane {
    broadcast: BroadcastPtr,
    durable: DurablePtr,
    ack_wait: Duration,
    client_id: Arc<str>,
}

impl Backplane {
    /// Establish both transport connections from configuration.
    ///
    /// The transport implementation is feature-selected: with
    /// `transport_nats` enabled, both halves connect to the configured
    /// endpoint; otherwise the in-memory pair is used.
    pub async fn connect(config: BackplaneConfig) -> Result<Self> {
        // ---
        #[cfg(feature = "transport_nats")]
        {
            let (broadcast, durable) = crate::transport::create_nats_transports(&config).await?;
            return Ok(Self::with_transports(config, broadcast, durable));
        }

        #[cfg(not(feature = "transport_nats"))]
        {
            let (broadcast, durable) = crate::transport::create_memory_transports();
            Ok(Self::with_transports(config, broadcast, durable))
        }
    }

    /// Wrap pre-established transport connections.
    ///
    /// This is the seam for callers that manage connections themselves,
    /// and for tests.
    pub fn with_transports(
        config: BackplaneConfig,
        broadcast: BroadcastPtr,
        durable: DurablePtr,
    ) -> Self {
        // ---
        let client_id: Arc<str> = match &config.client_id {
            Some(id) => Arc::from(id.as_str()),
            None => Arc::from(uuid::Uuid::new_v4().to_string()),
        };

        log_info!("backplane ready, client id {client_id}");

        Self {
            broadcast,
            durable,
            ack_wait: config.ack_wait,
            client_id,
        }
    }

    /// Publish a payload to a topic.
    ///
    /// Dispatch is by payload kind, not by topic class:
    /// [`Payload::SignedSubscription`] goes to the broadcast transport,
    /// [`Payload::ConfigDocument`] and [`Payload::RawBytes`] go to the
    /// durable transport. Serialization failure and transport failure
    /// surface as distinct errors; neither is retried.
    ///
    /// Durable publishes are asynchronous: the call returns once the
    /// transport has accepted the request, not once the message is
    /// durably stored.
    pub async fn publish(&self, topic: &str, payload: Payload) -> Result<()> {
        // ---
        let bytes = payload.encode()?;

        log_debug!("publish {} to {topic}", payload.kind());

        match payload {
            Payload::SignedSubscription(_) => self.broadcast.publish(topic, bytes).await,
            Payload::ConfigDocument(_) | Payload::RawBytes(_) => {
                self.durable.publish(topic, bytes).await
            }
        }
    }

    /// Subscribe to a topic.
    ///
    /// The topic class selects the transport and delivery options:
    /// `config.*` opens a durable subscription replaying all retained
    /// messages; `subscription.*` opens a broadcast subscription; every
    /// other topic opens a durable subscription delivering new messages
    /// only. Durable subscriptions use manual acknowledgment with the
    /// configured ack-wait.
    ///
    /// Each call allocates its own message stream; streams are never
    /// shared across subscriptions. The stream ends when the handle is
    /// closed or the transport stops delivering.
    pub async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<ReceivedMessage>)> {
        // ---
        match classify(topic) {
            TopicClass::Config => self.subscribe_durable(topic, DeliverPolicy::All).await,
            TopicClass::SubscriptionControl => self.subscribe_broadcast(topic).await,
            TopicClass::Default => self.subscribe_durable(topic, DeliverPolicy::New).await,
        }
    }

    /// Forward a batch of ack tokens to their durable subscriptions.
    ///
    /// Tokens are processed independently, in input order; one token's
    /// failure never aborts the rest. Returns the tokens that failed —
    /// malformed tokens and tokens whose ack could not be published — in
    /// their original form, so the caller can retry exactly the failed
    /// subset. Ack-record re-encode failures are logged and dropped
    /// rather than reported: resubmitting the same bytes cannot fix
    /// those.
    ///
    /// The error position is reserved; batch-level processing itself
    /// never fails.
    pub async fn acknowledge<I>(&self, tokens: I) -> Result<Vec<Bytes>>
    where
        I: IntoIterator<Item = Bytes>,
    {
        // ---
        let mut failed = Vec::new();

        for token_bytes in tokens {
            let token = match AckToken::decode(&token_bytes) {
                Ok(token) => token,
                Err(_err) => {
                    log_error!("unable to decode ack token: {_err}");
                    failed.push(token_bytes);
                    continue;
                }
            };

            let record = AckRecord {
                subject: token.subject,
                sequence: token.sequence,
            };
            let record_bytes = match record.encode() {
                Ok(bytes) => bytes,
                Err(_err) => {
                    log_error!("unable to encode ack record: {_err}");
                    continue;
                }
            };

            if let Err(_err) = self.broadcast.publish(&token.ack_inbox, record_bytes).await {
                log_error!("unable to forward ack to {}: {_err}", token.ack_inbox);
                failed.push(token_bytes);
            }
        }

        Ok(failed)
    }

    /// Close both transport connections.
    pub async fn close(&self) -> Result<()> {
        // ---
        self.broadcast.close().await?;
        self.durable.close().await
    }

    async fn subscribe_durable(
        &self,
        topic: &str,
        deliver: DeliverPolicy,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<ReceivedMessage>)> {
        // ---
        let opts = DurableSubscribeOptions {
            deliver,
            ack_wait: self.ack_wait,
            durable_name: Some(self.durable_name(topic)),
        };

        let sub = self.durable.subscribe(topic, opts).await?;

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let ack_inbox = sub.ack_inbox.clone();
        let mut inbox = sub.inbox;

        tokio::spawn(async move {
            while let Some(delivery) = inbox.recv().await {
                let token = AckToken {
                    ack_inbox: ack_inbox.to_string(),
                    subject: delivery.subject.to_string(),
                    sequence: delivery.sequence,
                };

                // An encode failure must not stall the stream: the message
                // is delivered without a token and the failure logged.
                let ack_token = match token.encode() {
                    Ok(bytes) => bytes,
                    Err(_err) => {
                        log_error!(
                            "failed to encode ack token for {}#{}: {_err}",
                            delivery.subject,
                            delivery.sequence
                        );
                        Bytes::new()
                    }
                };

                let message = ReceivedMessage {
                    payload: delivery.payload,
                    ack_token,
                };

                if tx.send(message).await.is_err() {
                    // Stream receiver dropped; stop forwarding.
                    break;
                }
            }
        });

        Ok((SubscriptionHandle::durable(sub.control), rx))
    }

    async fn subscribe_broadcast(
        &self,
        topic: &str,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<ReceivedMessage>)> {
        // ---
        let sub = self.broadcast.subscribe(topic).await?;

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let mut inbox = sub.inbox;

        tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                let message = ReceivedMessage {
                    payload: frame.payload,
                    ack_token: Bytes::new(),
                };

                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        Ok((SubscriptionHandle::broadcast(sub.control), rx))
    }

    /// Durable identity for a topic, stable while the client id is.
    fn durable_name(&self, topic: &str) -> Arc<str> {
        Arc::from(format!("{}.{topic}", self.client_id))
    }
}
