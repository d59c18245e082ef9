// src/transport/nats/transport.rs

//! NATS transport adapters.
//!
//! The broadcast half is the core NATS client: at-most-once fanout with
//! no backlog, matching the reference semantics of the memory pair. The
//! durable half is JetStream: one stream per subject, durable consumers
//! with explicit ack policy and the configured ack-wait.
//!
//! ## Ack inbox
//!
//! The durable adapter materializes the ack-inbox capability with a
//! client-allocated inbox subject. A per-subscription listener receives
//! ack records on that inbox, resolves them by stream sequence to the
//! retained JetStream delivery, and acknowledges it. The inbox subject is
//! handed out at subscribe time, so nothing downstream ever reaches into
//! client-library internals to find it.
//!
//! ## Deviations from the reference semantics
//!
//! - `close()` flushes the shared client; the connection itself is torn
//!   down when the last clone is dropped.
//! - Stream and consumer names are derived from subjects by replacing
//!   token separators, since JetStream names cannot contain `.`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_nats::jetstream;
use async_nats::jetstream::consumer::{self, AckPolicy};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, watch, RwLock};

use crate::domain::{
    //
    AckRecord,
    BroadcastDelivery,
    BroadcastPtr,
    BroadcastSubscription,
    BroadcastSubscriptionControl,
    BroadcastTransport,
    DeliverPolicy,
    DurableDelivery,
    DurablePtr,
    DurableSubscribeOptions,
    DurableSubscription,
    DurableSubscriptionControl,
    DurableTransport,
};
use crate::macros::{log_debug, log_error};
use crate::{BackplaneConfig, Error, Result};

const INBOX_CAPACITY: usize = 16;

/// Connect both transport halves to the configured NATS endpoint.
///
/// One client connection is shared: the broadcast half uses it directly,
/// the durable half layers a JetStream context on top.
pub async fn create_nats_transports(
    config: &BackplaneConfig,
) -> Result<(BroadcastPtr, DurablePtr)> {
    // ---
    let client = async_nats::connect(config.transport_url.as_str())
        .await
        .map_err(|err| Error::Transport(err.to_string()))?;

    let jetstream = jetstream::new(client.clone());

    let broadcast = Arc::new(NatsBroadcast {
        client: client.clone(),
    });
    let durable = Arc::new(JetStreamDurable {
        client,
        jetstream,
        stream_prefix: config.cluster_name.clone(),
        ensured: RwLock::new(HashSet::new()),
    });

    Ok((broadcast, durable))
}

fn sanitize(name: &str) -> String {
    name.replace(['.', '*', '>', ' '], "_")
}

// --------------------
// Broadcast half
// --------------------

struct NatsBroadcast {
    client: Client,
}

#[async_trait]
impl BroadcastTransport for NatsBroadcast {
    // ---

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<BroadcastSubscription> {
        // ---
        let mut subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let (stop_tx, mut stop_rx) = watch::channel(());
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        let _ = subscriber.unsubscribe().await;
                        break;
                    }
                    message = subscriber.next() => {
                        let Some(message) = message else { break };
                        let delivery = BroadcastDelivery {
                            subject: Arc::from(message.subject.as_str()),
                            payload: message.payload,
                        };
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let control = Arc::new(NatsBroadcastControl { stop: stop_tx });

        Ok(BroadcastSubscription { inbox, control })
    }

    async fn close(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }
}

struct NatsBroadcastControl {
    stop: watch::Sender<()>,
}

#[async_trait]
impl BroadcastSubscriptionControl for NatsBroadcastControl {
    async fn unsubscribe(&self) -> Result<()> {
        let _ = self.stop.send(());
        Ok(())
    }
}

// --------------------
// Durable half
// --------------------

struct JetStreamDurable {
    client: Client,
    jetstream: jetstream::Context,
    stream_prefix: String,
    /// Subjects whose stream has already been ensured on the server.
    ensured: RwLock<HashSet<String>>,
}

impl JetStreamDurable {
    fn stream_name(&self, subject: &str) -> String {
        format!("{}_{}", sanitize(&self.stream_prefix), sanitize(subject))
    }

    /// Get or create the stream backing a subject.
    async fn ensure_stream(&self, subject: &str) -> Result<jetstream::stream::Stream> {
        // ---
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name(subject),
                subjects: vec![subject.to_string().into()],
                ..Default::default()
            })
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        self.ensured.write().await.insert(subject.to_string());

        Ok(stream)
    }
}

#[async_trait]
impl DurableTransport for JetStreamDurable {
    // ---

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        // ---
        if !self.ensured.read().await.contains(subject) {
            self.ensure_stream(subject).await?;
        }

        // Submit only: the storage acknowledgment future is intentionally
        // discarded, per the non-blocking publish contract.
        let _ack = self
            .jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        opts: DurableSubscribeOptions,
    ) -> Result<DurableSubscription> {
        // ---
        let stream = self.ensure_stream(subject).await?;

        let deliver_policy = match opts.deliver {
            DeliverPolicy::All => consumer::DeliverPolicy::All,
            DeliverPolicy::New => consumer::DeliverPolicy::New,
        };

        let config = consumer::pull::Config {
            durable_name: opts.durable_name.as_ref().map(|name| sanitize(name)),
            deliver_policy,
            ack_policy: AckPolicy::Explicit,
            ack_wait: opts.ack_wait,
            ..Default::default()
        };

        let consumer = match config.durable_name.clone() {
            Some(name) => stream.get_or_create_consumer(&name, config).await,
            None => stream.create_consumer(config).await,
        }
        .map_err(|err| Error::Transport(err.to_string()))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let ack_inbox: Arc<str> = Arc::from(self.client.new_inbox());
        let mut ack_sub = self
            .client
            .subscribe(ack_inbox.to_string())
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let (stop_tx, mut stop_rx) = watch::channel(());
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);

        tokio::spawn(async move {
            // Deliveries handed out but not yet acked, by stream sequence.
            let mut pending: HashMap<u64, jetstream::Message> = HashMap::new();

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,

                    message = messages.next() => {
                        let Some(Ok(message)) = message else { break };

                        let sequence = match message.info() {
                            Ok(info) => info.stream_sequence,
                            Err(_err) => {
                                log_error!("jetstream: delivery without info: {_err}");
                                continue;
                            }
                        };

                        let delivery = DurableDelivery {
                            subject: Arc::from(message.subject.as_str()),
                            sequence,
                            payload: message.payload.clone(),
                        };
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                        pending.insert(sequence, message);
                    }

                    ack = ack_sub.next() => {
                        let Some(ack) = ack else { break };

                        match AckRecord::decode(&ack.payload) {
                            Ok(record) => {
                                if let Some(message) = pending.remove(&record.sequence) {
                                    if let Err(_err) = message.ack().await {
                                        log_error!(
                                            "jetstream: ack failed for sequence {}: {_err}",
                                            record.sequence
                                        );
                                    }
                                }
                            }
                            Err(_err) => {
                                log_debug!("jetstream: ignoring malformed ack record: {_err}");
                            }
                        }
                    }
                }
            }

            let _ = ack_sub.unsubscribe().await;
        });

        let control = Arc::new(JetStreamDurableControl { stop: stop_tx });

        Ok(DurableSubscription {
            ack_inbox,
            inbox,
            control,
        })
    }

    async fn close(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }
}

struct JetStreamDurableControl {
    stop: watch::Sender<()>,
}

#[async_trait]
impl DurableSubscriptionControl for JetStreamDurableControl {
    async fn close(&self) -> Result<()> {
        // Stops the delivery loop; the durable consumer stays registered
        // on the server with its acked position.
        let _ = self.stop.send(());
        Ok(())
    }
}
