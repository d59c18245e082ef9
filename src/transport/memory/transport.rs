// src/transport/memory/transport.rs

//! In-memory transport pair.
//!
//! This file contains the concrete implementations of the domain-level
//! transport traits using in-process data structures only.
//!
//! The memory pair is the **reference implementation** of transport
//! semantics. Other transports are expected to approximate this behavior
//! as closely as their underlying systems allow and to document any
//! unavoidable deviations.
//!
//! ## Semantics
//!
//! - Both halves share one subject bus. Ack records forwarded through the
//!   broadcast half therefore reach the durable half's ack inboxes, the
//!   same path acknowledgments take on the wire transports this models.
//! - Broadcast: exact-match fanout, registered immediately; once
//!   `subscribe()` returns, subsequent matching publishes are
//!   deliverable. No backlog.
//! - Durable: per-subject append-only log with 1-based sequence numbers,
//!   manual acknowledgment, ack-wait redelivery, and per-(subject,
//!   durable-name) resume positions retained across `close()`.
//!
//! ## Simplifications
//!
//! - The resume position is the highest acked sequence; acking out of
//!   order can skip earlier unacked messages on resume.
//! - A durable resume position overrides the requested deliver policy,
//!   matching the durable semantics of the streaming systems this
//!   models.
//! - Closing the durable half releases no storage; logs live until the
//!   pair is dropped, and per-subscription teardown is via the
//!   subscription's own control.
//!
//! ## Non-Goals
//!
//! - Network behavior or failure simulation
//! - Bounded retention or log truncation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use uuid::Uuid;

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
use crate::macros::log_debug;
use crate::Result;

const INBOX_CAPACITY: usize = 16;

/// Create a linked in-memory transport pair sharing one subject bus.
///
/// Always available; requires no external resources.
pub fn create_memory_transports() -> (BroadcastPtr, DurablePtr) {
    // ---
    let bus = Arc::new(Bus::new());

    let broadcast = Arc::new(MemoryBroadcast {
        bus: Arc::clone(&bus),
    });
    let durable = Arc::new(MemoryDurable {
        bus,
        state: Arc::new(RwLock::new(DurableState::default())),
    });

    (broadcast, durable)
}

// --------------------
// Subject bus
// --------------------

/// Shared subject bus with exact-match fanout.
struct Bus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<String, HashMap<u64, mpsc::Sender<BroadcastDelivery>>>>,
}

impl Bus {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Fan a frame out to every sender registered for the subject.
    ///
    /// Matching is exact string equality — the reference matching
    /// semantics for the transport layer. Send failures are ignored; a
    /// closed channel means the subscription is being torn down.
    async fn publish(&self, subject: &str, payload: Bytes) {
        // ---
        let senders: Vec<mpsc::Sender<BroadcastDelivery>> = {
            let map = self.subscribers.read().await;
            match map.get(subject) {
                Some(entries) => entries.values().cloned().collect(),
                None => return,
            }
        };

        let subject: Arc<str> = Arc::from(subject);
        for sender in senders {
            let _ = sender
                .send(BroadcastDelivery {
                    subject: Arc::clone(&subject),
                    payload: payload.clone(),
                })
                .await;
        }
    }

    async fn subscribe(&self, subject: &str) -> (u64, mpsc::Receiver<BroadcastDelivery>) {
        // ---
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut map = self.subscribers.write().await;
        map.entry(subject.to_string()).or_default().insert(id, tx);

        (id, rx)
    }

    async fn unsubscribe(&self, subject: &str, id: u64) {
        // ---
        let mut map = self.subscribers.write().await;
        if let Some(entries) = map.get_mut(subject) {
            entries.remove(&id);
            if entries.is_empty() {
                map.remove(subject);
            }
        }
    }

    async fn clear(&self) {
        self.subscribers.write().await.clear();
    }
}

// --------------------
// Broadcast half
// --------------------

struct MemoryBroadcast {
    bus: Arc<Bus>,
}

#[async_trait]
impl BroadcastTransport for MemoryBroadcast {
    // ---

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.bus.publish(subject, payload).await;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<BroadcastSubscription> {
        // ---
        let (id, inbox) = self.bus.subscribe(subject).await;

        let control = Arc::new(MemoryBroadcastControl {
            bus: Arc::clone(&self.bus),
            subject: subject.to_string(),
            id,
        });

        Ok(BroadcastSubscription { inbox, control })
    }

    /// Close the broadcast half. Clears all bus registrations.
    async fn close(&self) -> Result<()> {
        self.bus.clear().await;
        Ok(())
    }
}

struct MemoryBroadcastControl {
    bus: Arc<Bus>,
    subject: String,
    id: u64,
}

#[async_trait]
impl BroadcastSubscriptionControl for MemoryBroadcastControl {
    async fn unsubscribe(&self) -> Result<()> {
        // Dropping the bus sender closes the subscription's inbox.
        self.bus.unsubscribe(&self.subject, self.id).await;
        Ok(())
    }
}

// --------------------
// Durable half
// --------------------

#[derive(Clone)]
struct StoredMessage {
    sequence: u64,
    payload: Bytes,
}

/// Per-subject append-only log. `latest` carries the newest sequence so
/// live subscriptions can pick up new appends.
struct SubjectLog {
    messages: Vec<StoredMessage>,
    latest: watch::Sender<u64>,
}

impl SubjectLog {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            latest: watch::channel(0).0,
        }
    }
}

#[derive(Default)]
struct DurableState {
    logs: HashMap<String, SubjectLog>,
    /// (subject, durable name) → highest acked sequence.
    positions: HashMap<(String, String), u64>,
}

struct MemoryDurable {
    bus: Arc<Bus>,
    state: Arc<RwLock<DurableState>>,
}

#[async_trait]
impl DurableTransport for MemoryDurable {
    // ---

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        // ---
        let mut state = self.state.write().await;
        let log = state
            .logs
            .entry(subject.to_string())
            .or_insert_with(SubjectLog::new);

        let sequence = log.messages.len() as u64 + 1;
        log.messages.push(StoredMessage { sequence, payload });
        log.latest.send_replace(sequence);

        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        opts: DurableSubscribeOptions,
    ) -> Result<DurableSubscription> {
        // ---
        let ack_inbox: Arc<str> = Arc::from(format!("_ack.{}", Uuid::new_v4()));
        let (ack_id, ack_rx) = self.bus.subscribe(&ack_inbox).await;

        // Resolve the starting cursor. A durable resume position wins over
        // the requested deliver policy.
        let (latest_rx, start) = {
            let mut state = self.state.write().await;
            let latest_rx = state
                .logs
                .entry(subject.to_string())
                .or_insert_with(SubjectLog::new)
                .latest
                .subscribe();
            let head = *latest_rx.borrow();

            let resumed = opts.durable_name.as_ref().and_then(|name| {
                state
                    .positions
                    .get(&(subject.to_string(), name.to_string()))
                    .copied()
            });

            let start = match (resumed, opts.deliver) {
                (Some(position), _) => position,
                (None, DeliverPolicy::All) => 0,
                (None, DeliverPolicy::New) => head,
            };

            (latest_rx, start)
        };

        let (stop_tx, stop_rx) = watch::channel(());
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);

        let worker = DeliveryWorker {
            subject: subject.to_string(),
            durable_name: opts.durable_name,
            ack_wait: opts.ack_wait,
            state: Arc::clone(&self.state),
            bus: Arc::clone(&self.bus),
            ack_inbox: Arc::clone(&ack_inbox),
            ack_id,
            next: start,
            pending: HashMap::new(),
            out: tx,
            ack_rx,
            latest_rx,
            stop_rx,
        };
        tokio::spawn(worker.run());

        let control = Arc::new(MemoryDurableControl { stop: stop_tx });

        Ok(DurableSubscription {
            ack_inbox,
            inbox,
            control,
        })
    }

    /// Close the durable half.
    ///
    /// Releases no storage; see the module-level simplifications.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryDurableControl {
    stop: watch::Sender<()>,
}

#[async_trait]
impl DurableSubscriptionControl for MemoryDurableControl {
    async fn close(&self) -> Result<()> {
        // Stops delivery; the durable position stays in the shared state.
        let _ = self.stop.send(());
        Ok(())
    }
}

/// Delivery loop of one durable subscription.
///
/// Owns the subscription's cursor and its unacked-delivery set. Runs
/// until the subscription is closed, the log is dropped, or the inbox
/// receiver goes away.
struct DeliveryWorker {
    subject: String,
    durable_name: Option<Arc<str>>,
    ack_wait: Duration,
    state: Arc<RwLock<DurableState>>,
    bus: Arc<Bus>,
    ack_inbox: Arc<str>,
    ack_id: u64,
    /// Highest sequence handed to `out` so far.
    next: u64,
    /// Unacked deliveries: sequence → time of last send.
    pending: HashMap<u64, Instant>,
    out: mpsc::Sender<DurableDelivery>,
    ack_rx: mpsc::Receiver<BroadcastDelivery>,
    latest_rx: watch::Receiver<u64>,
    stop_rx: watch::Receiver<()>,
}

impl DeliveryWorker {
    async fn run(mut self) {
        // ---

        // Deliver the backlog selected by the starting cursor before
        // waiting for new activity.
        if self.deliver_stored().await.is_err() {
            self.cleanup().await;
            return;
        }

        let mut redelivery = interval(self.ack_wait);
        redelivery.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => break,

                changed = self.latest_rx.changed() => {
                    if changed.is_err() || self.deliver_stored().await.is_err() {
                        break;
                    }
                }

                frame = self.ack_rx.recv() => {
                    match frame {
                        Some(frame) => self.handle_ack(frame).await,
                        None => break,
                    }
                }

                _ = redelivery.tick() => {
                    if self.redeliver_overdue().await.is_err() {
                        break;
                    }
                }
            }
        }

        self.cleanup().await;
    }

    /// Deliver stored messages past the cursor, oldest first, until the
    /// log is drained. Errors when the inbox receiver is gone.
    async fn deliver_stored(&mut self) -> std::result::Result<(), ()> {
        // ---
        loop {
            let batch: Vec<StoredMessage> = {
                let state = self.state.read().await;
                match state.logs.get(&self.subject) {
                    Some(log) => log
                        .messages
                        .iter()
                        .filter(|message| message.sequence > self.next)
                        .cloned()
                        .collect(),
                    None => Vec::new(),
                }
            };

            if batch.is_empty() {
                return Ok(());
            }

            for message in batch {
                let sequence = message.sequence;
                self.send(message).await?;
                self.next = sequence;
                self.pending.insert(sequence, Instant::now());
            }
        }
    }

    async fn handle_ack(&mut self, frame: BroadcastDelivery) {
        // ---
        let record = match AckRecord::decode(&frame.payload) {
            Ok(record) => record,
            Err(_err) => {
                log_debug!("memory durable: ignoring malformed ack record: {_err}");
                return;
            }
        };

        if record.subject != self.subject {
            log_debug!(
                "memory durable: ack subject {} does not match subscription {}",
                record.subject,
                self.subject
            );
            return;
        }

        if self.pending.remove(&record.sequence).is_none() {
            // Stale ack; nothing outstanding under that sequence.
            return;
        }

        if let Some(name) = &self.durable_name {
            let mut state = self.state.write().await;
            let position = state
                .positions
                .entry((self.subject.clone(), name.to_string()))
                .or_insert(0);
            if record.sequence > *position {
                *position = record.sequence;
            }
        }
    }

    /// Re-send every pending delivery whose ack-wait has elapsed.
    async fn redeliver_overdue(&mut self) -> std::result::Result<(), ()> {
        // ---
        let mut overdue: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, sent)| sent.elapsed() >= self.ack_wait)
            .map(|(sequence, _)| *sequence)
            .collect();

        if overdue.is_empty() {
            return Ok(());
        }
        overdue.sort_unstable();

        let messages: Vec<StoredMessage> = {
            let state = self.state.read().await;
            let Some(log) = state.logs.get(&self.subject) else {
                return Ok(());
            };
            overdue
                .iter()
                .filter_map(|sequence| log.messages.get((sequence - 1) as usize).cloned())
                .collect()
        };

        for message in messages {
            let sequence = message.sequence;
            self.send(message).await?;
            self.pending.insert(sequence, Instant::now());
        }

        Ok(())
    }

    async fn send(&self, message: StoredMessage) -> std::result::Result<(), ()> {
        // ---
        let delivery = DurableDelivery {
            subject: Arc::from(self.subject.as_str()),
            sequence: message.sequence,
            payload: message.payload,
        };
        self.out.send(delivery).await.map_err(|_| ())
    }

    async fn cleanup(&self) {
        self.bus.unsubscribe(self.ack_inbox.as_ref(), self.ack_id).await;
    }
}
