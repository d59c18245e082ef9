// tests/backplane.rs

//! End-to-end behavior of the backplane over the in-memory transport
//! pair: routing, normalized delivery, ack forwarding, handle close.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::{sleep, timeout};

use backplane_pubsub::{
    //
    create_memory_transports,
    Backplane,
    BackplaneConfig,
    BroadcastPtr,
    ConfigDocument,
    DurablePtr,
    Payload,
    SignedSubscription,
};

const RECV_TIMEOUT: Duration = Duration::from_millis(300);

#[cfg(feature = "logging")]
fn init_logging() {
    use std::sync::Once;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn backplane_over(
    transports: &(BroadcastPtr, DurablePtr),
    client_id: &str,
) -> Backplane {
    // ---
    let config = BackplaneConfig::default()
        .with_ack_wait(Duration::from_millis(100))
        .with_client_id(client_id);

    Backplane::with_transports(config, transports.0.clone(), transports.1.clone())
}

fn sample_document(revision: u64) -> ConfigDocument {
    ConfigDocument {
        key: "fleet/limits".to_string(),
        revision,
        body: Bytes::from_static(b"max_connections=64"),
    }
}

fn sample_descriptor() -> SignedSubscription {
    SignedSubscription {
        descriptor: Bytes::from_static(b"watch: events.*"),
        signature: Bytes::from_static(b"\xde\xad\xbe\xef"),
    }
}

#[tokio::test]
async fn config_topic_replays_backlog_with_ack_token() {
    // ---
    // Arrange: publish before any subscriber exists.
    // ---
    #[cfg(feature = "logging")]
    init_logging();

    let transports = create_memory_transports();
    let backplane = backplane_over(&transports, "replay-reader");

    let document = sample_document(1);
    backplane
        .publish("config.alpha", Payload::ConfigDocument(document.clone()))
        .await
        .expect("publish failed");

    // ---
    // Act
    // ---
    let (handle, mut stream) = backplane
        .subscribe("config.alpha")
        .await
        .expect("subscribe failed");

    // ---
    // Assert: replay delivers the earlier message, durably acked.
    // ---
    let message = timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for replayed message")
        .expect("stream closed unexpectedly");

    assert!(message.needs_ack(), "durable delivery carried no ack token");
    assert!(handle.is_durable());

    let decoded = Payload::decode(Payload::KIND_CONFIG_DOCUMENT, &message.payload)
        .expect("payload did not decode as a config document");
    assert_eq!(decoded, Payload::ConfigDocument(document));
}

#[tokio::test]
async fn subscription_topic_is_broadcast_with_no_backlog() {
    // ---
    // Arrange: publish before any subscriber exists.
    // ---
    let transports = create_memory_transports();
    let backplane = backplane_over(&transports, "control-reader");

    backplane
        .publish(
            "subscription.beta",
            Payload::SignedSubscription(sample_descriptor()),
        )
        .await
        .expect("publish failed");

    let (handle, mut stream) = backplane
        .subscribe("subscription.beta")
        .await
        .expect("subscribe failed");

    // ---
    // Assert: nothing replayed.
    // ---
    assert!(
        timeout(Duration::from_millis(150), stream.recv()).await.is_err(),
        "broadcast topic replayed a message published before subscribe"
    );
    assert!(!handle.is_durable());

    // ---
    // Act: publish after the subscription exists.
    // ---
    backplane
        .publish(
            "subscription.beta",
            Payload::SignedSubscription(sample_descriptor()),
        )
        .await
        .expect("publish failed");

    let message = timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for broadcast message")
        .expect("stream closed unexpectedly");

    assert!(!message.needs_ack(), "broadcast delivery carried an ack token");

    let decoded = Payload::decode(Payload::KIND_SIGNED_SUBSCRIPTION, &message.payload)
        .expect("payload did not decode as a signed subscription");
    assert_eq!(decoded, Payload::SignedSubscription(sample_descriptor()));
}

#[tokio::test]
async fn default_topic_is_durable_new_only() {
    // ---
    let transports = create_memory_transports();
    let backplane = backplane_over(&transports, "telemetry-reader");

    backplane
        .publish("events.host1", Payload::RawBytes(Bytes::from_static(b"old")))
        .await
        .expect("publish failed");

    let (handle, mut stream) = backplane
        .subscribe("events.host1")
        .await
        .expect("subscribe failed");

    assert!(
        timeout(Duration::from_millis(150), stream.recv()).await.is_err(),
        "default topic replayed backlog"
    );
    assert!(handle.is_durable());

    backplane
        .publish("events.host1", Payload::RawBytes(Bytes::from_static(b"new")))
        .await
        .expect("publish failed");

    let message = timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for message")
        .expect("stream closed unexpectedly");

    // Raw bytes arrive verbatim.
    assert_eq!(message.payload, Bytes::from_static(b"new"));
    assert!(message.needs_ack());
}

#[tokio::test]
async fn acknowledge_returns_only_the_failed_tokens() {
    // ---
    // Arrange
    // ---
    #[cfg(feature = "logging")]
    init_logging();

    let transports = create_memory_transports();
    let backplane = backplane_over(&transports, "acker");

    backplane
        .publish("config.jobs", Payload::ConfigDocument(sample_document(1)))
        .await
        .expect("publish failed");

    let (_handle, mut stream) = backplane
        .subscribe("config.jobs")
        .await
        .expect("subscribe failed");

    let message = timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for message")
        .expect("stream closed unexpectedly");

    let garbage = Bytes::from_static(b"definitely not a token");

    // ---
    // Act
    // ---
    let failed = backplane
        .acknowledge([message.ack_token.clone(), garbage.clone()])
        .await
        .expect("acknowledge failed at batch level");

    // ---
    // Assert: exactly the malformed token comes back, in original form.
    // ---
    assert_eq!(failed, vec![garbage]);

    // The valid ack took effect: no redelivery after the ack-wait.
    sleep(Duration::from_millis(150)).await;
    while stream.try_recv().is_ok() {}
    assert!(
        timeout(Duration::from_millis(350), stream.recv()).await.is_err(),
        "acked message was redelivered"
    );
}

#[tokio::test]
async fn durable_handle_close_retains_position() {
    // ---
    // Arrange
    // ---
    let transports = create_memory_transports();
    let backplane = backplane_over(&transports, "ingest-1");

    let (handle, mut stream) = backplane
        .subscribe("config.fleet")
        .await
        .expect("subscribe failed");

    for revision in [1, 2] {
        backplane
            .publish("config.fleet", Payload::ConfigDocument(sample_document(revision)))
            .await
            .expect("publish failed");
    }

    let first = timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for first message")
        .expect("stream closed unexpectedly");

    let failed = backplane
        .acknowledge([first.ack_token.clone()])
        .await
        .expect("acknowledge failed at batch level");
    assert!(failed.is_empty());
    sleep(Duration::from_millis(100)).await;

    // ---
    // Act: close, then resume the same durable identity.
    // ---
    handle.close().await.expect("close failed");
    drop(stream);

    let (_resumed_handle, mut resumed) = backplane
        .subscribe("config.fleet")
        .await
        .expect("resubscribe failed");

    // ---
    // Assert: delivery resumes past the acked message.
    // ---
    let message = timeout(RECV_TIMEOUT, resumed.recv())
        .await
        .expect("timed out waiting for resumed message")
        .expect("stream closed unexpectedly");

    let decoded = Payload::decode(Payload::KIND_CONFIG_DOCUMENT, &message.payload)
        .expect("payload did not decode as a config document");
    assert_eq!(decoded, Payload::ConfigDocument(sample_document(2)));
}

#[tokio::test]
async fn fresh_durable_identity_replays_from_the_start() {
    // ---
    // Arrange: one reader consumes and acks everything.
    // ---
    let transports = create_memory_transports();
    let first_reader = backplane_over(&transports, "reader-a");

    for revision in [1, 2] {
        first_reader
            .publish("config.shared", Payload::ConfigDocument(sample_document(revision)))
            .await
            .expect("publish failed");
    }

    let (handle, mut stream) = first_reader
        .subscribe("config.shared")
        .await
        .expect("subscribe failed");

    for _ in 0..2 {
        let message = timeout(RECV_TIMEOUT, stream.recv())
            .await
            .expect("timed out waiting for message")
            .expect("stream closed unexpectedly");
        let failed = first_reader
            .acknowledge([message.ack_token])
            .await
            .expect("acknowledge failed at batch level");
        assert!(failed.is_empty());
    }
    handle.close().await.expect("close failed");

    // ---
    // Act: a second, fresh identity subscribes to the same topic.
    // ---
    let second_reader = backplane_over(&transports, "reader-b");
    let (_handle, mut fresh_stream) = second_reader
        .subscribe("config.shared")
        .await
        .expect("subscribe failed");

    // ---
    // Assert: replay is unaffected by the other identity's acks.
    // ---
    for revision in [1, 2] {
        let message = timeout(RECV_TIMEOUT, fresh_stream.recv())
            .await
            .expect("timed out waiting for replayed message")
            .expect("stream closed unexpectedly");
        let decoded = Payload::decode(Payload::KIND_CONFIG_DOCUMENT, &message.payload)
            .expect("payload did not decode as a config document");
        assert_eq!(decoded, Payload::ConfigDocument(sample_document(revision)));
    }
}

#[tokio::test]
async fn broadcast_handle_close_stops_delivery() {
    // ---
    let transports = create_memory_transports();
    let backplane = backplane_over(&transports, "ctl");

    let (handle, mut stream) = backplane
        .subscribe("subscription.ctl")
        .await
        .expect("subscribe failed");

    backplane
        .publish(
            "subscription.ctl",
            Payload::SignedSubscription(sample_descriptor()),
        )
        .await
        .expect("publish failed");

    timeout(RECV_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for message")
        .expect("stream closed unexpectedly");

    // ---
    // Act
    // ---
    handle.close().await.expect("close failed");

    backplane
        .publish(
            "subscription.ctl",
            Payload::SignedSubscription(sample_descriptor()),
        )
        .await
        .expect("publish failed");

    // ---
    // Assert: the stream ends instead of delivering.
    // ---
    let next = timeout(Duration::from_millis(500), stream.recv())
        .await
        .expect("timed out waiting for stream to close");
    assert!(next.is_none(), "message delivered after close");
}
