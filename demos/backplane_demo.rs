// demos/backplane_demo.rs

//! End-to-end walk through the backplane API: publish a config document,
//! subscribe with replay, acknowledge the delivery, close everything.
//!
//! Runs over the in-memory transport pair by default:
//!
//! ```sh
//! cargo run --example backplane_demo
//! ```

use bytes::Bytes;

use backplane_pubsub::{Backplane, BackplaneConfig, ConfigDocument, Payload};

#[tokio::main]
async fn main() -> backplane_pubsub::Result<()> {
    // ---
    let config = BackplaneConfig::from_env().with_client_id("demo");
    let backplane = Backplane::connect(config).await?;

    backplane
        .publish(
            "config.demo",
            Payload::ConfigDocument(ConfigDocument {
                key: "demo/greeting".to_string(),
                revision: 1,
                body: Bytes::from_static(b"hello"),
            }),
        )
        .await?;

    // Subscribing after the publish still sees the document: config
    // topics replay everything retained on the subject.
    let (handle, mut stream) = backplane.subscribe("config.demo").await?;

    let message = stream.recv().await.expect("stream closed");
    let document = Payload::decode(Payload::KIND_CONFIG_DOCUMENT, &message.payload)?;
    println!("received: {document:?}");

    let failed = backplane.acknowledge([message.ack_token]).await?;
    assert!(failed.is_empty(), "ack forwarding failed: {failed:?}");

    handle.close().await?;
    backplane.close().await
}
