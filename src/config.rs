// src/config.rs

//! Backplane configuration.
//!
//! A `BackplaneConfig` is constructed once at process start — explicitly or
//! from the environment — and passed by value into [`Backplane::connect`].
//! There is no process-global configuration state.
//!
//! [`Backplane::connect`]: crate::Backplane::connect

use std::time::Duration;

use crate::macros::log_warn;

const ENV_CLUSTER_NAME: &str = "BACKPLANE_CLUSTER_NAME";
const ENV_URL: &str = "BACKPLANE_URL";
const ENV_ACK_WAIT_SECS: &str = "BACKPLANE_ACK_WAIT_SECS";
const ENV_CLIENT_ID: &str = "BACKPLANE_CLIENT_ID";

/// Transport connection parameters and delivery tuning.
#[derive(Debug, Clone)]
pub struct BackplaneConfig {
    /// Cluster identifier of the durable streaming deployment.
    pub cluster_name: String,

    /// Transport endpoint URL, shared by both connections.
    pub transport_url: String,

    /// Redelivery timeout for durable subscriptions: an unacknowledged
    /// message is delivered again after this long.
    pub ack_wait: Duration,

    /// Stable client identity, used to derive durable subscription names.
    ///
    /// When `None`, a random identity is generated per [`Backplane`];
    /// durable subscriptions are then resumable only within that
    /// instance's lifetime.
    ///
    /// [`Backplane`]: crate::Backplane
    pub client_id: Option<String>,
}

impl Default for BackplaneConfig {
    /// Defaults: cluster `"backplane"`, URL `"nats://localhost:4222"`,
    /// ack-wait 1 second, random client identity.
    fn default() -> Self {
        Self {
            cluster_name: "backplane".to_string(),
            transport_url: "nats://localhost:4222".to_string(),
            ack_wait: Duration::from_secs(1),
            client_id: None,
        }
    }
}

impl BackplaneConfig {
    /// Read configuration from the environment.
    ///
    /// Recognized keys: `BACKPLANE_CLUSTER_NAME`, `BACKPLANE_URL`,
    /// `BACKPLANE_ACK_WAIT_SECS`, `BACKPLANE_CLIENT_ID`. Unset keys fall
    /// back to the defaults; an unparseable ack-wait falls back too, with
    /// a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ack_wait = match std::env::var(ENV_ACK_WAIT_SECS) {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_err) => {
                    log_warn!("{ENV_ACK_WAIT_SECS}={raw} is not a number: {_err}");
                    defaults.ack_wait
                }
            },
            Err(_) => defaults.ack_wait,
        };

        Self {
            cluster_name: std::env::var(ENV_CLUSTER_NAME).unwrap_or(defaults.cluster_name),
            transport_url: std::env::var(ENV_URL).unwrap_or(defaults.transport_url),
            ack_wait,
            client_id: std::env::var(ENV_CLIENT_ID).ok(),
        }
    }

    /// Set the cluster identifier.
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Set the transport endpoint URL.
    pub fn with_transport_url(mut self, url: impl Into<String>) -> Self {
        self.transport_url = url.into();
        self
    }

    /// Set the durable redelivery timeout.
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    /// Set a stable client identity.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}
