//! Shared connection registry
//!
//! Owns the one live connection of the process. Construct it once at startup
//! and hand it to every consumer behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::connector::BackoffConnector;
use super::redact::redact_endpoint;
use super::traits::{DatabaseClient, Driver};
use crate::Result;
use crate::config::Config;

/// Holds at most one live [`DatabaseClient`]
///
/// `get_connection` reuses the current client when it targets the requested
/// endpoint and passes the liveness probe. Otherwise the current client is
/// closed and a new one is opened through the [`BackoffConnector`]. The slot
/// lock is held across connection establishment, so concurrent callers never
/// open two connections at once.
pub struct ConnectionRegistry {
    connector: BackoffConnector,
    probe_timeout: Duration,
    current: Mutex<Option<Arc<dyn DatabaseClient>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: BackoffConnector) -> Self {
        Self {
            connector,
            probe_timeout: Duration::from_secs(2),
            current: Mutex::new(None),
        }
    }

    /// Build a registry from configuration
    pub fn from_config(driver: Arc<dyn Driver>, config: &Config) -> Self {
        let connector = BackoffConnector::new(driver, config.backoff.clone())
            .with_timeout(config.memory.operation_timeout());
        Self::new(connector).with_probe_timeout(config.memory.probe_timeout())
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Healthy connection to `endpoint`
    ///
    /// # Errors
    /// `Error::ConnectionExhausted` when a new connection is needed and every
    /// attempt fails. The registry is left empty in that case.
    pub async fn get_connection(&self, endpoint: &str) -> Result<Arc<dyn DatabaseClient>> {
        let mut slot = self.current.lock().await;

        // The client stays in the slot until it is closed, so a caller
        // cancelled during the liveness check leaves the registry intact.
        if let Some(client) = slot.as_ref().cloned() {
            if client.endpoint() == endpoint {
                if self.probe(client.as_ref()).await {
                    debug!(endpoint = %redact_endpoint(endpoint), "Reusing connection");
                    return Ok(client);
                }
                warn!(
                    endpoint = %redact_endpoint(endpoint),
                    "Connection failed liveness probe, reconnecting"
                );
            } else {
                info!(
                    from = %redact_endpoint(client.endpoint()),
                    to = %redact_endpoint(endpoint),
                    "Endpoint changed, replacing connection"
                );
            }
            client.close().await;
            *slot = None;
        }

        let client = self.connector.connect(endpoint).await?;
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Endpoint of the current connection, if any
    pub async fn current_endpoint(&self) -> Option<String> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|client| client.endpoint().to_string())
    }

    /// Close and drop the current connection
    pub async fn close(&self) {
        if let Some(client) = self.current.lock().await.take() {
            info!(endpoint = %redact_endpoint(client.endpoint()), "Closing connection");
            client.close().await;
        }
    }

    async fn probe(&self, client: &dyn DatabaseClient) -> bool {
        tokio::time::timeout(self.probe_timeout, client.is_connected())
            .await
            .unwrap_or(false)
    }
}
