//! Queue status via the RabbitMQ Management HTTP API.
//!
//! The management plugin usually listens on port 15672. Its web UI lists
//! the same numbers at `http://<host>:15672/#/queues`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smokewatch_broker::management::ManagementClient;
//!
//! # async fn run() -> Result<(), smokewatch_broker::BrokerError> {
//! let client = ManagementClient::builder()
//!     .endpoint("http://rabbit.local:15672")
//!     .build()?;
//!
//! let stats = client.queue("01-smoker").await?;
//! println!(
//!     "{}: {} ready, {} unacked",
//!     stats.name, stats.messages_ready, stats.messages_unacknowledged
//! );
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::BrokerError;

/// Where the management plugin listens on a local broker.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:15672";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth and consumer count of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name.
    pub name: String,
    /// Whether the queue survives a broker restart.
    #[serde(default)]
    pub durable: bool,
    /// Messages waiting to be delivered.
    #[serde(default)]
    pub messages_ready: u64,
    /// Messages delivered but not yet acknowledged.
    #[serde(default)]
    pub messages_unacknowledged: u64,
    /// Consumers attached to the queue.
    #[serde(default)]
    pub consumers: u32,
}

/// Client for the RabbitMQ Management HTTP API.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    vhost: String,
}

impl ManagementClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> ManagementClientBuilder {
        ManagementClientBuilder::default()
    }

    /// Link to the queue overview in the management web UI.
    pub fn admin_url(&self) -> String {
        format!("{}/#/queues", self.endpoint)
    }

    /// Stats for one queue.
    pub async fn queue(&self, queue_name: &str) -> Result<QueueStats, BrokerError> {
        let url = format!(
            "{}/api/queues/{}/{}",
            self.endpoint,
            path_segment(&self.vhost),
            path_segment(queue_name)
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(BrokerError::Auth(format!(
                "management API refused user '{}'",
                self.username
            ))),
            StatusCode::NOT_FOUND => Err(BrokerError::QueueNotFound(queue_name.to_string())),
            status if !status.is_success() => Err(BrokerError::Http(format!(
                "{} answered {}",
                url, status
            ))),
            _ => response
                .json::<QueueStats>()
                .await
                .map_err(|e| BrokerError::Parse(e.to_string())),
        }
    }
}

/// Builder for [`ManagementClient`].
///
/// Defaults match a stock local RabbitMQ: `http://localhost:15672`, user
/// `guest`, vhost `/`. Each request gives up after ten seconds.
#[derive(Debug)]
pub struct ManagementClientBuilder {
    endpoint: String,
    username: String,
    password: String,
    vhost: String,
}

impl Default for ManagementClientBuilder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl ManagementClientBuilder {
    /// Base URL of the management plugin. A trailing slash is ignored.
    pub fn endpoint(self, endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Basic-auth user and password.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..self
        }
    }

    /// Virtual host whose queues are listed.
    pub fn vhost(self, vhost: impl Into<String>) -> Self {
        Self {
            vhost: vhost.into(),
            ..self
        }
    }

    pub fn build(self) -> Result<ManagementClient, BrokerError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Http(format!("cannot create HTTP client: {}", e)))?;

        Ok(ManagementClient {
            client,
            endpoint: self.endpoint,
            username: self.username,
            password: self.password,
            vhost: self.vhost,
        })
    }
}

/// Percent-encode the characters that matter in a path segment.
fn path_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client() {
        let client = ManagementClient::builder().build().unwrap();
        assert_eq!(client.endpoint, "http://localhost:15672");
        assert_eq!(client.username, "guest");
        assert_eq!(client.password, "guest");
        assert_eq!(client.vhost, "/");
        assert_eq!(client.admin_url(), "http://localhost:15672/#/queues");
    }

    #[test]
    fn test_configured_client() {
        let client = ManagementClient::builder()
            .endpoint("http://rabbit.local:15672/")
            .credentials("pitmaster", "brisket")
            .vhost("smoker")
            .build()
            .unwrap();

        assert_eq!(client.endpoint, "http://rabbit.local:15672");
        assert_eq!(client.username, "pitmaster");
        assert_eq!(client.password, "brisket");
        assert_eq!(client.vhost, "smoker");
    }

    #[test]
    fn test_path_segment() {
        assert_eq!(path_segment("/"), "%2F");
        assert_eq!(path_segment("my/vhost"), "my%2Fvhost");
        assert_eq!(path_segment("01-smoker"), "01-smoker");
    }

    #[test]
    fn test_queue_stats_from_api_json() {
        let json = r#"{
            "name": "01-smoker",
            "durable": true,
            "messages_ready": 12,
            "messages_unacknowledged": 1,
            "consumers": 2,
            "vhost": "/"
        }"#;
        let stats: QueueStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.name, "01-smoker");
        assert!(stats.durable);
        assert_eq!(stats.messages_ready, 12);
        assert_eq!(stats.messages_unacknowledged, 1);
        assert_eq!(stats.consumers, 2);
    }

    #[test]
    fn test_queue_stats_missing_counters() {
        let stats: QueueStats = serde_json::from_str(r#"{"name": "02-food-A"}"#).unwrap();
        assert_eq!(stats.messages_ready, 0);
        assert_eq!(stats.consumers, 0);
    }
}
