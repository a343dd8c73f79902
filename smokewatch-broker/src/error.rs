//! Error types for broker clients.

use thiserror::Error;

/// Errors that can occur when talking to a message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker unreachable, or the connection dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Channel could not be opened or was closed by the broker.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The named queue has not been declared.
    #[error("Queue '{0}' not found")]
    QueueNotFound(String),

    /// This client has already been closed.
    #[error("Connection already closed")]
    Closed,

    /// Broker rejected an operation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HTTP request to the management API failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse a management API response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Timeout waiting for the management API.
    #[error("Request timed out")]
    Timeout,
}

impl BrokerError {
    /// Whether this error means the connection itself is gone.
    pub fn is_connection(&self) -> bool {
        matches!(self, BrokerError::Connection(_) | BrokerError::Closed)
    }
}

#[cfg(feature = "rabbitmq")]
impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(e) => BrokerError::Connection(e.to_string()),
            lapin::Error::InvalidConnectionState(state) => {
                BrokerError::Connection(format!("invalid connection state: {:?}", state))
            }
            lapin::Error::InvalidChannelState(state) => {
                BrokerError::Channel(format!("invalid channel state: {:?}", state))
            }
            lapin::Error::ProtocolError(e) => BrokerError::Protocol(e.to_string()),
            other => BrokerError::Protocol(other.to_string()),
        }
    }
}

#[cfg(feature = "management")]
impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrokerError::Timeout
        } else if err.is_connect() {
            BrokerError::Connection(err.to_string())
        } else {
            BrokerError::Http(err.to_string())
        }
    }
}
