//! Pipeline error types.

use smokewatch_broker::BrokerError;
use smokewatch_types::DecodeError;
use thiserror::Error;

/// Errors that end a producer or worker run.
///
/// Temperature cells that fail to parse are not errors: they become absent
/// values at the source.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Broker unreachable, or the connection dropped.
    #[error("Connection to broker at {host} failed: {source}")]
    Connection {
        host: String,
        #[source]
        source: BrokerError,
    },

    /// Broker rejected an operation on an open connection.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A delivered message could not be processed. It is left unacknowledged.
    #[error("Failed to process delivery {delivery_tag}: {reason}")]
    Processing { delivery_tag: u64, reason: String },

    /// The reading source could not be opened.
    #[error("Reading source error: {0}")]
    Source(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Wrap a broker error, classifying lost connections as fatal connection errors.
    pub fn from_broker(host: &str, err: BrokerError) -> Self {
        if err.is_connection() {
            PipelineError::Connection {
                host: host.to_string(),
                source: err,
            }
        } else {
            PipelineError::Broker(err)
        }
    }

    pub(crate) fn undecodable(delivery_tag: u64, err: DecodeError) -> Self {
        PipelineError::Processing {
            delivery_tag,
            reason: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_connection_is_connection_error() {
        let err = PipelineError::from_broker(
            "localhost",
            BrokerError::Connection("reset by peer".to_string()),
        );
        assert!(matches!(err, PipelineError::Connection { ref host, .. } if host == "localhost"));
        assert!(err.to_string().contains("localhost"));
    }

    #[test]
    fn test_protocol_error_is_broker_error() {
        let err = PipelineError::from_broker("localhost", BrokerError::Protocol("nope".into()));
        assert!(matches!(err, PipelineError::Broker(_)));
    }

    #[test]
    fn test_undecodable_message() {
        let err = PipelineError::undecodable(7, DecodeError::NotAPair);
        assert_eq!(
            err.to_string(),
            "Failed to process delivery 7: payload is not a (timestamp, temperature) pair"
        );
    }
}
