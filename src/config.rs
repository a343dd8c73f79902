//! Layered configuration.
//!
//! Settings come from, in increasing priority: built-in defaults, an
//! optional TOML file, `SMOKEWATCH_*` environment variables, then command
//! line flags (applied by the binary).
//!
//! ```toml
//! [broker]
//! host = "localhost"
//!
//! [queues]
//! smoker = "01-smoker"
//!
//! [producer]
//! input = "smoker-temps.csv"
//! delay = "30s"
//!
//! [alert]
//! window_size = 5
//! threshold = -15.0
//! ```
//!
//! Nested keys map to environment variables with a double underscore, e.g.
//! `SMOKEWATCH_BROKER__HOST=rabbit.local`.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use smokewatch_types::Channel;

use crate::data::duration::parse_duration;
use crate::data::AlertPolicy;
use crate::PipelineError;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SMOKEWATCH";

/// All runtime settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub queues: QueueSettings,
    pub producer: ProducerSettings,
    pub alert: AlertSettings,
    pub management: ManagementSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    ///
    /// A file that is named explicitly must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.producer.delay()?;
        self.alert.policy()?;

        let names = Channel::ALL.map(|c| self.queues.queue(c));
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(PipelineError::Config("queue names must not be empty".into()));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(PipelineError::Config(
                "each channel needs its own queue".into(),
            ));
        }
        Ok(())
    }
}

/// Broker connection settings.
///
/// Workers always consume with a prefetch of one, so there is no setting
/// for it and unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSettings {
    /// Broker host name or address.
    pub host: String,
    /// AMQP port.
    pub port: u16,
    /// Virtual host.
    pub vhost: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Full AMQP URI; overrides the individual fields when set.
    pub url: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            vhost: "/".to_string(),
            username: None,
            password: None,
            url: None,
        }
    }
}

impl BrokerSettings {
    /// AMQP URI to connect to.
    pub fn amqp_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let userinfo = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        format!(
            "amqp://{}{}:{}/{}",
            userinfo,
            self.host,
            self.port,
            self.vhost.replace('/', "%2f")
        )
    }
}

/// Queue name for each channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub smoker: String,
    pub food_a: String,
    pub food_b: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            smoker: Channel::Smoker.default_queue().to_string(),
            food_a: Channel::FoodA.default_queue().to_string(),
            food_b: Channel::FoodB.default_queue().to_string(),
        }
    }
}

impl QueueSettings {
    /// Queue owned by a channel.
    pub fn queue(&self, channel: Channel) -> &str {
        match channel {
            Channel::Smoker => &self.smoker,
            Channel::FoodA => &self.food_a,
            Channel::FoodB => &self.food_b,
        }
    }

    /// Channel that owns a queue, if any.
    pub fn channel_for(&self, queue: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| self.queue(*c) == queue)
    }

    /// All queue names, in publish order.
    pub fn all(&self) -> [&str; 3] {
        Channel::ALL.map(|c| self.queue(c))
    }
}

/// Producer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    /// CSV capture to replay.
    pub input: PathBuf,
    /// Pause between readings, e.g. "30s".
    pub delay: String,
    /// Delete the channel queues before publishing.
    pub reset_queues: bool,
    /// Whether the first CSV row is a header.
    pub has_headers: bool,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("smoker-temps.csv"),
            delay: "30s".to_string(),
            reset_queues: true,
            has_headers: true,
        }
    }
}

impl ProducerSettings {
    pub fn delay(&self) -> Result<Duration, PipelineError> {
        parse_duration(&self.delay)
            .map_err(|e| PipelineError::Config(format!("producer.delay: {}", e)))
    }
}

/// Smoker alert settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub window_size: usize,
    pub threshold: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        let policy = AlertPolicy::default();
        Self {
            window_size: policy.window_size.get(),
            threshold: policy.threshold,
        }
    }
}

impl AlertSettings {
    pub fn policy(&self) -> Result<AlertPolicy, PipelineError> {
        let window_size = NonZeroUsize::new(self.window_size)
            .ok_or_else(|| PipelineError::Config("alert.window_size must be at least 1".into()))?;
        if !self.threshold.is_finite() {
            return Err(PipelineError::Config("alert.threshold must be finite".into()));
        }
        Ok(AlertPolicy {
            window_size,
            threshold: self.threshold,
        })
    }
}

/// RabbitMQ Management API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagementSettings {
    /// Management endpoint; defaults to port 15672 on the broker host.
    pub url: Option<String>,
    pub username: String,
    pub password: String,
}

impl Default for ManagementSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

impl ManagementSettings {
    pub fn endpoint(&self, broker: &BrokerSettings) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("http://{}:15672", broker.host))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
