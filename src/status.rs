//! Queue depth report from the RabbitMQ Management API.

use serde::Serialize;
use smokewatch_broker::management::{ManagementClient, QueueStats};
use smokewatch_broker::BrokerError;
use smokewatch_types::Channel;

use crate::config::QueueSettings;
use crate::PipelineError;

/// One channel queue as seen by the management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: &'static str,
    pub queue: String,
    /// `None` when the queue has not been declared.
    pub stats: Option<QueueStats>,
}

/// Fetch stats for every channel queue.
///
/// Queues that do not exist yet are reported rather than treated as errors.
pub async fn collect(
    client: &ManagementClient,
    queues: &QueueSettings,
) -> Result<Vec<ChannelStatus>, PipelineError> {
    let mut rows = Vec::with_capacity(Channel::ALL.len());
    for channel in Channel::ALL {
        let queue = queues.queue(channel);
        let stats = match client.queue(queue).await {
            Ok(stats) => Some(stats),
            Err(BrokerError::QueueNotFound(_)) => None,
            Err(e) => return Err(PipelineError::from_broker(&client.admin_url(), e)),
        };
        rows.push(ChannelStatus {
            channel: channel.label(),
            queue: queue.to_string(),
            stats,
        });
    }
    Ok(rows)
}

/// Render rows as a fixed-width text table.
pub fn render_table(rows: &[ChannelStatus]) -> String {
    let width = rows
        .iter()
        .map(|r| r.queue.len())
        .chain(std::iter::once("QUEUE".len()))
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "{:<8} {:<width$} {:>7} {:>8} {:>10}\n",
        "CHANNEL", "QUEUE", "READY", "UNACKED", "CONSUMERS"
    );
    for row in rows {
        match &row.stats {
            Some(stats) => out.push_str(&format!(
                "{:<8} {:<width$} {:>7} {:>8} {:>10}\n",
                row.channel,
                row.queue,
                stats.messages_ready,
                stats.messages_unacknowledged,
                stats.consumers
            )),
            None => out.push_str(&format!(
                "{:<8} {:<width$} (not declared)\n",
                row.channel, row.queue
            )),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, ready: u64, unacked: u64, consumers: u32) -> QueueStats {
        QueueStats {
            name: name.to_string(),
            durable: true,
            messages_ready: ready,
            messages_unacknowledged: unacked,
            consumers,
        }
    }

    #[test]
    fn test_render_table() {
        let rows = vec![
            ChannelStatus {
                channel: "smoker",
                queue: "01-smoker".into(),
                stats: Some(stats("01-smoker", 12, 1, 1)),
            },
            ChannelStatus {
                channel: "food-A",
                queue: "02-food-A".into(),
                stats: None,
            },
        ];

        let table = render_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "CHANNEL  QUEUE       READY  UNACKED  CONSUMERS"
        );
        assert_eq!(
            lines[1],
            "smoker   01-smoker      12        1          1"
        );
        assert_eq!(lines[2], "food-A   02-food-A (not declared)");
    }

    #[test]
    fn test_status_serializes() {
        let row = ChannelStatus {
            channel: "food-B",
            queue: "03-food-B".into(),
            stats: None,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["channel"], "food-B");
        assert!(json["stats"].is_null());
    }
}
