//! Smoker temperature-drop detection.
//!
//! The smoker channel is watched through a trailing window of the most
//! recent readings. Once the window has filled, every new reading is
//! compared against the oldest one still in the window; a drop of at least
//! the configured threshold raises an alert.
//!
//! The comparison is recomputed from scratch on every message, so a single
//! transient dip can flip between alert and normal as it slides through the
//! window.

use std::num::NonZeroUsize;

use smokewatch_types::ChannelMessage;

use super::window::SlidingWindow;

/// Window size and drop threshold for the smoker channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    /// Number of readings in the trailing window.
    ///
    /// Five readings at one every 30 seconds span 2.5 minutes.
    pub window_size: NonZeroUsize,
    /// Change in degrees across the window at or below which an alert fires.
    pub threshold: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            window_size: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            threshold: -15.0,
        }
    }
}

/// What a worker concluded from one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Window still filling; no classification yet.
    Filling { received: u64, capacity: usize },
    /// Window full, temperature within bounds.
    Normal { delta: f64 },
    /// Window full, temperature dropped by the threshold or more.
    Alert { delta: f64 },
    /// Window full, but the newest or oldest reading has no value.
    Incomplete,
    /// Channel is not analysed; the message was only logged.
    Logged,
}

impl Observation {
    pub fn is_alert(&self) -> bool {
        matches!(self, Observation::Alert { .. })
    }
}

/// Worker-owned state for the smoker channel.
#[derive(Debug, Clone)]
pub struct SmokerMonitor {
    window: SlidingWindow<ChannelMessage>,
    threshold: f64,
}

impl SmokerMonitor {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            window: SlidingWindow::new(policy.window_size),
            threshold: policy.threshold,
        }
    }

    /// Add a message to the window and classify the trend.
    pub fn observe(&mut self, message: ChannelMessage) -> Observation {
        self.window.push(message);

        if !self.window.is_full() {
            return Observation::Filling {
                received: self.window.received(),
                capacity: self.window.capacity(),
            };
        }

        let current = self.window.newest().and_then(|m| m.temperature);
        let oldest = self.window.oldest().and_then(|m| m.temperature);
        match (current, oldest) {
            (Some(current), Some(oldest)) => classify(round_tenths(current - oldest), self.threshold),
            _ => Observation::Incomplete,
        }
    }

    pub fn window(&self) -> &SlidingWindow<ChannelMessage> {
        &self.window
    }
}

/// Classify an already-rounded change across the window.
pub fn classify(delta: f64, threshold: f64) -> Observation {
    if delta <= threshold {
        Observation::Alert { delta }
    } else {
        Observation::Normal { delta }
    }
}

/// Round to one decimal place, half to even on the exact binary value.
pub fn round_tenths(value: f64) -> f64 {
    // Formatting rounds on the exact value, unlike `(value * 10.0).round()`.
    format!("{:.1}", value).parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(monitor: &mut SmokerMonitor, temps: &[f64]) -> Vec<Observation> {
        temps
            .iter()
            .enumerate()
            .map(|(i, t)| monitor.observe(ChannelMessage::new(format!("t{}", i), Some(*t))))
            .collect()
    }

    #[test]
    fn test_no_classification_before_window_fills() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        let observations = feed(&mut monitor, &[100.0, 50.0, 20.0, 0.0]);
        for (i, obs) in observations.iter().enumerate() {
            assert_eq!(
                *obs,
                Observation::Filling {
                    received: i as u64 + 1,
                    capacity: 5
                }
            );
        }
    }

    #[test]
    fn test_drop_of_sixteen_alerts() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        let observations = feed(&mut monitor, &[100.0, 98.0, 95.0, 90.0, 84.0]);
        assert_eq!(observations[4], Observation::Alert { delta: -16.0 });
    }

    #[test]
    fn test_gentle_decline_is_normal() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        let observations = feed(&mut monitor, &[100.0, 99.0, 98.0, 97.0, 96.0]);
        assert_eq!(observations[4], Observation::Normal { delta: -4.0 });
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        let observations = feed(&mut monitor, &[100.0, 100.0, 100.0, 100.0, 85.0]);
        assert_eq!(observations[4], Observation::Alert { delta: -15.0 });
    }

    #[test]
    fn test_rounding_applies_before_comparison() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        // -14.96 rounds to -15.0 and alerts; -14.94 rounds to -14.9 and does not.
        let observations = feed(&mut monitor, &[100.0, 0.0, 0.0, 0.0, 85.04]);
        assert_eq!(observations[4], Observation::Alert { delta: -15.0 });

        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        let observations = feed(&mut monitor, &[100.0, 0.0, 0.0, 0.0, 85.06]);
        assert_eq!(observations[4], Observation::Normal { delta: -14.9 });
    }

    #[test]
    fn test_transient_dip_alternates() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        let observations = feed(
            &mut monitor,
            &[100.0, 100.0, 100.0, 100.0, 80.0, 100.0, 100.0, 100.0, 100.0, 100.0],
        );
        assert!(observations[4].is_alert());
        assert_eq!(observations[5], Observation::Normal { delta: 0.0 });
        // The dip is now the oldest entry: recovery reads as a rise.
        assert_eq!(observations[8], Observation::Normal { delta: 20.0 });
        assert_eq!(observations[9], Observation::Normal { delta: 0.0 });
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        feed(&mut monitor, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let temps: Vec<f64> = monitor
            .window()
            .iter()
            .filter_map(|m| m.temperature)
            .collect();
        assert_eq!(temps, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_absent_reading_is_incomplete() {
        let mut monitor = SmokerMonitor::new(AlertPolicy::default());
        feed(&mut monitor, &[100.0, 99.0, 98.0, 97.0]);
        assert_eq!(
            monitor.observe(ChannelMessage::new("t4", None)),
            Observation::Incomplete
        );
        // The gap still occupies a slot.
        assert_eq!(monitor.window().len(), 5);
        assert_eq!(
            monitor.observe(ChannelMessage::new("t5", Some(80.0))),
            Observation::Alert { delta: -19.0 }
        );
    }

    #[test]
    fn test_custom_policy() {
        let policy = AlertPolicy {
            window_size: NonZeroUsize::new(2).unwrap(),
            threshold: -5.0,
        };
        let mut monitor = SmokerMonitor::new(policy);
        let observations = feed(&mut monitor, &[225.0, 219.0]);
        assert!(matches!(observations[0], Observation::Filling { .. }));
        assert_eq!(observations[1], Observation::Alert { delta: -6.0 });
    }

    #[test]
    fn test_round_tenths() {
        assert_eq!(round_tenths(-16.0), -16.0);
        assert_eq!(round_tenths(-15.04), -15.0);
        assert_eq!(round_tenths(3.26), 3.3);
        assert_eq!(round_tenths(0.0), 0.0);
    }
}
