//! Counters emitted by the client.
//!
//! Each counter carries a `port` label naming the connection. Nothing is
//! recorded unless the application installs a `metrics` recorder; call
//! [`describe_metrics`] once after installing it to register descriptions.
//!
//! ```rust
//! use rpclite_client::metrics::metric_defs;
//!
//! assert_eq!(metric_defs::CALLS.name, "rpclite.client.calls");
//! ```

use ::metrics::{describe_counter, Unit};

/// A counter declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g. `rpclite.client.calls`).
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Label keys attached on every increment.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            labels: &[],
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        describe_counter!(self.name, Unit::Count, self.description);
    }
}

/// All client metric definitions.
pub mod metric_defs {
    use super::Metric;

    /// Labels present on every client metric.
    pub const CLIENT_LABELS: &[&str] = &["port"];

    pub const CALLS: Metric = Metric::counter("rpclite.client.calls")
        .with_description("Requests written to the device")
        .with_labels(CLIENT_LABELS);

    pub const TIMEOUTS: Metric = Metric::counter("rpclite.client.timeouts")
        .with_description("Calls abandoned because their deadline elapsed")
        .with_labels(CLIENT_LABELS);

    pub const REMOTE_ERRORS: Metric = Metric::counter("rpclite.client.remote_errors")
        .with_description("Calls answered with an error payload")
        .with_labels(CLIENT_LABELS);

    pub const NOTIFIES_SENT: Metric = Metric::counter("rpclite.client.notifies_sent")
        .with_description("Notifications written to the device")
        .with_labels(CLIENT_LABELS);

    pub const NOTIFIES_RECEIVED: Metric = Metric::counter("rpclite.client.notifies_received")
        .with_description("Notifications received from the device")
        .with_labels(CLIENT_LABELS);

    pub const ORPHAN_RESPONSES: Metric = Metric::counter("rpclite.client.orphan_responses")
        .with_description("Responses dropped because no call was waiting on their id")
        .with_labels(CLIENT_LABELS);

    pub const FRAMING_ERRORS: Metric = Metric::counter("rpclite.client.framing_errors")
        .with_description("Runs of undecodable bytes discarded from the input stream")
        .with_labels(CLIENT_LABELS);

    pub const ALL: &[&Metric] = &[
        &CALLS,
        &TIMEOUTS,
        &REMOTE_ERRORS,
        &NOTIFIES_SENT,
        &NOTIFIES_RECEIVED,
        &ORPHAN_RESPONSES,
        &FRAMING_ERRORS,
    ];
}

/// Register descriptions for every client metric.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_unique() {
        let names: HashSet<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_all_metrics_described() {
        for metric in metric_defs::ALL {
            assert!(metric.name.starts_with("rpclite.client."));
            assert!(!metric.description.is_empty(), "{} has no description", metric.name);
            assert_eq!(metric.labels, metric_defs::CLIENT_LABELS);
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
