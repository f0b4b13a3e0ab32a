use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::messages::DeliveryMode;
use crate::NodeId;

/// The traffic one delivery test generates, by delivery mode.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Workload {
    /// Single-hop sends to each destination.
    Direct { destinations: Vec<NodeId> },

    /// Sends along explicit paths. Each route lists the intermediate hops
    /// followed by the destination as its last element.
    Routed { routes: Vec<Vec<NodeId>> },

    /// Broadcast-style sends with no route lookup.
    Flood { destinations: Vec<NodeId> },
}

/// Parameters of one delivery test.
///
/// `max_time_secs` and `max_iterations` use the configuration convention
/// that a value `<= 0` means unbounded; use [`TestConfiguration::time_bound`]
/// and [`TestConfiguration::iteration_bound`] to read them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestConfiguration {
    pub name: String,

    #[serde(default)]
    pub max_time_secs: i64,

    #[serde(default)]
    pub max_iterations: i64,

    /// Pause after every pass over the destination list.
    #[serde(default, with = "humantime_serde")]
    pub iteration_delay: Duration,

    #[serde(flatten)]
    pub workload: Workload,
}

impl TestConfiguration {
    pub fn mode(&self) -> DeliveryMode {
        match self.workload {
            Workload::Direct { .. } => DeliveryMode::Direct,
            Workload::Routed { .. } => DeliveryMode::Routed,
            Workload::Flood { .. } => DeliveryMode::Flood,
        }
    }

    /// Run time limit, `None` when unbounded.
    pub fn time_bound(&self) -> Option<Duration> {
        u64::try_from(self.max_time_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Iteration limit, `None` when unbounded.
    pub fn iteration_bound(&self) -> Option<u64> {
        u64::try_from(self.max_iterations).ok().filter(|n| *n > 0)
    }

    /// A test needs at least one positive bound to be runnable.
    pub fn is_bounded(&self) -> bool {
        self.time_bound().is_some() || self.iteration_bound().is_some()
    }
}

/// Accumulated results of one delivery test.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestStats {
    pub config: TestConfiguration,
    pub success_count: u64,
    pub fail_count: u64,
    pub run_count: u64,
    pub run_time_secs: u64,
}

impl TestStats {
    pub fn new(config: TestConfiguration) -> Self {
        Self {
            config,
            success_count: 0,
            fail_count: 0,
            run_count: 0,
            run_time_secs: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Count one send attempt and its outcome.
    pub fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
        self.run_count += 1;
    }

    /// Fraction of attempts that succeeded, 0.0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.run_count as f64
        }
    }
}

/// Results of a whole suite run, in configured order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TestSummary {
    pub tests: Vec<TestStats>,
}

impl TestSummary {
    pub fn new(configs: impl IntoIterator<Item = TestConfiguration>) -> Self {
        Self {
            tests: configs.into_iter().map(TestStats::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Format the summary as fixed-width table rows, header first.
    pub fn render_table(&self) -> Vec<String> {
        let mut rows = Vec::with_capacity(self.tests.len() + 2);
        rows.push(format!(
            "{:<24} {:<7} {:>8} {:>8} {:>8} {:>9}",
            "TEST", "MODE", "SUCCESS", "FAIL", "RUN", "TIME(s)"
        ));
        rows.push("-".repeat(69));
        for stats in &self.tests {
            rows.push(format!(
                "{:<24} {:<7} {:>8} {:>8} {:>8} {:>9}",
                stats.name(),
                stats.config.mode().to_string(),
                stats.success_count,
                stats.fail_count,
                stats.run_count,
                stats.run_time_secs
            ));
        }
        rows
    }
}
