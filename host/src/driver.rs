//! Delivery test driver.
//!
//! Runs the configured direct, routed and flood workloads against the node
//! and accumulates per-test statistics. Failures are scoped: a failed send
//! is counted and the loop goes on, a failed delivery-mode setup aborts only
//! that test, and the remaining tests always run.

use async_trait::async_trait;
use log::debug;
use meshwork_lib::messages::{DeliveryMode, ProtocolMessage};
use meshwork_lib::stats::{TestStats, TestSummary, Workload};
use meshwork_lib::NodeId;
use std::fmt;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::config::HostConfig;
use crate::controller::{DispatchLoop, ReadySignal, ShutdownSignal};
use crate::dispatcher::{Dispatcher, ExchangeError};
use crate::routing::RoutingTable;
use crate::transport::Transport;

/// Every test send goes to this port so the configuration only lists nodes.
pub const TEST_PORT: u8 = 5;

pub const TEST_PAYLOAD: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

const COMPONENT: &str = "DeliveryTest";

const BANNER: &str = "======================================";
const SEPARATOR: &str = "--------------------------------------";

/// Node-wide settings sent with every delivery-mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub node_id: NodeId,
    pub nwkcaps: u8,
    pub retry: u8,
}

impl From<&HostConfig> for DriverSettings {
    fn from(config: &HostConfig) -> Self {
        Self {
            node_id: config.node_id,
            nwkcaps: config.nwkcaps,
            retry: config.retry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither the time nor the iteration bound is positive.
    NoBounds,
    NoDestinations,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoBounds => f.write_str("both time and iterations parameters are invalid"),
            SkipReason::NoDestinations => f.write_str("destination list is empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Completed,
    Skipped(SkipReason),
    /// The node could not be switched to the test's delivery mode.
    Aborted(String),
    /// A stop was requested before the test finished.
    Cancelled,
}

#[derive(Debug, Error)]
enum SetupError {
    #[error("could not reconfigure the controller: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("could not reconfigure the controller: got {0}")]
    Rejected(ProtocolMessage),
}

pub struct DeliveryTestDriver<T: Transport> {
    dispatcher: Dispatcher<T>,
    routes: RoutingTable,
    settings: DriverSettings,
}

impl<T: Transport> DeliveryTestDriver<T> {
    pub fn new(dispatcher: Dispatcher<T>, settings: DriverSettings) -> Self {
        Self {
            dispatcher,
            routes: RoutingTable::new(),
            settings,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routes
    }

    /// Run every test in `summary` in order, then log the result table.
    ///
    /// `shutdown` is polled between tests and between iterations.
    pub async fn run_all(
        &mut self,
        summary: &mut TestSummary,
        shutdown: &ShutdownSignal,
    ) -> Vec<TestOutcome> {
        self.dispatcher.drain().await;

        log_info!(COMPONENT, "{}", BANNER);
        log_info!(COMPONENT, "DELIVERY TESTS: START");
        let mut outcomes = Vec::with_capacity(summary.tests.len());
        if summary.is_empty() {
            log_info!(COMPONENT, "No tests to execute!");
        }
        for stats in summary.tests.iter_mut() {
            if !shutdown.is_running() {
                log_warn!(COMPONENT, "Stop requested, not starting test: {}", stats.name());
                break;
            }
            outcomes.push(self.run_test(stats, shutdown).await);
        }
        if !summary.is_empty() {
            for row in summary.render_table() {
                log_info!(COMPONENT, "{}", row);
            }
        }
        log_info!(COMPONENT, "DELIVERY TESTS: END");
        log_info!(COMPONENT, "{}", BANNER);
        outcomes
    }

    /// Switch the node to the test's delivery mode, prepare its destination
    /// list and run the send loop.
    pub async fn run_test(&mut self, stats: &mut TestStats, shutdown: &ShutdownSignal) -> TestOutcome {
        log_info!(COMPONENT, "{}", SEPARATOR);
        log_info!(COMPONENT, "Starting test: {}", stats.name());

        let mode = stats.config.mode();
        let outcome = match self.configure_delivery(mode).await {
            Err(e) => {
                log_error!(COMPONENT, "Error setting up test due to: {}", e);
                TestOutcome::Aborted(e.to_string())
            }
            Ok(()) => {
                let destinations = self.prepare_destinations(&stats.config.workload);
                self.send_loop(stats, &destinations, shutdown).await
            }
        };

        log_info!(COMPONENT, "Finished test: {} ({:?})", stats.name(), outcome);
        log_info!(COMPONENT, "{}", SEPARATOR);
        outcome
    }

    async fn configure_delivery(&mut self, delivery: DeliveryMode) -> Result<(), SetupError> {
        let request = ProtocolMessage::ConfigDelivery {
            nwkcaps: self.settings.nwkcaps,
            delivery,
            retry: self.settings.retry,
        };
        match self.dispatcher.exchange(request).await? {
            ProtocolMessage::Ok => Ok(()),
            other => Err(SetupError::Rejected(other)),
        }
    }

    fn prepare_destinations(&mut self, workload: &Workload) -> Vec<NodeId> {
        match workload {
            Workload::Direct { destinations } => destinations.clone(),
            Workload::Routed { routes } => {
                self.routes.clear();
                let destinations = self.routes.seed_from_paths(self.settings.node_id, routes);
                log_info!(
                    COMPONENT,
                    "Seeded {} routes to {} destinations",
                    destinations.len(),
                    self.routes.len()
                );
                destinations
            }
            Workload::Flood { destinations } => {
                self.routes.clear();
                destinations.clone()
            }
        }
    }

    async fn send_loop(
        &mut self,
        stats: &mut TestStats,
        destinations: &[NodeId],
        shutdown: &ShutdownSignal,
    ) -> TestOutcome {
        let time_bound = stats.config.time_bound();
        let iteration_bound = stats.config.iteration_bound();
        let delay = stats.config.iteration_delay;

        if time_bound.is_none() && iteration_bound.is_none() {
            let reason = SkipReason::NoBounds;
            log_warn!(COMPONENT, "Skipping test: {}", reason);
            return TestOutcome::Skipped(reason);
        }
        if destinations.is_empty() {
            let reason = SkipReason::NoDestinations;
            log_warn!(COMPONENT, "Skipping test: {}", reason);
            return TestOutcome::Skipped(reason);
        }

        let start = Instant::now();
        let mut iterations: u64 = 0;
        let mut outcome = TestOutcome::Completed;
        loop {
            for &dst in destinations {
                let success = self.send_one(dst).await;
                stats.record(success);
            }
            iterations += 1;

            if !delay.is_zero() {
                sleep(delay).await;
            }

            // Both bounds must allow another pass
            let time_left = time_bound.map_or(true, |limit| start.elapsed() < limit);
            let iterations_left = iteration_bound.map_or(true, |limit| iterations < limit);
            if !(time_left && iterations_left) {
                break;
            }
            if !shutdown.is_running() {
                log_warn!(COMPONENT, "Stop requested after {} iterations", iterations);
                outcome = TestOutcome::Cancelled;
                break;
            }
        }
        stats.run_time_secs = start.elapsed().as_secs();
        outcome
    }

    // One exchange to `dst`, true when the node acknowledged the send.
    async fn send_one(&mut self, dst: NodeId) -> bool {
        if let Some(list) = self.routes.route_list(dst) {
            for route in list.routes() {
                debug!("[{}] Route to {} via {:?}", COMPONENT, dst, route.hops);
            }
        }
        let request = ProtocolMessage::Send {
            dst,
            port: TEST_PORT,
            data: TEST_PAYLOAD.to_vec(),
        };
        match self.dispatcher.exchange(request).await {
            Ok(ProtocolMessage::SendAck { nhops }) => {
                debug!("[{}] Delivered to {} in {} hops", COMPONENT, dst, nhops);
                true
            }
            Ok(other) => {
                log_warn!(COMPONENT, "Send to '{}' failed with response {}", dst, other);
                false
            }
            Err(e) => {
                log_error!(COMPONENT, "Error sending to '{}' due to: {}", dst, e);
                false
            }
        }
    }
}

/// Dispatch loop that runs the delivery test suite once.
pub struct DeliveryTestLoop<T: Transport> {
    driver: DeliveryTestDriver<T>,
    summary: TestSummary,
    outcomes: Vec<TestOutcome>,
}

impl<T: Transport> DeliveryTestLoop<T> {
    pub fn new(driver: DeliveryTestDriver<T>, summary: TestSummary) -> Self {
        Self {
            driver,
            summary,
            outcomes: Vec::new(),
        }
    }

    pub fn driver(&self) -> &DeliveryTestDriver<T> {
        &self.driver
    }

    pub fn summary(&self) -> &TestSummary {
        &self.summary
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn into_summary(self) -> TestSummary {
        self.summary
    }
}

#[async_trait]
impl<T: Transport> DispatchLoop for DeliveryTestLoop<T> {
    async fn run(&mut self, ready: ReadySignal, shutdown: ShutdownSignal) {
        ready.signal();
        self.outcomes = self.driver.run_all(&mut self.summary, &shutdown).await;
    }
}
