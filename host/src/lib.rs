//! Meshwork Host Controller Library
//!
//! This library drives a mesh radio node over a framed request/response
//! transport. It can configure the node through the zero-configuration
//! handshake and exercise the network with direct, routed and flood
//! delivery tests. It is used both by the `meshwork-host` binary and by the
//! integration tests.

macro_rules! log_info {
    ($component:expr, $($arg:tt)*) => ({
        log::info!("[{}] {}", $component, format_args!($($arg)*));
    })
}

macro_rules! log_warn {
    ($component:expr, $($arg:tt)*) => ({
        log::warn!("[{}] {}", $component, format_args!($($arg)*));
    })
}

macro_rules! log_error {
    ($component:expr, $($arg:tt)*) => ({
        log::error!("[{}] {}", $component, format_args!($($arg)*));
    })
}

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod driver;
pub mod handshake;
pub mod routing;
pub mod transport;

// Re-export main types for public API
pub use config::{ConfigError, HostConfig};
pub use controller::{
    Controller, ControllerError, DispatchLoop, ReadySignal, ShutdownSignal, StopHandle,
};
pub use dispatcher::{DispatchMetrics, Dispatcher, ExchangeError};
pub use driver::{DeliveryTestDriver, DeliveryTestLoop, DriverSettings, SkipReason, TestOutcome};
pub use handshake::{
    run_handshake, HandshakeError, HandshakeLoop, HandshakeReport, HandshakeStep, NetworkIdentity,
};
pub use routing::{Route, RouteList, RoutingTable};
pub use transport::{StreamTransport, Transport, TransportError};

// Re-export from lib crate for convenience
pub use meshwork_lib::frame::Frame;
pub use meshwork_lib::messages::{DeliveryMode, ProtocolMessage};
pub use meshwork_lib::stats::{TestConfiguration, TestStats, TestSummary, Workload};
