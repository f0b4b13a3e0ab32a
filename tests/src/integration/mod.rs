//! Integration testing framework for the meshwork host
//!
//! Runs the real dispatcher, handshake, test driver and controller against
//! a simulated radio node instead of a serial bridge. The simulated node can
//! add latency, drop replies, interleave unrelated frames and reject
//! requests, so the correlation and failure paths can be exercised
//! deterministically.

pub mod simulated_node;

pub use scenarios::{TestScenarios, SCENARIO_READ_TIMEOUT};
pub use simulated_node::{errors, SimulatedNetwork, SimulatedNode};
