//! Zero-configuration handshake that puts the node on a known network.
//!
//! The steps always run in the same order and every step must get its
//! expected response, otherwise the whole handshake fails. There is no
//! retry here; callers decide whether to run it again.

use async_trait::async_trait;
use meshwork_lib::messages::ProtocolMessage;
use meshwork_lib::NodeId;
use std::fmt;
use thiserror::Error;

use crate::config::HostConfig;
use crate::controller::{DispatchLoop, ReadySignal, ShutdownSignal};
use crate::dispatcher::{Dispatcher, ExchangeError};
use crate::transport::Transport;

const COMPONENT: &str = "Handshake";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Init,
    Identity,
    NetworkIdentity,
    ConfigureNetwork,
    ConfigureReporting,
    Deinit,
}

impl HandshakeStep {
    pub const SEQUENCE: [HandshakeStep; 6] = [
        HandshakeStep::Init,
        HandshakeStep::Identity,
        HandshakeStep::NetworkIdentity,
        HandshakeStep::ConfigureNetwork,
        HandshakeStep::ConfigureReporting,
        HandshakeStep::Deinit,
    ];

    fn request(self, config: &HostConfig) -> ProtocolMessage {
        match self {
            HandshakeStep::Init => ProtocolMessage::ZcInit,
            HandshakeStep::Identity => ProtocolMessage::ZcId,
            HandshakeStep::NetworkIdentity => ProtocolMessage::ZcNwkId,
            HandshakeStep::ConfigureNetwork => ProtocolMessage::ZcCfgNwk {
                channel: config.channel,
                nwk_id: config.nwk_id,
                node_id: config.node_id,
                key: config.nwk_key_bytes(),
            },
            HandshakeStep::ConfigureReporting => ProtocolMessage::ZcCfgRep {
                report_node_id: config.report_node_id,
                report_flags: config.report_flags,
            },
            HandshakeStep::Deinit => ProtocolMessage::ZcDeinit,
        }
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeStep::Init => "Init",
            HandshakeStep::Identity => "Identity",
            HandshakeStep::NetworkIdentity => "NetworkIdentity",
            HandshakeStep::ConfigureNetwork => "ConfigureNetwork",
            HandshakeStep::ConfigureReporting => "ConfigureReporting",
            HandshakeStep::Deinit => "Deinit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake step {step} failed: {source}")]
    Exchange {
        step: HandshakeStep,
        source: ExchangeError,
    },

    #[error("handshake step {step} got unexpected response {response}")]
    UnexpectedResponse {
        step: HandshakeStep,
        response: ProtocolMessage,
    },
}

impl HandshakeError {
    pub fn step(&self) -> HandshakeStep {
        match self {
            HandshakeError::Exchange { step, .. }
            | HandshakeError::UnexpectedResponse { step, .. } => *step,
        }
    }
}

/// Network identity the node reported before it was reconfigured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub channel: u8,
    pub nwk_id: u16,
    pub node_id: NodeId,
}

/// What the node reported during a successful handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeReport {
    pub serial: Vec<u8>,
    pub previous_network: Option<NetworkIdentity>,
}

/// Run every handshake step in order against the node behind `dispatcher`.
pub async fn run_handshake<T: Transport>(
    dispatcher: &mut Dispatcher<T>,
    config: &HostConfig,
) -> Result<HandshakeReport, HandshakeError> {
    let mut report = HandshakeReport::default();
    for step in HandshakeStep::SEQUENCE {
        let request = step.request(config);
        log_info!(COMPONENT, "{}: {}", step, request);
        let response = dispatcher
            .exchange(request)
            .await
            .map_err(|source| HandshakeError::Exchange { step, source })?;

        match (step, response) {
            (
                HandshakeStep::Init
                | HandshakeStep::ConfigureNetwork
                | HandshakeStep::ConfigureReporting
                | HandshakeStep::Deinit,
                ProtocolMessage::Ok,
            ) => {}
            (HandshakeStep::Identity, ProtocolMessage::ZcIdRes { serial }) => {
                log_info!(COMPONENT, "Device serial: {}", hex::encode(&serial));
                report.serial = serial;
            }
            (
                HandshakeStep::NetworkIdentity,
                ProtocolMessage::ZcNwkIdRes {
                    channel,
                    nwk_id,
                    node_id,
                },
            ) => {
                report.previous_network = Some(NetworkIdentity {
                    channel,
                    nwk_id,
                    node_id,
                });
            }
            (step, response) => {
                return Err(HandshakeError::UnexpectedResponse { step, response });
            }
        }
    }
    Ok(report)
}

/// Dispatch loop that configures the node once and ends.
///
/// It does not look at the shutdown signal: once started the handshake runs
/// to completion.
pub struct HandshakeLoop<T: Transport> {
    dispatcher: Dispatcher<T>,
    config: HostConfig,
    outcome: Option<Result<HandshakeReport, HandshakeError>>,
}

impl<T: Transport> HandshakeLoop<T> {
    pub fn new(dispatcher: Dispatcher<T>, config: HostConfig) -> Self {
        Self {
            dispatcher,
            config,
            outcome: None,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Result of the handshake, `None` until the loop has run.
    pub fn outcome(&self) -> Option<&Result<HandshakeReport, HandshakeError>> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<Result<HandshakeReport, HandshakeError>> {
        self.outcome
    }
}

#[async_trait]
impl<T: Transport> DispatchLoop for HandshakeLoop<T> {
    async fn run(&mut self, ready: ReadySignal, _shutdown: ShutdownSignal) {
        ready.signal();
        log_info!(COMPONENT, "----------- Configuring device");
        let outcome = run_handshake(&mut self.dispatcher, &self.config).await;
        match &outcome {
            Ok(_) => log_info!(COMPONENT, "Device configured!"),
            Err(e) => log_error!(COMPONENT, "Error: {}", e),
        }
        log_info!(COMPONENT, "Run complete.");
        self.outcome = Some(outcome);
    }
}
