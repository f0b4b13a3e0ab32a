use async_trait::async_trait;
use log::debug;
use meshwork_host::{Transport, TransportError};
use meshwork_lib::frame::Frame;
use meshwork_lib::messages::{DeliveryMode, ProtocolMessage};
use meshwork_lib::NodeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Device error codes the simulated node answers with.
pub mod errors {
    pub const NOT_IN_ZC_MODE: u8 = 1;
    pub const UNREACHABLE: u8 = 2;
    pub const NO_DELIVERY_MODE: u8 = 3;
}

/// Network identity held by the simulated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedNetwork {
    pub channel: u8,
    pub nwk_id: u16,
    pub node_id: NodeId,
}

struct NodeState {
    serial: Vec<u8>,
    network: SimulatedNetwork,
    report: Option<(NodeId, u8)>,
    zc_mode: bool,
    delivery: Option<DeliveryMode>,
    /// Delay before each reply is delivered
    latency: Duration,
    /// Fraction of requests that get no reply (0.0 to 1.0)
    drop_rate: f64,
    unreachable: HashSet<NodeId>,
    /// Unrelated frames delivered ahead of each reply
    stray_frames: usize,
    /// Fixed replies by request code, replacing the normal behaviour
    overrides: HashMap<u8, ProtocolMessage>,
}

/// In-process stand-in for a radio node, usable anywhere a [`Transport`] is.
///
/// Requests are handled as the device would handle them and replies are
/// queued for `receive`, echoing the request's sequence number.
#[derive(Clone)]
pub struct SimulatedNode {
    state: Arc<RwLock<NodeState>>,
    requests: Arc<RwLock<Vec<Frame>>>,
    outbox: mpsc::UnboundedSender<Frame>,
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<Frame>>>,
}

impl Default for SimulatedNode {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNode {
    pub fn new() -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(RwLock::new(NodeState {
                serial: vec![0x4D, 0x57, 0x00, 0x01],
                network: SimulatedNetwork {
                    channel: 0,
                    nwk_id: 0,
                    node_id: 0,
                },
                report: None,
                zc_mode: false,
                delivery: None,
                latency: Duration::ZERO,
                drop_rate: 0.0,
                unreachable: HashSet::new(),
                stray_frames: 0,
                overrides: HashMap::new(),
            })),
            requests: Arc::new(RwLock::new(Vec::new())),
            outbox,
            inbox: Arc::new(Mutex::new(inbox)),
        }
    }

    pub async fn set_serial(&self, serial: Vec<u8>) {
        self.state.write().await.serial = serial;
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    /// Set reply drop rate (0.0 = no drops, 1.0 = drop all)
    pub async fn set_drop_rate(&self, drop_rate: f64) {
        self.state.write().await.drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    pub async fn mark_unreachable(&self, dst: NodeId) {
        self.state.write().await.unreachable.insert(dst);
    }

    pub async fn set_stray_frames(&self, count: usize) {
        self.state.write().await.stray_frames = count;
    }

    /// Always answer requests with `code` with `reply`.
    pub async fn set_reply(&self, code: u8, reply: ProtocolMessage) {
        self.state.write().await.overrides.insert(code, reply);
    }

    pub async fn clear_reply(&self, code: u8) {
        self.state.write().await.overrides.remove(&code);
    }

    /// Queue a frame for the host as if the device had sent it unprompted.
    pub fn inject(&self, frame: Frame) {
        // The receiving half lives as long as `self`
        let _ = self.outbox.send(frame);
    }

    pub async fn network(&self) -> SimulatedNetwork {
        self.state.read().await.network
    }

    pub async fn report(&self) -> Option<(NodeId, u8)> {
        self.state.read().await.report
    }

    pub async fn delivery_mode(&self) -> Option<DeliveryMode> {
        self.state.read().await.delivery
    }

    pub async fn in_zc_mode(&self) -> bool {
        self.state.read().await.zc_mode
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<ProtocolMessage> {
        self.requests
            .read()
            .await
            .iter()
            .filter_map(|frame| ProtocolMessage::decode(frame).ok())
            .collect()
    }

    pub async fn request_seqs(&self) -> Vec<u8> {
        self.requests.read().await.iter().map(|f| f.seq).collect()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    async fn handle(&self, request: &ProtocolMessage) -> ProtocolMessage {
        let mut state = self.state.write().await;
        if let Some(reply) = state.overrides.get(&request.code()) {
            return reply.clone();
        }
        match request {
            ProtocolMessage::ZcInit => {
                state.zc_mode = true;
                ProtocolMessage::Ok
            }
            ProtocolMessage::ZcDeinit => {
                state.zc_mode = false;
                ProtocolMessage::Ok
            }
            ProtocolMessage::ZcId => ProtocolMessage::ZcIdRes {
                serial: state.serial.clone(),
            },
            ProtocolMessage::ZcNwkId => ProtocolMessage::ZcNwkIdRes {
                channel: state.network.channel,
                nwk_id: state.network.nwk_id,
                node_id: state.network.node_id,
            },
            ProtocolMessage::ZcCfgNwk {
                channel,
                nwk_id,
                node_id,
                ..
            } => {
                if !state.zc_mode {
                    return ProtocolMessage::Nok {
                        error: errors::NOT_IN_ZC_MODE,
                    };
                }
                state.network = SimulatedNetwork {
                    channel: *channel,
                    nwk_id: *nwk_id,
                    node_id: *node_id,
                };
                ProtocolMessage::Ok
            }
            ProtocolMessage::ZcCfgRep {
                report_node_id,
                report_flags,
            } => {
                if !state.zc_mode {
                    return ProtocolMessage::Nok {
                        error: errors::NOT_IN_ZC_MODE,
                    };
                }
                state.report = Some((*report_node_id, *report_flags));
                ProtocolMessage::Ok
            }
            ProtocolMessage::ConfigDelivery { delivery, .. } => {
                state.delivery = Some(*delivery);
                ProtocolMessage::Ok
            }
            ProtocolMessage::Send { dst, .. } => {
                if state.delivery.is_none() {
                    ProtocolMessage::Nok {
                        error: errors::NO_DELIVERY_MODE,
                    }
                } else if state.unreachable.contains(dst) {
                    ProtocolMessage::Nok {
                        error: errors::UNREACHABLE,
                    }
                } else {
                    ProtocolMessage::SendAck { nhops: 1 }
                }
            }
            _ => ProtocolMessage::UnknownMessage,
        }
    }
}

#[async_trait]
impl Transport for SimulatedNode {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.requests.write().await.push(frame.clone());

        let reply = match ProtocolMessage::decode(frame) {
            Ok(request) => self.handle(&request).await,
            Err(_) => ProtocolMessage::InternalError,
        };

        let (latency, drop_rate, stray_frames) = {
            let state = self.state.read().await;
            (state.latency, state.drop_rate, state.stray_frames)
        };
        if drop_rate > 0.0 && rand::random::<f64>() < drop_rate {
            debug!("Simulator dropped reply to seq {}", frame.seq);
            return Ok(());
        }

        let mut frames = Vec::with_capacity(stray_frames + 1);
        for i in 0..stray_frames {
            // Far enough from the request seq to never match it
            let seq = frame.seq.wrapping_add(64).wrapping_add(i as u8);
            frames.push(Frame::new(seq, reply.code(), Vec::new()));
        }
        frames.push(
            reply
                .encode(frame.seq)
                .map_err(|_| TransportError::Closed)?,
        );

        let outbox = self.outbox.clone();
        if latency.is_zero() {
            for frame in frames {
                let _ = outbox.send(frame);
            }
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                for frame in frames {
                    let _ = outbox.send(frame);
                }
            });
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Frame, TransportError> {
        let mut inbox = self.inbox.lock().await;
        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
