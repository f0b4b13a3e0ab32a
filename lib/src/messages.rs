use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{Frame, MAX_PAYLOAD_LEN};
use crate::{NodeId, Seq};

pub mod codes {
    pub const OK: u8 = 0;
    pub const NOK: u8 = 1;
    pub const UNKNOWN_MESSAGE: u8 = 2;
    pub const INTERNAL_ERROR: u8 = 3;
    pub const CONFIG_DELIVERY: u8 = 10;
    pub const RF_SEND: u8 = 24;
    pub const RF_SEND_ACK: u8 = 25;
    pub const ZC_INIT: u8 = 50;
    pub const ZC_DEINIT: u8 = 51;
    pub const ZC_ID: u8 = 52;
    pub const ZC_ID_RES: u8 = 53;
    pub const ZC_NWK_ID: u8 = 54;
    pub const ZC_NWK_ID_RES: u8 = 55;
    pub const ZC_CFG_NWK: u8 = 56;
    pub const ZC_CFG_REP: u8 = 57;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{message}: payload truncated, need {required} bytes, got {actual}")]
    Truncated {
        message: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{field} of {len} bytes exceeds maximum {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Delivery strategy the radio node uses for outgoing sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Direct,
    Routed,
    Flood,
}

impl DeliveryMode {
    pub fn wire_value(self) -> u8 {
        match self {
            DeliveryMode::Direct => 1,
            DeliveryMode::Routed => 2,
            DeliveryMode::Flood => 4,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(DeliveryMode::Direct),
            2 => Some(DeliveryMode::Routed),
            4 => Some(DeliveryMode::Flood),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryMode::Direct => "DIRECT",
            DeliveryMode::Routed => "ROUTED",
            DeliveryMode::Flood => "FLOOD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    // Generic acknowledgement
    Ok,
    // Generic negative acknowledgement with a device error code
    Nok {
        error: u8,
    },
    // The device did not recognise the request
    UnknownMessage,
    // The device failed internally while handling the request
    InternalError,
    // Switch the node's delivery mode for subsequent sends
    ConfigDelivery {
        nwkcaps: u8,
        delivery: DeliveryMode,
        retry: u8,
    },
    // Send a payload to a remote node
    Send {
        dst: NodeId,
        port: u8,
        data: Vec<u8>,
    },
    // Response to Send once the remote node acknowledged delivery
    SendAck {
        nhops: u8,
    },
    // Enter zero-configuration mode
    ZcInit,
    // Leave zero-configuration mode
    ZcDeinit,
    // Request the device identity
    ZcId,
    // Response with the device serial number
    ZcIdRes {
        serial: Vec<u8>,
    },
    // Request the current network identity
    ZcNwkId,
    // Response with the current network identity
    ZcNwkIdRes {
        channel: u8,
        nwk_id: u16,
        node_id: NodeId,
    },
    // Configure the network the device joins
    ZcCfgNwk {
        channel: u8,
        nwk_id: u16,
        node_id: NodeId,
        key: Vec<u8>,
    },
    // Configure where and what the device reports
    ZcCfgRep {
        report_node_id: NodeId,
        report_flags: u8,
    },
    // Any code this host does not know
    Unknown {
        code: u8,
        payload: Vec<u8>,
    },
}

impl ProtocolMessage {
    pub fn code(&self) -> u8 {
        match self {
            ProtocolMessage::Ok => codes::OK,
            ProtocolMessage::Nok { .. } => codes::NOK,
            ProtocolMessage::UnknownMessage => codes::UNKNOWN_MESSAGE,
            ProtocolMessage::InternalError => codes::INTERNAL_ERROR,
            ProtocolMessage::ConfigDelivery { .. } => codes::CONFIG_DELIVERY,
            ProtocolMessage::Send { .. } => codes::RF_SEND,
            ProtocolMessage::SendAck { .. } => codes::RF_SEND_ACK,
            ProtocolMessage::ZcInit => codes::ZC_INIT,
            ProtocolMessage::ZcDeinit => codes::ZC_DEINIT,
            ProtocolMessage::ZcId => codes::ZC_ID,
            ProtocolMessage::ZcIdRes { .. } => codes::ZC_ID_RES,
            ProtocolMessage::ZcNwkId => codes::ZC_NWK_ID,
            ProtocolMessage::ZcNwkIdRes { .. } => codes::ZC_NWK_ID_RES,
            ProtocolMessage::ZcCfgNwk { .. } => codes::ZC_CFG_NWK,
            ProtocolMessage::ZcCfgRep { .. } => codes::ZC_CFG_REP,
            ProtocolMessage::Unknown { code, .. } => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolMessage::Ok => "Ok",
            ProtocolMessage::Nok { .. } => "Nok",
            ProtocolMessage::UnknownMessage => "UnknownMessage",
            ProtocolMessage::InternalError => "InternalError",
            ProtocolMessage::ConfigDelivery { .. } => "ConfigDelivery",
            ProtocolMessage::Send { .. } => "Send",
            ProtocolMessage::SendAck { .. } => "SendAck",
            ProtocolMessage::ZcInit => "ZcInit",
            ProtocolMessage::ZcDeinit => "ZcDeinit",
            ProtocolMessage::ZcId => "ZcId",
            ProtocolMessage::ZcIdRes { .. } => "ZcIdRes",
            ProtocolMessage::ZcNwkId => "ZcNwkId",
            ProtocolMessage::ZcNwkIdRes { .. } => "ZcNwkIdRes",
            ProtocolMessage::ZcCfgNwk { .. } => "ZcCfgNwk",
            ProtocolMessage::ZcCfgRep { .. } => "ZcCfgRep",
            ProtocolMessage::Unknown { .. } => "Unknown",
        }
    }

    /// Encode this message into a frame carrying `seq`.
    pub fn encode(&self, seq: Seq) -> Result<Frame, CodecError> {
        let payload = match self {
            ProtocolMessage::Ok
            | ProtocolMessage::UnknownMessage
            | ProtocolMessage::InternalError
            | ProtocolMessage::ZcInit
            | ProtocolMessage::ZcDeinit
            | ProtocolMessage::ZcId
            | ProtocolMessage::ZcNwkId => Vec::new(),
            ProtocolMessage::Nok { error } => vec![*error],
            ProtocolMessage::ConfigDelivery {
                nwkcaps,
                delivery,
                retry,
            } => vec![*nwkcaps, delivery.wire_value(), *retry],
            ProtocolMessage::Send { dst, port, data } => {
                let datalen = checked_len("send data", data, MAX_PAYLOAD_LEN - 3)?;
                let mut out = vec![*dst, *port, datalen];
                out.extend_from_slice(data);
                out
            }
            ProtocolMessage::SendAck { nhops } => vec![*nhops],
            ProtocolMessage::ZcIdRes { serial } => {
                let len = checked_len("serial number", serial, MAX_PAYLOAD_LEN - 1)?;
                let mut out = vec![len];
                out.extend_from_slice(serial);
                out
            }
            ProtocolMessage::ZcNwkIdRes {
                channel,
                nwk_id,
                node_id,
            } => {
                let [hi, lo] = nwk_id.to_be_bytes();
                vec![*channel, hi, lo, *node_id]
            }
            ProtocolMessage::ZcCfgNwk {
                channel,
                nwk_id,
                node_id,
                key,
            } => {
                let keylen = checked_len("network key", key, MAX_PAYLOAD_LEN - 5)?;
                let [hi, lo] = nwk_id.to_be_bytes();
                let mut out = vec![*channel, hi, lo, *node_id, keylen];
                out.extend_from_slice(key);
                out
            }
            ProtocolMessage::ZcCfgRep {
                report_node_id,
                report_flags,
            } => vec![*report_node_id, *report_flags],
            ProtocolMessage::Unknown { payload, .. } => {
                checked_len("payload", payload, MAX_PAYLOAD_LEN)?;
                payload.clone()
            }
        };
        Ok(Frame::new(seq, self.code(), payload))
    }

    /// Classify a frame by its code and decode the type-specific fields.
    ///
    /// Codes this host does not know decode to [`ProtocolMessage::Unknown`];
    /// only a truncated payload for a known code is an error.
    pub fn decode(frame: &Frame) -> Result<ProtocolMessage, CodecError> {
        let data = frame.payload.as_slice();
        let message = match frame.code {
            codes::OK => ProtocolMessage::Ok,
            codes::NOK => {
                let [error, ..] = require::<1>("Nok", data)?;
                ProtocolMessage::Nok { error }
            }
            codes::UNKNOWN_MESSAGE => ProtocolMessage::UnknownMessage,
            codes::INTERNAL_ERROR => ProtocolMessage::InternalError,
            codes::CONFIG_DELIVERY => {
                let [nwkcaps, delivery, retry] = require::<3>("ConfigDelivery", data)?;
                match DeliveryMode::from_wire(delivery) {
                    Some(delivery) => ProtocolMessage::ConfigDelivery {
                        nwkcaps,
                        delivery,
                        retry,
                    },
                    None => ProtocolMessage::Unknown {
                        code: frame.code,
                        payload: frame.payload.clone(),
                    },
                }
            }
            codes::RF_SEND => {
                let [dst, port, datalen] = require::<3>("Send", data)?;
                let body = variable("Send", data, 3, datalen)?;
                ProtocolMessage::Send {
                    dst,
                    port,
                    data: body,
                }
            }
            codes::RF_SEND_ACK => {
                let [nhops] = require::<1>("SendAck", data)?;
                ProtocolMessage::SendAck { nhops }
            }
            codes::ZC_INIT => ProtocolMessage::ZcInit,
            codes::ZC_DEINIT => ProtocolMessage::ZcDeinit,
            codes::ZC_ID => ProtocolMessage::ZcId,
            codes::ZC_ID_RES => {
                let [len] = require::<1>("ZcIdRes", data)?;
                let serial = variable("ZcIdRes", data, 1, len)?;
                ProtocolMessage::ZcIdRes { serial }
            }
            codes::ZC_NWK_ID => ProtocolMessage::ZcNwkId,
            codes::ZC_NWK_ID_RES => {
                let [channel, hi, lo, node_id] = require::<4>("ZcNwkIdRes", data)?;
                ProtocolMessage::ZcNwkIdRes {
                    channel,
                    nwk_id: u16::from_be_bytes([hi, lo]),
                    node_id,
                }
            }
            codes::ZC_CFG_NWK => {
                let [channel, hi, lo, node_id, keylen] = require::<5>("ZcCfgNwk", data)?;
                let key = variable("ZcCfgNwk", data, 5, keylen)?;
                ProtocolMessage::ZcCfgNwk {
                    channel,
                    nwk_id: u16::from_be_bytes([hi, lo]),
                    node_id,
                    key,
                }
            }
            codes::ZC_CFG_REP => {
                let [report_node_id, report_flags] = require::<2>("ZcCfgRep", data)?;
                ProtocolMessage::ZcCfgRep {
                    report_node_id,
                    report_flags,
                }
            }
            code => ProtocolMessage::Unknown {
                code,
                payload: frame.payload.clone(),
            },
        };
        Ok(message)
    }
}

fn checked_len(field: &'static str, bytes: &[u8], max: usize) -> Result<u8, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::FieldTooLong {
            field,
            len: bytes.len(),
            max,
        });
    }
    Ok(bytes.len() as u8)
}

// Copies the first N bytes of the payload, failing if fewer are present.
fn require<const N: usize>(message: &'static str, data: &[u8]) -> Result<[u8; N], CodecError> {
    data.get(..N)
        .and_then(|head| <[u8; N]>::try_from(head).ok())
        .ok_or(CodecError::Truncated {
            message,
            required: N,
            actual: data.len(),
        })
}

// Copies `len` bytes that follow a fixed header of `offset` bytes.
fn variable(message: &'static str, data: &[u8], offset: usize, len: u8) -> Result<Vec<u8>, CodecError> {
    let end = offset + len as usize;
    data.get(offset..end)
        .map(<[u8]>::to_vec)
        .ok_or(CodecError::Truncated {
            message,
            required: end,
            actual: data.len(),
        })
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolMessage::Nok { error } => write!(f, "Nok {{ error: {} }}", error),
            ProtocolMessage::ConfigDelivery {
                nwkcaps,
                delivery,
                retry,
            } => write!(
                f,
                "ConfigDelivery {{ nwkcaps: {}, delivery: {}, retry: {} }}",
                nwkcaps, delivery, retry
            ),
            ProtocolMessage::Send { dst, port, data } => write!(
                f,
                "Send {{ dst: {}, port: {}, data: [{}] }}",
                dst,
                port,
                hex::encode(data)
            ),
            ProtocolMessage::SendAck { nhops } => write!(f, "SendAck {{ nhops: {} }}", nhops),
            ProtocolMessage::ZcIdRes { serial } => {
                write!(f, "ZcIdRes {{ serial: {} }}", hex::encode(serial))
            }
            ProtocolMessage::ZcNwkIdRes {
                channel,
                nwk_id,
                node_id,
            } => write!(
                f,
                "ZcNwkIdRes {{ channel: {}, nwk_id: {}, node_id: {} }}",
                channel, nwk_id, node_id
            ),
            // The key is not dumped, only its length
            ProtocolMessage::ZcCfgNwk {
                channel,
                nwk_id,
                node_id,
                key,
            } => write!(
                f,
                "ZcCfgNwk {{ channel: {}, nwk_id: {}, node_id: {}, keylen: {} }}",
                channel,
                nwk_id,
                node_id,
                key.len()
            ),
            ProtocolMessage::ZcCfgRep {
                report_node_id,
                report_flags,
            } => write!(
                f,
                "ZcCfgRep {{ report_node_id: {}, report_flags: {:#04x} }}",
                report_node_id, report_flags
            ),
            ProtocolMessage::Unknown { code, payload } => write!(
                f,
                "Unknown {{ code: {}, payload: [{}] }}",
                code,
                hex::encode(payload)
            ),
            other => f.write_str(other.name()),
        }
    }
}
