//! Data type ids and single-frame body decoding.
//!
//! Only transfers that fit in one frame can be decoded here. The GNSS messages are
//! always multi-frame transfers and must be reassembled and decoded by a DroneCAN
//! stack before they reach [crate::normalize].
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    frame::DecodedFrame,
    message::{Envelope, MessageKind, NodeStatus, TelemetryVariant},
    Error, Result,
};

/// Default data type id of `uavcan.protocol.NodeStatus`.
pub const NODE_STATUS_ID: u16 = 341;
/// Default data type id of `uavcan.equipment.gnss.Fix`.
pub const GNSS_FIX_ID: u16 = 1060;
/// Default data type id of `uavcan.equipment.gnss.Auxiliary`.
pub const GNSS_AUXILIARY_ID: u16 = 1061;
/// Default data type id of `uavcan.equipment.gnss.Fix2`.
pub const GNSS_FIX2_ID: u16 = 1063;

/// Map a message data type id to the kind of telemetry it carries.
#[must_use]
pub fn kind_of(type_id: u16) -> Option<MessageKind> {
    match type_id {
        NODE_STATUS_ID => Some(MessageKind::NodeStatus),
        GNSS_FIX_ID => Some(MessageKind::Fix),
        GNSS_AUXILIARY_ID => Some(MessageKind::Auxiliary),
        GNSS_FIX2_ID => Some(MessageKind::Fix2),
        _ => None,
    }
}

/// Full DSDL name for a data type id, if known.
#[must_use]
pub fn type_name(type_id: u16) -> Option<&'static str> {
    kind_of(type_id).map(|kind| match kind {
        MessageKind::NodeStatus => "uavcan.protocol.NodeStatus",
        MessageKind::Fix => "uavcan.equipment.gnss.Fix",
        MessageKind::Auxiliary => "uavcan.equipment.gnss.Auxiliary",
        MessageKind::Fix2 => "uavcan.equipment.gnss.Fix2",
    })
}

/// Byte length of a serialized NodeStatus.
pub const NODE_STATUS_LEN: usize = 7;

/// Decode a NodeStatus body.
///
/// Layout: `uptime_sec` u32 little-endian, one byte with `health` in the top 2 bits,
/// `mode` in the next 3 and `sub_mode` in the low 3, then
/// `vendor_specific_status_code` u16 little-endian.
///
/// # Errors
/// [Error::NotEnoughData] if `body` is shorter than [NODE_STATUS_LEN].
pub fn decode_node_status(body: &[u8]) -> Result<NodeStatus> {
    if body.len() < NODE_STATUS_LEN {
        return Err(Error::NotEnoughData {
            actual: body.len(),
            minimum: NODE_STATUS_LEN,
        });
    }
    Ok(NodeStatus {
        uptime_sec: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
        health: (body[4] >> 6) & 0x3,
        mode: (body[4] >> 3) & 0x7,
        sub_mode: body[4] & 0x7,
        vendor_specific_status_code: u16::from_le_bytes([body[5], body[6]]),
    })
}

/// What became of a decoded frame at the telemetry boundary.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum Classified {
    /// A complete telemetry message.
    Telemetry(Envelope),
    /// A known telemetry type that needs multi-frame reassembly.
    MultiFrame(MessageKind),
    /// A known type whose body could not be decoded.
    Malformed(MessageKind),
    Service,
    Unrecognized(u16),
}

/// Classify a decoded frame, decoding its body when the transfer fits in it.
#[must_use]
pub fn classify(frame: &DecodedFrame) -> Classified {
    let hdr = &frame.header;
    if hdr.is_service() {
        trace!(type_id = hdr.type_id, "service frame");
        return Classified::Service;
    }
    let Some(kind) = kind_of(hdr.type_id) else {
        debug!(
            type_id = hdr.type_id,
            source = hdr.source_node_id,
            "unrecognized message type; dropping"
        );
        return Classified::Unrecognized(hdr.type_id);
    };
    if !frame.is_single_frame() {
        trace!(%kind, tid = frame.tail.transfer_id, "multi-frame transfer");
        return Classified::MultiFrame(kind);
    }

    match kind {
        MessageKind::NodeStatus => match decode_node_status(&frame.body) {
            Ok(status) => Classified::Telemetry(Envelope::new(
                hdr.source_node_id,
                TelemetryVariant::NodeStatus(status),
            )),
            Err(err) => {
                debug!(source = hdr.source_node_id, "bad NodeStatus body: {err}");
                Classified::Malformed(kind)
            }
        },
        // these never fit in a single frame
        MessageKind::Fix | MessageKind::Fix2 | MessageKind::Auxiliary => {
            Classified::MultiFrame(kind)
        }
    }
}
