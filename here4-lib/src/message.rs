//! Typed telemetry messages as delivered by a DroneCAN stack.
//!
//! Field names follow the DSDL definitions. Every field that is not present in all
//! revisions of a message is optional, and an absent field is simply `None`.
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// `uavcan.equipment.gnss.Fix`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PositionFix {
    pub latitude_deg_1e8: Option<i64>,
    pub longitude_deg_1e8: Option<i64>,
    pub height_msl_mm: Option<i64>,
    pub height_ellipsoid_mm: Option<i64>,
    pub sats_used: Option<u32>,
    pub status: Option<u8>,
    pub mode: Option<u8>,
}

/// `uavcan.equipment.gnss.Fix2`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PositionFix2 {
    pub latitude_deg_1e8: Option<i64>,
    pub longitude_deg_1e8: Option<i64>,
    pub height_msl_mm: Option<i64>,
    pub height_ellipsoid_mm: Option<i64>,
    /// North, east, down in m/s. Only usable with exactly 3 elements.
    pub ned_velocity: Option<Vec<f64>>,
    pub north_velocity: Option<f64>,
    pub east_velocity: Option<f64>,
    pub down_velocity: Option<f64>,
    pub sats_used: Option<u32>,
    pub status: Option<u8>,
    pub mode: Option<u8>,
    pub sub_mode: Option<u8>,
    pub pdop: Option<f64>,
    /// Row-major 3x3 covariance. Only usable with exactly 9 elements.
    pub position_covariance: Option<Vec<f64>>,
}

/// `uavcan.equipment.gnss.Auxiliary`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryMetrics {
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub gdop: Option<f64>,
    pub sats_used: Option<u32>,
    pub sats_visible: Option<u32>,
}

/// `uavcan.protocol.NodeStatus`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStatus {
    pub uptime_sec: u32,
    pub health: u8,
    pub mode: u8,
    pub sub_mode: u8,
    pub vendor_specific_status_code: u16,
}

impl NodeStatus {
    pub const HEALTH_OK: u8 = 0;
    pub const HEALTH_WARNING: u8 = 1;
    pub const HEALTH_ERROR: u8 = 2;
    pub const HEALTH_CRITICAL: u8 = 3;

    pub const MODE_OPERATIONAL: u8 = 0;
    pub const MODE_INITIALIZATION: u8 = 1;
    pub const MODE_MAINTENANCE: u8 = 2;
    pub const MODE_SOFTWARE_UPDATE: u8 = 3;
    pub const MODE_OFFLINE: u8 = 7;
}

/// The telemetry schema variants observed on the bus.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TelemetryVariant {
    PositionFix(PositionFix),
    PositionFix2(PositionFix2),
    AuxiliaryMetrics(AuxiliaryMetrics),
    NodeStatus(NodeStatus),
}

impl TelemetryVariant {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::PositionFix(_) => MessageKind::Fix,
            Self::PositionFix2(_) => MessageKind::Fix2,
            Self::AuxiliaryMetrics(_) => MessageKind::Auxiliary,
            Self::NodeStatus(_) => MessageKind::NodeStatus,
        }
    }
}

/// Short tag for each [TelemetryVariant].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    Fix,
    Fix2,
    Auxiliary,
    NodeStatus,
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fix => "Fix",
            Self::Fix2 => "Fix2",
            Self::Auxiliary => "Auxiliary",
            Self::NodeStatus => "NodeStatus",
        };
        f.write_str(name)
    }
}

/// A message together with the node that sent it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source_node_id: NodeId,
    pub message: TelemetryVariant,
}

impl Envelope {
    #[must_use]
    pub fn new(source_node_id: NodeId, message: TelemetryVariant) -> Self {
        Self {
            source_node_id,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_from_json_with_missing_fields() {
        let line = r#"{"source_node_id":124,"message":{"PositionFix2":{"latitude_deg_1e8":123456789,"longitude_deg_1e8":-987654321,"ned_velocity":[1.0,2.0,-3.0]}}}"#;
        let env: Envelope = serde_json::from_str(line).unwrap();

        assert_eq!(env.source_node_id, 124);
        assert_eq!(env.message.kind(), MessageKind::Fix2);
        let TelemetryVariant::PositionFix2(fix) = env.message else {
            panic!("expected Fix2");
        };
        assert_eq!(fix.latitude_deg_1e8, Some(123_456_789));
        assert_eq!(fix.height_msl_mm, None);
        assert_eq!(fix.ned_velocity, Some(vec![1.0, 2.0, -3.0]));
        assert_eq!(fix.position_covariance, None);
    }

    #[test]
    fn kind_names() {
        assert_eq!(MessageKind::Fix.to_string(), "Fix");
        assert_eq!(MessageKind::Fix2.to_string(), "Fix2");
    }
}
