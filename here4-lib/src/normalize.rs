//! Normalization of the fix variants into one canonical record, and routing of the
//! other telemetry kinds.
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    auxiliary::{AuxiliaryCache, AuxiliarySnapshot},
    message::{Envelope, MessageKind, PositionFix, PositionFix2, TelemetryVariant},
    NodeId,
};

/// Canonical position fix, independent of the message variant that produced it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NormalizedFixRecord {
    /// Seconds since the Unix epoch at which the fix was received.
    pub timestamp: f64,
    pub source_node_id: NodeId,
    /// Variant the record was produced from, [MessageKind::Fix] or [MessageKind::Fix2].
    pub kind: MessageKind,
    pub lat_deg: f64,
    pub lon_deg: f64,
    /// `NaN` if the fix has no height.
    pub alt_m: f64,
    /// East, north, up in m/s.
    pub velocity_enu: Option<[f64; 3]>,
    pub sats_used: Option<u32>,
    pub pdop: Option<f64>,
    pub position_covariance: Option<[f64; 9]>,
    pub status: Option<u8>,
    pub mode: Option<u8>,
    pub sub_mode: Option<u8>,
}

impl NormalizedFixRecord {
    /// Speed over ground and vertical combined, or `NaN` without velocity.
    #[must_use]
    pub fn speed_mps(&self) -> f64 {
        self.velocity_enu.map_or(f64::NAN, norm3)
    }
}

/// Convert a north, east, down vector to east, north, up.
#[must_use]
pub fn ned_to_enu([north, east, down]: [f64; 3]) -> [f64; 3] {
    [east, north, -down]
}

/// Euclidean norm of a 3-vector.
#[must_use]
pub fn norm3([x, y, z]: [f64; 3]) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

/// Field view shared by both fix variants.
struct FixFields<'a> {
    lat: Option<i64>,
    lon: Option<i64>,
    height_msl_mm: Option<i64>,
    height_ellipsoid_mm: Option<i64>,
    ned_velocity: Option<&'a [f64]>,
    ned_components: [Option<f64>; 3],
    sats_used: Option<u32>,
    pdop: Option<f64>,
    covariance: Option<&'a [f64]>,
    status: Option<u8>,
    mode: Option<u8>,
    sub_mode: Option<u8>,
}

impl<'a> From<&'a PositionFix> for FixFields<'a> {
    fn from(m: &'a PositionFix) -> Self {
        FixFields {
            lat: m.latitude_deg_1e8,
            lon: m.longitude_deg_1e8,
            height_msl_mm: m.height_msl_mm,
            height_ellipsoid_mm: m.height_ellipsoid_mm,
            ned_velocity: None,
            ned_components: [None; 3],
            sats_used: m.sats_used,
            pdop: None,
            covariance: None,
            status: m.status,
            mode: m.mode,
            sub_mode: None,
        }
    }
}

impl<'a> From<&'a PositionFix2> for FixFields<'a> {
    fn from(m: &'a PositionFix2) -> Self {
        FixFields {
            lat: m.latitude_deg_1e8,
            lon: m.longitude_deg_1e8,
            height_msl_mm: m.height_msl_mm,
            height_ellipsoid_mm: m.height_ellipsoid_mm,
            ned_velocity: m.ned_velocity.as_deref(),
            ned_components: [m.north_velocity, m.east_velocity, m.down_velocity],
            sats_used: m.sats_used,
            pdop: m.pdop,
            covariance: m.position_covariance.as_deref(),
            status: m.status,
            mode: m.mode,
            sub_mode: m.sub_mode,
        }
    }
}

impl FixFields<'_> {
    /// The vector field wins when it has exactly 3 elements, otherwise all three
    /// scalar components must be present.
    fn velocity_ned(&self) -> Option<[f64; 3]> {
        if let Some(&[n, e, d]) = self.ned_velocity {
            return Some([n, e, d]);
        }
        match self.ned_components {
            [Some(n), Some(e), Some(d)] => Some([n, e, d]),
            _ => None,
        }
    }

    fn covariance(&self) -> Option<[f64; 9]> {
        self.covariance.and_then(|c| <[f64; 9]>::try_from(c).ok())
    }

    fn into_record(
        self,
        kind: MessageKind,
        source_node_id: NodeId,
        now: f64,
    ) -> Option<NormalizedFixRecord> {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            trace!(source = source_node_id, %kind, "fix without lat/lon; dropping");
            return None;
        };
        let alt_m = self
            .height_msl_mm
            .or(self.height_ellipsoid_mm)
            .map_or(f64::NAN, |mm| mm as f64 / 1000.0);

        Some(NormalizedFixRecord {
            timestamp: now,
            source_node_id,
            kind,
            lat_deg: lat as f64 / 1e8,
            lon_deg: lon as f64 / 1e8,
            alt_m,
            velocity_enu: self.velocity_ned().map(ned_to_enu),
            sats_used: self.sats_used,
            pdop: self.pdop,
            position_covariance: self.covariance(),
            status: self.status,
            mode: self.mode,
            sub_mode: self.sub_mode,
        })
    }
}

/// Normalize a fix message into a [NormalizedFixRecord].
///
/// Returns `None` for non-fix variants and for fixes missing latitude or longitude,
/// the only reason a fix is rejected. Missing height, velocity or covariance
/// degrade the record (`NaN` / `None`) instead.
#[must_use]
pub fn normalize(
    msg: &TelemetryVariant,
    source_node_id: NodeId,
    now: f64,
) -> Option<NormalizedFixRecord> {
    match msg {
        TelemetryVariant::PositionFix(m) => {
            FixFields::from(m).into_record(MessageKind::Fix, source_node_id, now)
        }
        TelemetryVariant::PositionFix2(m) => {
            FixFields::from(m).into_record(MessageKind::Fix2, source_node_id, now)
        }
        TelemetryVariant::AuxiliaryMetrics(_) | TelemetryVariant::NodeStatus(_) => None,
    }
}

/// Diagnostic event for a NodeStatus from another node.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct NodeStatusEvent {
    pub timestamp: f64,
    pub source_node_id: NodeId,
    pub uptime_sec: u32,
    pub health: u8,
    pub mode: u8,
    pub sub_mode: u8,
}

/// Output of [Normalizer::accept].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An accepted fix and the message it came from.
    Fix {
        record: NormalizedFixRecord,
        message: TelemetryVariant,
    },
    /// The auxiliary cache was updated; `snapshot` is its new content.
    Auxiliary {
        timestamp: f64,
        source_node_id: NodeId,
        snapshot: AuxiliarySnapshot,
    },
    Status(NodeStatusEvent),
}

/// Routes envelopes by variant. Owns the auxiliary cache and knows the local node id
/// so it can drop our own NodeStatus echoes.
#[derive(Debug, Clone)]
pub struct Normalizer {
    own_node_id: NodeId,
    cache: AuxiliaryCache,
}

impl Normalizer {
    #[must_use]
    pub fn new(own_node_id: NodeId) -> Self {
        Self {
            own_node_id,
            cache: AuxiliaryCache::new(),
        }
    }

    #[must_use]
    pub fn own_node_id(&self) -> NodeId {
        self.own_node_id
    }

    /// Current auxiliary snapshot, for merging into diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> AuxiliarySnapshot {
        self.cache.snapshot()
    }

    /// Accept a message received at `now` (seconds since epoch).
    pub fn accept(&mut self, envelope: Envelope, now: f64) -> Option<Event> {
        let Envelope {
            source_node_id,
            message,
        } = envelope;

        if let Some(record) = normalize(&message, source_node_id, now) {
            return Some(Event::Fix { record, message });
        }

        match message {
            TelemetryVariant::PositionFix(_) | TelemetryVariant::PositionFix2(_) => None,
            TelemetryVariant::AuxiliaryMetrics(metrics) => {
                self.cache.update(&metrics);
                Some(Event::Auxiliary {
                    timestamp: now,
                    source_node_id,
                    snapshot: self.cache.snapshot(),
                })
            }
            TelemetryVariant::NodeStatus(status) => {
                if source_node_id == self.own_node_id {
                    return None;
                }
                debug!(
                    source = source_node_id,
                    uptime = status.uptime_sec,
                    health = status.health,
                    mode = status.mode,
                    "node status"
                );
                Some(Event::Status(NodeStatusEvent {
                    timestamp: now,
                    source_node_id,
                    uptime_sec: status.uptime_sec,
                    health: status.health,
                    mode: status.mode,
                    sub_mode: status.sub_mode,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AuxiliaryMetrics, NodeStatus};

    const NOW: f64 = 1_700_000_000.25;

    fn fix2() -> PositionFix2 {
        PositionFix2 {
            latitude_deg_1e8: Some(123_456_789),
            longitude_deg_1e8: Some(-987_654_321),
            height_msl_mm: Some(1500),
            ..Default::default()
        }
    }

    #[test]
    fn scales_lat_lon_alt() {
        let rec = normalize(&TelemetryVariant::PositionFix2(fix2()), 124, NOW).unwrap();
        assert_eq!(rec.lat_deg, 1.234_567_89);
        assert_eq!(rec.lon_deg, -9.876_543_21);
        assert_eq!(rec.alt_m, 1.5);
        assert_eq!(rec.timestamp, NOW);
        assert_eq!(rec.source_node_id, 124);
        assert_eq!(rec.kind, MessageKind::Fix2);
    }

    #[test]
    fn missing_longitude_is_rejected() {
        let msg = TelemetryVariant::PositionFix(PositionFix {
            latitude_deg_1e8: Some(123_456_789),
            height_msl_mm: Some(1500),
            ..Default::default()
        });
        assert_eq!(normalize(&msg, 124, NOW), None);
    }

    #[test]
    fn altitude_preference() {
        let mut m = fix2();
        m.height_ellipsoid_mm = Some(2500);
        let rec = normalize(&TelemetryVariant::PositionFix2(m.clone()), 1, NOW).unwrap();
        assert_eq!(rec.alt_m, 1.5);

        m.height_msl_mm = None;
        let rec = normalize(&TelemetryVariant::PositionFix2(m.clone()), 1, NOW).unwrap();
        assert_eq!(rec.alt_m, 2.5);

        m.height_ellipsoid_mm = None;
        let rec = normalize(&TelemetryVariant::PositionFix2(m), 1, NOW).unwrap();
        assert!(rec.alt_m.is_nan());
    }

    #[test]
    fn velocity_vector_to_enu() {
        let mut m = fix2();
        m.ned_velocity = Some(vec![1.0, 2.0, -3.0]);
        let rec = normalize(&TelemetryVariant::PositionFix2(m), 1, NOW).unwrap();
        assert_eq!(rec.velocity_enu, Some([2.0, 1.0, 3.0]));
    }

    #[test]
    fn velocity_component_fallback() {
        let mut m = fix2();
        m.ned_velocity = Some(vec![1.0, 2.0]);
        m.north_velocity = Some(1.0);
        m.east_velocity = Some(2.0);
        m.down_velocity = Some(2.0);
        let rec = normalize(&TelemetryVariant::PositionFix2(m.clone()), 1, NOW).unwrap();
        assert_eq!(rec.velocity_enu, Some([2.0, 1.0, -2.0]));
        assert_eq!(rec.speed_mps(), 3.0);

        // no partial vectors
        m.down_velocity = None;
        let rec = normalize(&TelemetryVariant::PositionFix2(m), 1, NOW).unwrap();
        assert_eq!(rec.velocity_enu, None);
        assert!(rec.speed_mps().is_nan());
    }

    #[test]
    fn speed_norm() {
        assert_eq!(norm3([1.0, 2.0, 2.0]), 3.0);
        assert_eq!(ned_to_enu([1.0, 2.0, -3.0]), [2.0, 1.0, 3.0]);
    }

    #[test]
    fn covariance_requires_nine() {
        let mut m = fix2();
        m.position_covariance = Some(vec![0.5; 6]);
        let rec = normalize(&TelemetryVariant::PositionFix2(m.clone()), 1, NOW).unwrap();
        assert_eq!(rec.position_covariance, None);

        m.position_covariance = Some((0..9).map(f64::from).collect());
        let rec = normalize(&TelemetryVariant::PositionFix2(m), 1, NOW).unwrap();
        assert_eq!(
            rec.position_covariance,
            Some([0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
        );
    }

    #[test]
    fn passthrough_fields() {
        let mut m = fix2();
        m.sats_used = Some(14);
        m.pdop = Some(1.2);
        m.status = Some(3);
        m.mode = Some(2);
        m.sub_mode = Some(1);
        let rec = normalize(&TelemetryVariant::PositionFix2(m), 1, NOW).unwrap();
        assert_eq!(rec.sats_used, Some(14));
        assert_eq!(rec.pdop, Some(1.2));
        assert_eq!((rec.status, rec.mode, rec.sub_mode), (Some(3), Some(2), Some(1)));
    }

    #[test]
    fn non_fix_variants_produce_nothing() {
        let aux = TelemetryVariant::AuxiliaryMetrics(AuxiliaryMetrics::default());
        assert_eq!(normalize(&aux, 1, NOW), None);
        let status = TelemetryVariant::NodeStatus(NodeStatus::default());
        assert_eq!(normalize(&status, 1, NOW), None);
    }

    #[test]
    fn normalizer_updates_cache_on_auxiliary() {
        let mut n = Normalizer::new(125);
        let event = n.accept(
            Envelope::new(
                124,
                TelemetryVariant::AuxiliaryMetrics(AuxiliaryMetrics {
                    hdop: Some(0.8),
                    sats_visible: Some(20),
                    ..Default::default()
                }),
            ),
            NOW,
        );
        let Some(Event::Auxiliary { snapshot, .. }) = event else {
            panic!("expected auxiliary event");
        };
        assert_eq!(snapshot.hdop, 0.8);
        assert_eq!(n.snapshot().sats_visible, 20);
    }

    #[test]
    fn normalizer_suppresses_own_status() {
        let mut n = Normalizer::new(125);
        let status = TelemetryVariant::NodeStatus(NodeStatus {
            uptime_sec: 10,
            ..Default::default()
        });
        assert_eq!(n.accept(Envelope::new(125, status.clone()), NOW), None);

        let Some(Event::Status(ev)) = n.accept(Envelope::new(124, status), NOW) else {
            panic!("expected status event");
        };
        assert_eq!(ev.source_node_id, 124);
        assert_eq!(ev.uptime_sec, 10);
    }

    #[test]
    fn normalizer_keeps_message_with_fix() {
        let mut n = Normalizer::new(125);
        let msg = TelemetryVariant::PositionFix2(fix2());
        let Some(Event::Fix { record, message }) = n.accept(Envelope::new(124, msg.clone()), NOW)
        else {
            panic!("expected fix event");
        };
        assert_eq!(message, msg);
        assert_eq!(record.source_node_id, 124);
    }
}
