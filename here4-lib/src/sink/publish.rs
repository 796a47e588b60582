use std::io::Write;

use serde::Serialize;
use tracing::trace;

use super::{AuxiliaryUpdate, FixContext, Sink};
use crate::{auxiliary::Diagnostics, Result};

/// Logical publish channels.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Fix,
    Velocity,
    Diagnostics,
    SatsUsed,
    SatsVisible,
    Pdop,
    Hdop,
    Vdop,
}

/// Whether `position_covariance` carries a reported covariance.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceType {
    Unknown,
    Known,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FixPayload {
    pub frame_id: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Row-major 3x3, present only when known.
    pub position_covariance: Option<[f64; 9]>,
    pub position_covariance_type: CovarianceType,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: &'static str,
    pub value: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    Fix(FixPayload),
    /// East, north, up in m/s.
    Velocity { linear: [f64; 3] },
    Diagnostics {
        name: &'static str,
        values: Vec<KeyValue>,
    },
    Count(u32),
    Scalar(f64),
}

/// One message on one topic.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Publication {
    pub topic: Topic,
    /// Seconds since the Unix epoch.
    pub stamp: f64,
    pub data: Payload,
}

/// Publications for one fix: `fix`, then `velocity`, `sats_used` and `pdop` if the
/// fix has them, then the merged `diagnostics`.
#[must_use]
pub fn fix_publications(fix: &FixContext<'_>) -> Vec<Publication> {
    let rec = fix.record;
    let stamp = rec.timestamp;
    let mut pubs = vec![Publication {
        topic: Topic::Fix,
        stamp,
        data: Payload::Fix(FixPayload {
            frame_id: "gps",
            latitude: rec.lat_deg,
            longitude: rec.lon_deg,
            altitude: rec.alt_m,
            position_covariance: rec.position_covariance,
            position_covariance_type: if rec.position_covariance.is_some() {
                CovarianceType::Known
            } else {
                CovarianceType::Unknown
            },
        }),
    }];
    if let Some(linear) = rec.velocity_enu {
        pubs.push(Publication {
            topic: Topic::Velocity,
            stamp,
            data: Payload::Velocity { linear },
        });
    }
    if let Some(used) = rec.sats_used {
        pubs.push(Publication {
            topic: Topic::SatsUsed,
            stamp,
            data: Payload::Count(used),
        });
    }
    if let Some(pdop) = rec.pdop {
        pubs.push(Publication {
            topic: Topic::Pdop,
            stamp,
            data: Payload::Scalar(pdop),
        });
    }
    let values = Diagnostics::merge(rec, &fix.aux)
        .pairs()
        .into_iter()
        .map(|(key, value)| KeyValue { key, value })
        .collect();
    pubs.push(Publication {
        topic: Topic::Diagnostics,
        stamp,
        data: Payload::Diagnostics {
            name: "Here4 GNSS DOPs",
            values,
        },
    });
    pubs
}

/// Publications for an auxiliary update. Unknown DOPs are skipped; counts are
/// always published.
#[must_use]
pub fn auxiliary_publications(update: &AuxiliaryUpdate) -> Vec<Publication> {
    let stamp = update.timestamp;
    let snap = &update.snapshot;
    let mut pubs = Vec::with_capacity(5);
    for (topic, v) in [
        (Topic::Hdop, snap.hdop),
        (Topic::Vdop, snap.vdop),
        (Topic::Pdop, snap.pdop),
    ] {
        if !v.is_nan() {
            pubs.push(Publication {
                topic,
                stamp,
                data: Payload::Scalar(v),
            });
        }
    }
    pubs.push(Publication {
        topic: Topic::SatsUsed,
        stamp,
        data: Payload::Count(snap.sats_used),
    });
    pubs.push(Publication {
        topic: Topic::SatsVisible,
        stamp,
        data: Payload::Count(snap.sats_visible),
    });
    pubs
}

/// Transport for publications.
pub trait Publisher {
    fn publish(&mut self, publication: &Publication) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes each publication as one JSON object per line.
pub struct JsonLinesPublisher<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        serde_json::to_writer(&mut self.writer, publication)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }
}

/// Sink publishing at arrival rate, without batching or acknowledgement.
pub struct PublishChannel<P: Publisher> {
    publisher: P,
    published: usize,
}

impl<P: Publisher> PublishChannel<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            published: 0,
        }
    }

    #[must_use]
    pub fn published(&self) -> usize {
        self.published
    }

    fn publish_all(&mut self, pubs: Vec<Publication>) -> Result<()> {
        for p in &pubs {
            trace!(topic = ?p.topic, "publish");
            self.publisher.publish(p)?;
            self.published += 1;
        }
        self.publisher.flush()
    }
}

impl<P: Publisher> Sink for PublishChannel<P> {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn on_fix(&mut self, fix: &FixContext<'_>) -> Result<()> {
        self.publish_all(fix_publications(fix))
    }

    fn on_auxiliary(&mut self, update: &AuxiliaryUpdate) -> Result<()> {
        self.publish_all(auxiliary_publications(update))
    }

    fn close(&mut self) -> Result<()> {
        self.publisher.flush()
    }
}
