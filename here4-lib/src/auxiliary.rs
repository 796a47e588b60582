//! Most recent auxiliary (DOP and satellite count) metrics.
//!
//! Auxiliary messages arrive on their own schedule, independent of fixes. The cache
//! keeps only the last one: updates are unconditional overwrites without any
//! ordering or staleness check, so a fix may be merged with an arbitrarily old
//! snapshot.
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::{message::AuxiliaryMetrics, normalize::NormalizedFixRecord};

/// Copy of the cache contents. `NaN` DOPs are unknown.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct AuxiliarySnapshot {
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub gdop: f64,
    pub sats_used: u32,
    pub sats_visible: u32,
}

impl Default for AuxiliarySnapshot {
    fn default() -> Self {
        Self {
            pdop: f64::NAN,
            hdop: f64::NAN,
            vdop: f64::NAN,
            gdop: f64::NAN,
            sats_used: 0,
            sats_visible: 0,
        }
    }
}

impl From<&AuxiliaryMetrics> for AuxiliarySnapshot {
    fn from(m: &AuxiliaryMetrics) -> Self {
        Self {
            pdop: m.pdop.unwrap_or(f64::NAN),
            hdop: m.hdop.unwrap_or(f64::NAN),
            vdop: m.vdop.unwrap_or(f64::NAN),
            gdop: m.gdop.unwrap_or(f64::NAN),
            sats_used: m.sats_used.unwrap_or(0),
            sats_visible: m.sats_visible.unwrap_or(0),
        }
    }
}

/// Single-sensor auxiliary cache for use on one execution context.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryCache {
    current: AuxiliarySnapshot,
}

impl AuxiliaryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite every field with those of `metrics`. Absent fields reset to their
    /// unknown values.
    pub fn update(&mut self, metrics: &AuxiliaryMetrics) {
        self.current = AuxiliarySnapshot::from(metrics);
    }

    #[must_use]
    pub fn snapshot(&self) -> AuxiliarySnapshot {
        self.current
    }
}

/// [AuxiliaryCache] for producers and readers on different threads. Update and
/// snapshot are mutually exclusive.
#[derive(Debug, Clone, Default)]
pub struct SharedAuxiliaryCache(Arc<Mutex<AuxiliaryCache>>);

impl SharedAuxiliaryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, metrics: &AuxiliaryMetrics) {
        // a panic mid-update cannot leave a partial snapshot, so poison is ignored
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(metrics);
    }

    #[must_use]
    pub fn snapshot(&self) -> AuxiliarySnapshot {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }
}

/// DOP set and satellite counts merged from a fix and the auxiliary cache.
///
/// Values carried by the fix itself take precedence over cached ones.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Diagnostics {
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub gdop: f64,
    pub sats_used: u32,
    pub sats_visible: u32,
}

impl Diagnostics {
    #[must_use]
    pub fn merge(record: &NormalizedFixRecord, aux: &AuxiliarySnapshot) -> Self {
        Self {
            pdop: record.pdop.unwrap_or(aux.pdop),
            hdop: aux.hdop,
            vdop: aux.vdop,
            gdop: aux.gdop,
            sats_used: record.sats_used.unwrap_or(aux.sats_used),
            sats_visible: aux.sats_visible,
        }
    }

    /// Key/value pairs in publish order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PDOP", self.pdop.to_string()),
            ("HDOP", self.hdop.to_string()),
            ("VDOP", self.vdop.to_string()),
            ("GDOP", self.gdop.to_string()),
            ("sats_used", self.sats_used.to_string()),
            ("sats_visible", self.sats_visible.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pdop: f64, used: u32) -> AuxiliaryMetrics {
        AuxiliaryMetrics {
            pdop: Some(pdop),
            hdop: Some(pdop / 2.0),
            vdop: Some(pdop * 2.0),
            gdop: Some(pdop + 1.0),
            sats_used: Some(used),
            sats_visible: Some(used + 4),
        }
    }

    #[test]
    fn default_is_unknown() {
        let snap = AuxiliaryCache::new().snapshot();
        assert!(snap.pdop.is_nan());
        assert!(snap.hdop.is_nan());
        assert!(snap.vdop.is_nan());
        assert!(snap.gdop.is_nan());
        assert_eq!(snap.sats_used, 0);
        assert_eq!(snap.sats_visible, 0);
    }

    #[test]
    fn last_write_wins() {
        let mut cache = AuxiliaryCache::new();
        for i in 1..=10 {
            cache.update(&metrics(f64::from(i), i));
        }
        cache.update(&metrics(1.5, 7));

        let expected = AuxiliarySnapshot {
            pdop: 1.5,
            hdop: 0.75,
            vdop: 3.0,
            gdop: 2.5,
            sats_used: 7,
            sats_visible: 11,
        };
        assert_eq!(cache.snapshot(), expected);
        // reads do not change anything
        assert_eq!(cache.snapshot(), expected);
    }

    #[test]
    fn absent_fields_overwrite_with_unknown() {
        let mut cache = AuxiliaryCache::new();
        cache.update(&metrics(1.5, 7));
        cache.update(&AuxiliaryMetrics {
            hdop: Some(0.9),
            ..Default::default()
        });

        let snap = cache.snapshot();
        assert_eq!(snap.hdop, 0.9);
        assert!(snap.pdop.is_nan());
        assert_eq!(snap.sats_used, 0);
    }

    #[test]
    fn shared_cache_across_threads() {
        let cache = SharedAuxiliaryCache::new();
        let writer = cache.clone();
        std::thread::spawn(move || writer.update(&metrics(2.0, 9)))
            .join()
            .unwrap();
        assert_eq!(cache.snapshot().sats_used, 9);
    }
}
