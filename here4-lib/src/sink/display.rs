use serde::Serialize;

use super::{AuxiliaryUpdate, FixContext, Sink};
use crate::{NodeId, Result};

/// Everything shown on the live screen. `NaN` and `None` are not yet known.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LiveState {
    pub last_nid: Option<NodeId>,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub speed: f64,
    pub sats_used: Option<u32>,
    pub sats_visible: Option<u32>,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            last_nid: None,
            lat: f64::NAN,
            lon: f64::NAN,
            alt: f64::NAN,
            speed: f64::NAN,
            sats_used: None,
            sats_visible: None,
            pdop: f64::NAN,
            hdop: f64::NAN,
            vdop: f64::NAN,
        }
    }
}

impl LiveState {
    /// Fold in a fix. Speed, satellites and PDOP keep their previous value when the
    /// fix does not carry them.
    pub fn apply_fix(&mut self, fix: &FixContext<'_>) {
        let rec = fix.record;
        self.last_nid = Some(rec.source_node_id);
        self.lat = rec.lat_deg;
        self.lon = rec.lon_deg;
        self.alt = rec.alt_m;
        if rec.velocity_enu.is_some() {
            self.speed = rec.speed_mps();
        }
        if let Some(used) = rec.sats_used {
            self.sats_used = Some(used);
        }
        if let Some(pdop) = rec.pdop {
            self.pdop = pdop;
        }
    }

    /// Fold in an auxiliary update. Unknown DOPs do not erase known ones.
    pub fn apply_auxiliary(&mut self, update: &AuxiliaryUpdate) {
        let snap = &update.snapshot;
        self.sats_visible = Some(snap.sats_visible);
        for (dst, v) in [
            (&mut self.pdop, snap.pdop),
            (&mut self.hdop, snap.hdop),
            (&mut self.vdop, snap.vdop),
        ] {
            if !v.is_nan() {
                *dst = v;
            }
        }
    }
}

/// Something that can show a [LiveState], e.g., a terminal.
pub trait Screen {
    fn draw(&mut self, state: &LiveState) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that folds telemetry into a [LiveState] and redraws its [Screen] from
/// [Sink::tick], never more often than `interval` seconds.
pub struct LiveDisplay<S: Screen> {
    screen: S,
    state: LiveState,
    interval: f64,
    last_draw: f64,
    draws: usize,
}

impl<S: Screen> LiveDisplay<S> {
    /// Redraw interval for 10 Hz.
    pub const DEFAULT_INTERVAL: f64 = 0.1;

    pub fn new(screen: S, interval: f64) -> Self {
        Self {
            screen,
            state: LiveState::default(),
            interval,
            last_draw: f64::NEG_INFINITY,
            draws: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> &LiveState {
        &self.state
    }

    #[must_use]
    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }
}

impl<S: Screen> Sink for LiveDisplay<S> {
    fn name(&self) -> &'static str {
        "display"
    }

    fn on_fix(&mut self, fix: &FixContext<'_>) -> Result<()> {
        self.state.apply_fix(fix);
        Ok(())
    }

    fn on_auxiliary(&mut self, update: &AuxiliaryUpdate) -> Result<()> {
        self.state.apply_auxiliary(update);
        Ok(())
    }

    fn tick(&mut self, now: f64) -> Result<()> {
        if now - self.last_draw <= self.interval {
            return Ok(());
        }
        self.last_draw = now;
        self.draws += 1;
        self.screen.draw(&self.state)
    }

    fn close(&mut self) -> Result<()> {
        self.screen.close()
    }
}
