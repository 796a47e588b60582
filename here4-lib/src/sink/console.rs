use std::{fmt::Display, io::Write};

use super::{AuxiliaryUpdate, FixContext, Sink};
use crate::{normalize::NodeStatusEvent, Result};

fn or_dash<T: Display>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Human readable output.
///
/// Fix lines are throttled by the dispatcher's gate, and the full message structure is
/// dumped the first time each kind is seen. Auxiliary and node status lines are
/// printed for every message.
pub struct ThrottledConsole<W: Write> {
    out: W,
}

impl<W: Write> ThrottledConsole<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for ThrottledConsole<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn on_fix(&mut self, fix: &FixContext<'_>) -> Result<()> {
        let rec = fix.record;
        if fix.console.line {
            writeln!(
                self.out,
                "GNSS[{}]: lat={:.7} lon={:.7} alt_m={:.2} sats={} mode={} status={} PDOP={:.2} v={:.2} m/s",
                rec.kind,
                rec.lat_deg,
                rec.lon_deg,
                rec.alt_m,
                or_dash(rec.sats_used),
                or_dash(rec.mode),
                or_dash(rec.status),
                rec.pdop.unwrap_or(f64::NAN),
                rec.speed_mps(),
            )?;
        }
        if fix.console.dump {
            let body = serde_json::to_string_pretty(fix.message)?;
            writeln!(
                self.out,
                "[dump once] {} from nid={}:\n{body}",
                rec.kind, rec.source_node_id
            )?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_auxiliary(&mut self, update: &AuxiliaryUpdate) -> Result<()> {
        let s = &update.snapshot;
        writeln!(
            self.out,
            "DOPs: PDOP={:.2} HDOP={:.2} VDOP={:.2} GDOP={:.2}  sats used/vis: {}/{}",
            s.pdop, s.hdop, s.vdop, s.gdop, s.sats_used, s.sats_visible
        )?;
        Ok(self.out.flush()?)
    }

    fn on_status(&mut self, status: &NodeStatusEvent) -> Result<()> {
        writeln!(
            self.out,
            "NodeStatus: nid={} uptime={}s health={} mode={}",
            status.source_node_id, status.uptime_sec, status.health, status.mode
        )?;
        Ok(self.out.flush()?)
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.out.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auxiliary::AuxiliarySnapshot,
        gate::ConsoleTicket,
        message::{MessageKind, PositionFix2, TelemetryVariant},
        normalize::NormalizedFixRecord,
    };

    fn record() -> NormalizedFixRecord {
        NormalizedFixRecord {
            timestamp: 1.0,
            source_node_id: 124,
            kind: MessageKind::Fix2,
            lat_deg: 1.234_567_89,
            lon_deg: -9.876_543_21,
            alt_m: 1.5,
            velocity_enu: Some([2.0, 1.0, 2.0]),
            sats_used: Some(14),
            pdop: Some(1.2),
            position_covariance: None,
            status: Some(3),
            mode: None,
            sub_mode: None,
        }
    }

    fn output(console: ThrottledConsole<Vec<u8>>) -> String {
        String::from_utf8(console.into_inner()).unwrap()
    }

    #[test]
    fn fix_line() {
        let rec = record();
        let msg = TelemetryVariant::PositionFix2(PositionFix2::default());
        let mut console = ThrottledConsole::new(Vec::new());
        console
            .on_fix(&FixContext {
                record: &rec,
                message: &msg,
                aux: AuxiliarySnapshot::default(),
                console: ConsoleTicket {
                    line: true,
                    dump: false,
                },
            })
            .unwrap();
        assert_eq!(
            output(console),
            "GNSS[Fix2]: lat=1.2345679 lon=-9.8765432 alt_m=1.50 sats=14 mode=- status=3 PDOP=1.20 v=3.00 m/s\n"
        );
    }

    #[test]
    fn nothing_without_ticket() {
        let rec = record();
        let msg = TelemetryVariant::PositionFix2(PositionFix2::default());
        let mut console = ThrottledConsole::new(Vec::new());
        console
            .on_fix(&FixContext {
                record: &rec,
                message: &msg,
                aux: AuxiliarySnapshot::default(),
                console: ConsoleTicket::default(),
            })
            .unwrap();
        assert!(output(console).is_empty());
    }

    #[test]
    fn dump_contains_message_fields() {
        let rec = record();
        let msg = TelemetryVariant::PositionFix2(PositionFix2 {
            latitude_deg_1e8: Some(123_456_789),
            ..Default::default()
        });
        let mut console = ThrottledConsole::new(Vec::new());
        console
            .on_fix(&FixContext {
                record: &rec,
                message: &msg,
                aux: AuxiliarySnapshot::default(),
                console: ConsoleTicket {
                    line: false,
                    dump: true,
                },
            })
            .unwrap();
        let out = output(console);
        assert!(out.starts_with("[dump once] Fix2 from nid=124:\n"), "{out}");
        assert!(out.contains("\"latitude_deg_1e8\": 123456789"), "{out}");
    }

    #[test]
    fn auxiliary_and_status_lines() {
        let mut console = ThrottledConsole::new(Vec::new());
        console
            .on_auxiliary(&AuxiliaryUpdate {
                timestamp: 1.0,
                source_node_id: 124,
                snapshot: AuxiliarySnapshot {
                    pdop: 1.0,
                    hdop: 0.5,
                    vdop: 0.75,
                    gdop: 1.25,
                    sats_used: 12,
                    sats_visible: 20,
                },
            })
            .unwrap();
        console
            .on_status(&NodeStatusEvent {
                timestamp: 1.0,
                source_node_id: 124,
                uptime_sec: 173,
                health: 0,
                mode: 1,
                sub_mode: 0,
            })
            .unwrap();
        assert_eq!(
            output(console),
            "DOPs: PDOP=1.00 HDOP=0.50 VDOP=0.75 GDOP=1.25  sats used/vis: 12/20\n\
             NodeStatus: nid=124 uptime=173s health=0 mode=1\n"
        );
    }
}
