use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{AuxiliaryUpdate, FixContext, Sink};
use crate::{Error, Result};

/// Columns of the fix log.
pub const FIX_LOG_HEADER: [&str; 11] = [
    "ts_unix",
    "nid",
    "lat_deg",
    "lon_deg",
    "alt_m",
    "sats_used",
    "status",
    "mode",
    "sub_mode",
    "pdop",
    "speed_mps",
];

/// Columns of the auxiliary log.
pub const AUX_LOG_HEADER: [&str; 8] = [
    "ts_unix",
    "nid",
    "sats_used",
    "sats_visible",
    "pdop",
    "hdop",
    "vdop",
    "gdop",
];

/// Format `v` with a fixed number of decimals. Non-finite values are unknown and
/// produce an empty cell.
pub(crate) fn decimal(v: f64, places: usize) -> String {
    if v.is_finite() {
        format!("{v:.places$}")
    } else {
        String::new()
    }
}

fn cell<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Append-only CSV file flushed after every row.
///
/// The header is written only if the file did not exist when opened, so restarts keep
/// appending to the same table. There is no locking; a path must have one writer.
#[derive(Debug)]
pub struct CsvLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: usize,
}

impl CsvLog {
    /// Open `path` for appending, creating it with a `header` row if it does not exist.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be opened or the header cannot be written.
    pub fn open<P: AsRef<Path>>(path: P, header: &[&str]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let new_file = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        if new_file {
            writeln!(writer, "{}", header.join(","))?;
            writer.flush()?;
        }
        info!(path = %path.display(), new_file, "opened log");
        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written since opening, not counting the header.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Write one row and flush it.
    ///
    /// # Errors
    /// [Error::SinkClosed] after [CsvLog::close], otherwise [Error::Io].
    pub fn write_row(&mut self, cells: &[String]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::SinkClosed { sink: "log" });
        };
        writeln!(writer, "{}", cells.join(","))?;
        writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close the file. Later calls do nothing.
    ///
    /// # Errors
    /// [Error::Io] if the final flush fails.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), rows = self.rows, "closed log");
        }
        Ok(())
    }
}

/// One row per accepted fix.
#[derive(Debug)]
pub struct FixLog(CsvLog);

impl FixLog {
    /// # Errors
    /// See [CsvLog::open].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self(CsvLog::open(path, &FIX_LOG_HEADER)?))
    }

    #[must_use]
    pub fn log(&self) -> &CsvLog {
        &self.0
    }
}

impl Sink for FixLog {
    fn name(&self) -> &'static str {
        "fix-log"
    }

    fn on_fix(&mut self, fix: &FixContext<'_>) -> Result<()> {
        let rec = fix.record;
        self.0.write_row(&[
            decimal(rec.timestamp, 3),
            rec.source_node_id.to_string(),
            decimal(rec.lat_deg, 9),
            decimal(rec.lon_deg, 9),
            decimal(rec.alt_m, 3),
            cell(rec.sats_used),
            cell(rec.status),
            cell(rec.mode),
            cell(rec.sub_mode),
            rec.pdop.map(|v| decimal(v, 2)).unwrap_or_default(),
            decimal(rec.speed_mps(), 3),
        ])
    }

    fn close(&mut self) -> Result<()> {
        self.0.close()
    }
}

/// One row per auxiliary metrics message.
#[derive(Debug)]
pub struct AuxLog(CsvLog);

impl AuxLog {
    /// # Errors
    /// See [CsvLog::open].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self(CsvLog::open(path, &AUX_LOG_HEADER)?))
    }

    #[must_use]
    pub fn log(&self) -> &CsvLog {
        &self.0
    }
}

impl Sink for AuxLog {
    fn name(&self) -> &'static str {
        "aux-log"
    }

    fn on_fix(&mut self, _fix: &FixContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_auxiliary(&mut self, update: &AuxiliaryUpdate) -> Result<()> {
        let snap = &update.snapshot;
        self.0.write_row(&[
            decimal(update.timestamp, 3),
            update.source_node_id.to_string(),
            snap.sats_used.to_string(),
            snap.sats_visible.to_string(),
            decimal(snap.pdop, 2),
            decimal(snap.hdop, 2),
            decimal(snap.vdop, 2),
            decimal(snap.gdop, 2),
        ])
    }

    fn close(&mut self) -> Result<()> {
        self.0.close()
    }
}
