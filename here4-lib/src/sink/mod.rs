//! Fan-out of normalized telemetry to independent sinks.
//!
//! Every sink is called for every event, in the order the sinks were added. A
//! failing sink never prevents delivery to the others: failures are collected in a
//! [DispatchReport] for the caller to log.
mod console;
mod display;
mod log;
mod publish;

pub use console::*;
pub use display::*;
pub use log::*;
pub use publish::*;

use tracing::debug;

use crate::{
    auxiliary::AuxiliarySnapshot,
    gate::{ConsoleTicket, RateGate},
    message::TelemetryVariant,
    normalize::{Event, NodeStatusEvent, NormalizedFixRecord},
    Error, NodeId, Result,
};

/// Everything a sink gets to see about one accepted fix.
#[derive(Debug, Clone, Copy)]
pub struct FixContext<'a> {
    pub record: &'a NormalizedFixRecord,
    /// The message the record was normalized from.
    pub message: &'a TelemetryVariant,
    /// Auxiliary cache content at dispatch time.
    pub aux: AuxiliarySnapshot,
    pub console: ConsoleTicket,
}

/// An auxiliary metrics message was received and cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxiliaryUpdate {
    pub timestamp: f64,
    pub source_node_id: NodeId,
    pub snapshot: AuxiliarySnapshot,
}

/// A telemetry consumer owning its delivery resource.
pub trait Sink {
    fn name(&self) -> &'static str;

    fn on_fix(&mut self, fix: &FixContext<'_>) -> Result<()>;

    fn on_auxiliary(&mut self, _update: &AuxiliaryUpdate) -> Result<()> {
        Ok(())
    }

    fn on_status(&mut self, _status: &NodeStatusEvent) -> Result<()> {
        Ok(())
    }

    /// Called after every poll, whether or not anything arrived.
    fn tick(&mut self, _now: f64) -> Result<()> {
        Ok(())
    }

    /// Flush and release the sink resource. Must tolerate repeated calls.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct SinkFailure {
    pub sink: &'static str,
    pub error: Error,
}

/// Result of delivering one event to all sinks.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<SinkFailure>,
}

impl DispatchReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, sink: &'static str, zult: Result<()>) {
        match zult {
            Ok(()) => self.delivered += 1,
            Err(error) => {
                debug!(sink, "sink failed: {error}");
                self.failures.push(SinkFailure { sink, error });
            }
        }
    }
}

/// Owns the sinks and the console [RateGate].
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    gate: RateGate,
    closed: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(RateGate::default())
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(gate: RateGate) -> Self {
        Self {
            sinks: Vec::default(),
            gate,
            closed: false,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn each<F>(&mut self, mut f: F) -> DispatchReport
    where
        F: FnMut(&mut dyn Sink) -> Result<()>,
    {
        let mut report = DispatchReport::default();
        for sink in &mut self.sinks {
            let zult = f(sink.as_mut());
            report.record(sink.name(), zult);
        }
        report
    }

    /// Deliver a fix to every sink.
    pub fn dispatch(
        &mut self,
        record: &NormalizedFixRecord,
        message: &TelemetryVariant,
        aux: AuxiliarySnapshot,
    ) -> DispatchReport {
        let ctx = FixContext {
            record,
            message,
            aux,
            console: self.gate.ticket(record.kind, record.timestamp),
        };
        self.each(|sink| sink.on_fix(&ctx))
    }

    /// Deliver any normalizer [Event]. `aux` is used for fixes only; auxiliary events
    /// carry their own snapshot.
    pub fn dispatch_event(&mut self, event: &Event, aux: AuxiliarySnapshot) -> DispatchReport {
        match event {
            Event::Fix { record, message } => self.dispatch(record, message, aux),
            Event::Auxiliary {
                timestamp,
                source_node_id,
                snapshot,
            } => {
                let update = AuxiliaryUpdate {
                    timestamp: *timestamp,
                    source_node_id: *source_node_id,
                    snapshot: *snapshot,
                };
                self.each(|sink| sink.on_auxiliary(&update))
            }
            Event::Status(status) => self.each(|sink| sink.on_status(status)),
        }
    }

    pub fn tick(&mut self, now: f64) -> DispatchReport {
        self.each(|sink| sink.tick(now))
    }

    /// Close every sink. Only the first call does anything.
    pub fn close(&mut self) -> DispatchReport {
        if self.closed {
            return DispatchReport::default();
        }
        self.closed = true;
        self.each(|sink| sink.close())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for failure in self.close().failures {
            debug!(sink = failure.sink, "close failed on drop: {}", failure.error);
        }
    }
}
