//! The event loop tying a [Transport] to the [Normalizer] and sink [Dispatcher].
//!
//! Everything runs on the calling thread. The transport poll is the only place the
//! loop waits, and its timeout bounds how long a stop request takes to be noticed.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    dsdl::{self, Classified},
    frame::{decode_frame, RawFrame},
    gate::RateGate,
    message::Envelope,
    normalize::{Event, Normalizer},
    sink::{DispatchReport, Dispatcher, Sink},
    transport::{Incoming, Transport},
    Error, NodeId,
};

/// Cloneable stop request shared with signal handlers and input threads.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Polling,
    Dispatching,
    /// Terminal; sinks have been closed.
    Shutdown,
}

#[derive(TypedBuilder, Debug, Clone)]
pub struct PumpConfig {
    /// Our own node id. NodeStatus messages from it are ignored.
    #[builder(default = 125)]
    pub own_node_id: NodeId,
    /// Upper bound on a single transport poll.
    #[builder(default = Duration::from_millis(200))]
    pub poll_timeout: Duration,
    /// Minimum seconds between throttled console lines.
    #[builder(default = RateGate::DEFAULT_INTERVAL)]
    pub console_interval: f64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Counters for everything the pump has seen.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub polls: usize,
    pub frames: usize,
    pub messages: usize,
    pub fixes: usize,
    pub auxiliary: usize,
    pub statuses: usize,
    /// Messages that produced no event, e.g., fixes without a position.
    pub dropped: usize,
    pub decode_faults: usize,
    pub multi_frame: usize,
    pub unrecognized: usize,
    pub service: usize,
    pub sink_failures: usize,
    pub transport_errors: usize,
}

/// Source of wall-clock time in seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let now = chrono::Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
    }
}

impl<F: Fn() -> f64> Clock for F {
    fn now(&self) -> f64 {
        self()
    }
}

pub struct Pump<T: Transport, C: Clock = SystemClock> {
    transport: T,
    normalizer: Normalizer,
    dispatcher: Dispatcher,
    poll_timeout: Duration,
    clock: C,
    stop: StopToken,
    state: PumpState,
    stats: PumpStats,
}

impl<T: Transport> Pump<T, SystemClock> {
    pub fn new(transport: T, sinks: Vec<Box<dyn Sink>>, config: &PumpConfig) -> Self {
        Self::with_clock(transport, sinks, config, SystemClock)
    }
}

impl<T: Transport, C: Clock> Pump<T, C> {
    pub fn with_clock(
        transport: T,
        sinks: Vec<Box<dyn Sink>>,
        config: &PumpConfig,
        clock: C,
    ) -> Self {
        let mut dispatcher = Dispatcher::new(RateGate::new(config.console_interval));
        for sink in sinks {
            dispatcher.add_sink(sink);
        }
        Self {
            transport,
            normalizer: Normalizer::new(config.own_node_id),
            dispatcher,
            poll_timeout: config.poll_timeout,
            clock,
            stop: StopToken::new(),
            state: PumpState::Idle,
            stats: PumpStats::default(),
        }
    }

    /// Use an existing token, e.g., one already registered with a signal handler.
    #[must_use]
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    #[must_use]
    pub fn state(&self) -> PumpState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> &PumpStats {
        &self.stats
    }

    /// Poll and dispatch until stopped or the transport disconnects, then shut down.
    pub fn run(&mut self) -> PumpStats {
        info!(sinks = ?self.dispatcher.sink_names(), "starting");
        while self.state != PumpState::Shutdown && !self.stop.is_stopped() {
            if !self.step() {
                break;
            }
        }
        self.shutdown()
    }

    /// One poll, dispatch of whatever arrived, and a sink tick. Returns false once the
    /// transport has disconnected.
    pub fn step(&mut self) -> bool {
        self.state = PumpState::Polling;
        self.stats.polls += 1;
        let polled = self.transport.poll(self.poll_timeout);
        let now = self.clock.now();
        let mut connected = true;
        match polled {
            Ok(Some(incoming)) => {
                self.state = PumpState::Dispatching;
                self.handle(incoming, now);
            }
            Ok(None) => {}
            Err(Error::Disconnected) => {
                info!("input disconnected");
                connected = false;
            }
            Err(err) => {
                warn!("transport error: {err}");
                self.stats.transport_errors += 1;
            }
        }
        let report = self.dispatcher.tick(now);
        self.report(&report);
        self.state = PumpState::Idle;
        connected
    }

    /// Process one input received at `now`.
    pub fn handle(&mut self, incoming: Incoming, now: f64) {
        match incoming {
            Incoming::Frame(frame) => self.handle_frame(&frame, now),
            Incoming::Message(envelope) => self.handle_message(envelope, now),
        }
    }

    fn handle_frame(&mut self, frame: &RawFrame, now: f64) {
        self.stats.frames += 1;
        let decoded = match decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(err) => {
                let id = frame.arbitration_id();
                warn!("frame {id:#010x} decode failed: {err}");
                self.stats.decode_faults += 1;
                return;
            }
        };
        match dsdl::classify(&decoded) {
            Classified::Telemetry(envelope) => self.handle_message(envelope, now),
            Classified::MultiFrame(_) => self.stats.multi_frame += 1,
            Classified::Malformed(kind) => {
                warn!(%kind, source = decoded.header.source_node_id, "malformed body");
                self.stats.decode_faults += 1;
            }
            Classified::Service => self.stats.service += 1,
            Classified::Unrecognized(_) => self.stats.unrecognized += 1,
        }
    }

    fn handle_message(&mut self, envelope: Envelope, now: f64) {
        self.stats.messages += 1;
        let Some(event) = self.normalizer.accept(envelope, now) else {
            self.stats.dropped += 1;
            return;
        };
        match event {
            Event::Fix { .. } => self.stats.fixes += 1,
            Event::Auxiliary { .. } => self.stats.auxiliary += 1,
            Event::Status(_) => self.stats.statuses += 1,
        }
        let report = self
            .dispatcher
            .dispatch_event(&event, self.normalizer.snapshot());
        self.report(&report);
    }

    fn report(&mut self, report: &DispatchReport) {
        for failure in &report.failures {
            warn!(sink = failure.sink, "sink failed: {}", failure.error);
        }
        self.stats.sink_failures += report.failures.len();
    }

    /// Close all sinks. Only the first call does anything; later calls return the
    /// final stats again.
    pub fn shutdown(&mut self) -> PumpStats {
        if self.state != PumpState::Shutdown {
            self.state = PumpState::Shutdown;
            self.stop.stop();
            let report = self.dispatcher.close();
            self.report(&report);
            info!(
                fixes = self.stats.fixes,
                auxiliary = self.stats.auxiliary,
                decode_faults = self.stats.decode_faults,
                sink_failures = self.stats.sink_failures,
                "shut down"
            );
        } else {
            debug!("already shut down");
        }
        self.stats.clone()
    }
}

impl<T: Transport, C: Clock> Drop for Pump<T, C> {
    fn drop(&mut self) {
        if self.state != PumpState::Shutdown {
            self.shutdown();
        }
    }
}
