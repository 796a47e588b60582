//! Console throttling and one-time structure dumps.
use std::collections::HashSet;

use crate::message::MessageKind;

/// What the console may print for one fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleTicket {
    /// Print the one-line summary.
    pub line: bool,
    /// Print the full message structure; true at most once per message kind.
    pub dump: bool,
}

/// Process-wide gate. Not per source node.
#[derive(Debug, Clone)]
pub struct RateGate {
    interval: f64,
    last_console_print: f64,
    dumped_once: HashSet<MessageKind>,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl RateGate {
    /// Minimum seconds between console lines, i.e., 5 Hz.
    pub const DEFAULT_INTERVAL: f64 = 0.2;

    #[must_use]
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            last_console_print: f64::NEG_INFINITY,
            dumped_once: HashSet::new(),
        }
    }

    /// True if more than the interval has passed since the last granted print, in
    /// which case `now` becomes the last print time.
    pub fn allow_print(&mut self, now: f64) -> bool {
        if now - self.last_console_print > self.interval {
            self.last_console_print = now;
            true
        } else {
            false
        }
    }

    /// True the first time `kind` is seen.
    pub fn first_dump(&mut self, kind: MessageKind) -> bool {
        self.dumped_once.insert(kind)
    }

    pub fn ticket(&mut self, kind: MessageKind, now: f64) -> ConsoleTicket {
        ConsoleTicket {
            line: self.allow_print(now),
            dump: self.first_dump(kind),
        }
    }

    /// Kinds that have been dumped so far.
    #[must_use]
    pub fn dumped(&self) -> &HashSet<MessageKind> {
        &self.dumped_once
    }
}
