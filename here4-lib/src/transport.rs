//! Sources of bus traffic for the [crate::pump::Pump].
//!
//! There are two entry points: raw frames, which still need decoding, and messages
//! already deframed by a DroneCAN stack.
use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use tracing::debug;

use crate::{frame::RawFrame, message::Envelope, Error, Result};

/// One unit of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Frame(RawFrame),
    Message(Envelope),
}

impl From<RawFrame> for Incoming {
    fn from(frame: RawFrame) -> Self {
        Self::Frame(frame)
    }
}

impl From<Envelope> for Incoming {
    fn from(envelope: Envelope) -> Self {
        Self::Message(envelope)
    }
}

pub trait Transport {
    /// Wait at most `timeout` for the next input.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    ///
    /// # Errors
    /// [Error::Disconnected] when no further input will ever arrive. Other errors are
    /// transient and polling may continue.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Incoming>>;
}

/// Transport fed through a channel, usually by a reader thread.
pub struct ChannelTransport {
    rx: Receiver<Result<Incoming>>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelTransport {
    /// Channel capacity used by [ChannelTransport::spawn].
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    #[must_use]
    pub fn new(rx: Receiver<Result<Incoming>>) -> Self {
        Self { rx, handle: None }
    }

    /// Drain `source` on a background thread named `name`.
    ///
    /// The thread ends when `source` is exhausted or the transport is dropped. An
    /// exhausted source shows up as [Error::Disconnected] once all queued input has
    /// been polled.
    ///
    /// # Errors
    /// [Error::Io] if the thread cannot be spawned.
    pub fn spawn<I>(name: &str, source: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Incoming>> + Send + 'static,
        I::IntoIter: Send,
    {
        let (tx, rx) = bounded(Self::DEFAULT_BUFFER_SIZE);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                for item in source {
                    if tx.send(item).is_err() {
                        debug!(thread = thread_name, "receiver gone; stopping");
                        return;
                    }
                }
                debug!(thread = thread_name, "source exhausted");
            })?;
        Ok(Self {
            rx,
            handle: Some(handle),
        })
    }

    /// True while the reader thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Transport for ChannelTransport {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Incoming>> {
        match self.rx.recv_timeout(timeout) {
            Ok(zult) => zult.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }
}
