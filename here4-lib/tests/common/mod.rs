#![allow(dead_code)]
use std::{
    cell::Cell,
    fs,
    io::{self, Write},
    path::PathBuf,
    rc::Rc,
    sync::{Arc, Mutex},
};

use here4::{
    message::Envelope,
    normalize::NodeStatusEvent,
    sink::{AuxiliaryUpdate, FixContext, Sink},
    transport::Incoming,
    Result,
};

pub const NOW: f64 = 1_700_000_000.5;

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

/// Envelopes from a JSON lines fixture, wrapped for a transport.
pub fn session(name: &str) -> Vec<Result<Incoming>> {
    fs::read_to_string(fixture_path(name))
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            let env: Envelope = serde_json::from_str(l).unwrap();
            Ok(Incoming::Message(env))
        })
        .collect()
}

/// Writer whose contents stay readable after it was moved into a sink.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Forwards to `inner` and counts close calls.
pub struct CountingCloses<S: Sink> {
    pub inner: S,
    pub closes: Rc<Cell<usize>>,
}

impl<S: Sink> Sink for CountingCloses<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn on_fix(&mut self, fix: &FixContext<'_>) -> Result<()> {
        self.inner.on_fix(fix)
    }

    fn on_auxiliary(&mut self, update: &AuxiliaryUpdate) -> Result<()> {
        self.inner.on_auxiliary(update)
    }

    fn on_status(&mut self, status: &NodeStatusEvent) -> Result<()> {
        self.inner.on_status(status)
    }

    fn close(&mut self) -> Result<()> {
        self.closes.set(self.closes.get() + 1);
        self.inner.close()
    }
}

/// Fails every call.
pub struct Broken;

impl Sink for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn on_fix(&mut self, _fix: &FixContext<'_>) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone").into())
    }

    fn on_auxiliary(&mut self, _update: &AuxiliaryUpdate) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone").into())
    }
}
