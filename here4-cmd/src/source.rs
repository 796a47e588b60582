use std::{
    fs::File,
    io::{stdin, BufRead, BufReader},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use here4::{
    frame::RawFrame,
    message::Envelope,
    transport::{ChannelTransport, Incoming},
};
use regex::Regex;
use tracing::{debug, info, warn};

/// Where bus traffic comes from.
#[derive(Debug, Clone)]
pub enum Input {
    /// JSON lines of already decoded messages.
    Messages(PathBuf),
    /// `candump -L` log of raw frames.
    Candump(PathBuf),
    /// Live SocketCAN interface.
    Interface { name: String, bitrate: u32 },
}

fn open_lines(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(stdin())));
    }
    let file = File::open(path).with_context(|| format!("opening {path:?}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Parse one `candump -L` line, e.g., `(1700000000.123456) can1 1401557F#AD000000080000CB`.
///
/// Returns `None` for lines that are not extended data frames.
pub fn parse_candump_line(line: &str) -> Option<RawFrame> {
    static RX: OnceLock<Regex> = OnceLock::new();
    let rx = RX.get_or_init(|| {
        Regex::new(r"^\s*(?:\([0-9.]+\)\s+)?(?:\S+\s+)?([0-9A-Fa-f]{8})#([0-9A-Fa-f]{0,16})\s*$")
            .expect("regex to compile")
    });
    let cap = rx.captures(line)?;
    let id = u32::from_str_radix(&cap[1], 16).ok()?;
    let payload = hex::decode(&cap[2]).ok()?;
    RawFrame::new(id, &payload)
}

/// Start a reader thread for `input` and return the transport it feeds.
pub fn open(input: &Input) -> Result<ChannelTransport> {
    let transport = match input {
        Input::Messages(path) => {
            info!("reading messages from {path:?}");
            let lines = open_lines(path)?;
            let items = lines.lines().enumerate().filter_map(|(idx, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => match serde_json::from_str::<Envelope>(&line) {
                    Ok(env) => Some(Ok(Incoming::Message(env))),
                    Err(err) => {
                        warn!(line = idx + 1, "invalid message: {err}");
                        None
                    }
                },
                Err(err) => Some(Err(here4::Error::from(err))),
            });
            ChannelTransport::spawn("messages", items)?
        }
        Input::Candump(path) => {
            info!("reading frames from {path:?}");
            let lines = open_lines(path)?;
            let items = lines.lines().enumerate().filter_map(|(idx, line)| match line {
                Ok(line) => {
                    let frame = parse_candump_line(&line);
                    if frame.is_none() && !line.trim().is_empty() {
                        debug!(line = idx + 1, "not an extended data frame: {line}");
                    }
                    frame.map(|f| Ok(Incoming::Frame(f)))
                }
                Err(err) => Some(Err(here4::Error::from(err))),
            });
            ChannelTransport::spawn("candump", items)?
        }
        Input::Interface { name, bitrate } => open_interface(name, *bitrate)?,
    };
    Ok(transport)
}

#[cfg(feature = "socketcan")]
fn open_interface(name: &str, bitrate: u32) -> Result<ChannelTransport> {
    use socketcan::{CanSocket, Socket};

    let socket =
        CanSocket::open(name).with_context(|| format!("opening CAN interface {name}"))?;
    info!("listening on {name}; the interface must already be up at {bitrate} bps");
    let frames = std::iter::from_fn(move || match socket.read_frame() {
        Ok(frame) => Some(Ok(RawFrame::from_can_frame(&frame))),
        Err(err) => Some(Err(err)),
    })
    .filter_map(|zult| match zult {
        Ok(Some(frame)) => Some(Ok(Incoming::Frame(frame))),
        Ok(None) => None,
        Err(err) => Some(Err(here4::Error::Transport(err.to_string()))),
    });
    Ok(ChannelTransport::spawn(name, frames)?)
}

#[cfg(not(feature = "socketcan"))]
fn open_interface(name: &str, _bitrate: u32) -> Result<ChannelTransport> {
    anyhow::bail!("cannot open {name}: built without the socketcan feature; use --messages or --candump")
}
