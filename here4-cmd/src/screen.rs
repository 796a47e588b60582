use std::{
    io::{self, stdin, BufRead, Write},
    thread,
};

use anyhow::{Context, Result};
use handlebars::{handlebars_helper, Handlebars};
use here4::{
    pump::StopToken,
    sink::{LiveState, Screen},
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const CLEAR: &str = "\x1b[2J\x1b[H";

const TEMPLATE: &str = "Here4 Live (DroneCAN @ {{ bitrate }} bps)   {{ quit_hint }}

NID: {{ opt state.last_nid }}   Sats used/vis: {{ opt state.sats_used }}/{{ opt state.sats_visible }}
Lat: {{ fixed 7 state.lat }}  Lon: {{ fixed 7 state.lon }}  Alt: {{ fixed 2 state.alt }} m
Speed: {{ fixed 2 state.speed }} m/s   PDOP: {{ fixed 2 state.pdop }}  HDOP: {{ fixed 2 state.hdop }}  VDOP: {{ fixed 2 state.vdop }}
";

#[derive(Serialize)]
struct View<'a> {
    bitrate: u32,
    quit_hint: &'static str,
    state: &'a LiveState,
}

/// Hint shown while `quit_on_keypress` is watching stdin.
pub const KEYPRESS_HINT: &str = "q+Enter=quit";
/// Hint shown when stdin carries bus input.
pub const SIGNAL_HINT: &str = "Ctrl-C=quit";

/// Full-screen text view redrawn in place with ANSI escapes.
pub struct TextScreen<W: Write> {
    out: W,
    hb: Handlebars<'static>,
    bitrate: u32,
    quit_hint: &'static str,
    clear: bool,
}

impl<W: Write> TextScreen<W> {
    pub fn new(out: W, bitrate: u32) -> Result<Self> {
        // unknown values serialize as null
        handlebars_helper!(fixed: |places: u64, v: Json| {
            match v.as_f64() {
                Some(v) => format!("{v:.*}", usize::try_from(places).unwrap_or(0)),
                None => "-".to_string(),
            }
        });
        handlebars_helper!(opt: |v: Json| {
            match v {
                Value::Null => "-".to_string(),
                other => other.to_string(),
            }
        });
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        hb.register_helper("fixed", Box::new(fixed));
        hb.register_helper("opt", Box::new(opt));
        hb.register_template_string("live", TEMPLATE)
            .context("compiling live template")?;
        Ok(Self {
            out,
            hb,
            bitrate,
            quit_hint: KEYPRESS_HINT,
            clear: true,
        })
    }

    /// Disable the clear-screen prefix, e.g., when not writing to a terminal.
    #[must_use]
    pub fn without_clear(mut self) -> Self {
        self.clear = false;
        self
    }

    #[must_use]
    pub fn with_quit_hint(mut self, hint: &'static str) -> Self {
        self.quit_hint = hint;
        self
    }

    pub fn render(&self, state: &LiveState) -> Result<String> {
        let view = View {
            bitrate: self.bitrate,
            quit_hint: self.quit_hint,
            state,
        };
        self.hb.render("live", &view).context("rendering live view")
    }
}

impl<W: Write> Screen for TextScreen<W> {
    fn draw(&mut self, state: &LiveState) -> here4::Result<()> {
        let text = self
            .render(state)
            .map_err(|err| io::Error::other(format!("{err:#}")))?;
        if self.clear {
            self.out.write_all(CLEAR.as_bytes())?;
        }
        self.out.write_all(text.as_bytes())?;
        Ok(self.out.flush()?)
    }

    fn close(&mut self) -> here4::Result<()> {
        Ok(self.out.flush()?)
    }
}

/// Stop `token` when `q` is entered on stdin. The terminal is line buffered so the key
/// must be followed by Enter.
pub fn quit_on_keypress(token: StopToken) -> Result<()> {
    thread::Builder::new()
        .name("quit-key".into())
        .spawn(move || {
            for line in stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().eq_ignore_ascii_case("q") {
                    debug!("quit requested");
                    token.stop();
                    break;
                }
            }
        })
        .context("spawning keypress thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_state() {
        let screen = TextScreen::new(Vec::new(), 1_000_000).unwrap();
        let text = screen.render(&LiveState::default()).unwrap();
        assert_eq!(
            text,
            "Here4 Live (DroneCAN @ 1000000 bps)   q+Enter=quit\n\
             \n\
             NID: -   Sats used/vis: -/-\n\
             Lat: -  Lon: -  Alt: - m\n\
             Speed: - m/s   PDOP: -  HDOP: -  VDOP: -\n"
        );
    }

    #[test]
    fn quit_hint_follows_input() {
        let screen = TextScreen::new(Vec::new(), 1_000_000)
            .unwrap()
            .with_quit_hint(SIGNAL_HINT);
        let text = screen.render(&LiveState::default()).unwrap();
        assert!(
            text.starts_with("Here4 Live (DroneCAN @ 1000000 bps)   Ctrl-C=quit\n"),
            "{text}"
        );
    }

    #[test]
    fn cleared_unless_disabled() {
        let mut screen = TextScreen::new(Vec::new(), 1_000_000).unwrap();
        screen.draw(&LiveState::default()).unwrap();
        assert!(screen.out.starts_with(CLEAR.as_bytes()));

        let mut screen = TextScreen::new(Vec::new(), 1_000_000).unwrap().without_clear();
        screen.draw(&LiveState::default()).unwrap();
        assert!(screen.out.starts_with(b"Here4 Live"));
    }

    #[test]
    fn known_state() {
        let state = LiveState {
            last_nid: Some(124),
            lat: 1.234_567_89,
            lon: -9.876_543_21,
            alt: 1.5,
            speed: 3.0,
            sats_used: Some(14),
            sats_visible: Some(22),
            pdop: 1.25,
            hdop: 0.7,
            vdop: 1.1,
        };
        let mut screen = TextScreen::new(Vec::new(), 500_000).unwrap().without_clear();
        screen.draw(&state).unwrap();
        let text = String::from_utf8(screen.out).unwrap();
        assert!(text.contains("NID: 124   Sats used/vis: 14/22\n"), "{text}");
        assert!(
            text.contains("Lat: 1.2345679  Lon: -9.8765432  Alt: 1.50 m\n"),
            "{text}"
        );
        assert!(
            text.contains("Speed: 3.00 m/s   PDOP: 1.25  HDOP: 0.70  VDOP: 1.10\n"),
            "{text}"
        );
    }
}
