mod decode;
mod screen;
mod signal;
mod source;

use std::{
    fs::OpenOptions,
    io::{stderr, stdout, IsTerminal, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use here4::{
    pump::{Pump, PumpConfig, StopToken},
    sink::{AuxLog, FixLog, JsonLinesPublisher, LiveDisplay, PublishChannel, Sink, ThrottledConsole},
    NodeId,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use source::Input;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct BusArgs {
    /// SocketCAN interface to listen on.
    ///
    /// The interface must already be up at the requested bitrate, e.g.,
    /// `ip link set can1 type can bitrate 1000000 && ip link set can1 up`. Requires
    /// the socketcan feature.
    #[arg(long, default_value = "can1")]
    can_if: String,

    /// Bus bitrate in bits per second.
    #[arg(long, default_value_t = 1_000_000)]
    bitrate: u32,

    /// Our node id. NodeStatus messages from this id are ignored.
    #[arg(long, default_value_t = 125, value_parser = clap::value_parser!(u8).range(0..=127))]
    node_id: NodeId,

    /// Read already decoded messages, one JSON object per line, instead of the
    /// interface. Use - for stdin.
    #[arg(long, value_name = "path", conflicts_with = "candump")]
    messages: Option<PathBuf>,

    /// Read raw frames from a `candump -L` log instead of the interface. Use - for stdin.
    #[arg(long, value_name = "path")]
    candump: Option<PathBuf>,

    /// Maximum time to wait for input before checking for shutdown.
    #[arg(long, default_value_t = 200, value_name = "ms")]
    poll_timeout: u64,
}

impl BusArgs {
    fn input(&self) -> Input {
        if let Some(path) = &self.messages {
            Input::Messages(path.clone())
        } else if let Some(path) = &self.candump {
            Input::Candump(path.clone())
        } else {
            Input::Interface {
                name: self.can_if.clone(),
                bitrate: self.bitrate,
            }
        }
    }

    fn reads_stdin(&self) -> bool {
        let dash = Path::new("-");
        self.messages.as_deref() == Some(dash) || self.candump.as_deref() == Some(dash)
    }

    fn pump_config(&self) -> PumpConfig {
        PumpConfig::builder()
            .own_node_id(self.node_id)
            .poll_timeout(Duration::from_millis(self.poll_timeout))
            .build()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log GNSS fixes and auxiliary metrics to CSV and print a throttled summary.
    ///
    /// Logs are appended to; the header row is only written when a file is created.
    Listen {
        #[command(flatten)]
        bus: BusArgs,

        /// Fix log path.
        #[arg(long, default_value = "here4_gnss.csv", value_name = "path")]
        log: PathBuf,

        /// Auxiliary (DOP and satellite count) log path.
        #[arg(long, default_value = "here4_gnss_aux.csv", value_name = "path")]
        aux_log: PathBuf,
    },
    /// Live terminal view of position, speed, satellites and DOPs.
    ///
    /// Enter q to quit.
    Live {
        #[command(flatten)]
        bus: BusArgs,

        /// Also log fixes to this CSV file.
        #[arg(long, value_name = "path")]
        log_csv: Option<PathBuf>,

        /// Minimum seconds between screen refreshes.
        #[arg(long, default_value_t = 0.1)]
        refresh: f64,
    },
    /// Publish fix, velocity, DOP and satellite topics as JSON lines.
    Bridge {
        #[command(flatten)]
        bus: BusArgs,

        /// Publish destination. Use - for stdout.
        #[arg(short, long, default_value = "-", value_name = "path")]
        output: PathBuf,

        /// Also log fixes to this CSV file.
        #[arg(long, value_name = "path")]
        log: Option<PathBuf>,
    },
    /// Decode raw frames given as <id>#<payload>, e.g., 1401557F#AD000000080000CB.
    Decode {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: decode::Format,

        /// Frames in candump notation.
        #[arg(required = true)]
        frames: Vec<String>,
    },
}

fn run(bus: &BusArgs, sinks: Vec<Box<dyn Sink>>, stop: StopToken) -> Result<()> {
    let transport = source::open(&bus.input())?;
    let mut pump = Pump::new(transport, sinks, &bus.pump_config()).with_stop_token(stop);
    let stats = pump.run();
    if stats.sink_failures > 0 {
        warn!(failures = stats.sink_failures, "some sink deliveries failed");
    }
    debug!(
        "stats: {}",
        serde_json::to_string(&stats).context("serializing stats")?
    );
    Ok(())
}

fn publish_dest(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(stdout()));
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening publish output {path:?}"))?;
    Ok(Box::new(file))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("HERE4_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let stop = StopToken::new();
    match &cli.command {
        Commands::Listen { bus, log, aux_log } => {
            signal::stop_on_signal(&stop);
            let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(
                FixLog::open(log).with_context(|| format!("opening fix log {log:?}"))?,
            )];
            sinks.push(Box::new(
                AuxLog::open(aux_log).with_context(|| format!("opening aux log {aux_log:?}"))?,
            ));
            sinks.push(Box::new(ThrottledConsole::new(stdout())));
            info!("listening; Ctrl-C to stop");
            run(bus, sinks, stop)
        }
        Commands::Live {
            bus,
            log_csv,
            refresh,
        } => {
            signal::stop_on_signal(&stop);
            let mut view = screen::TextScreen::new(stdout(), bus.bitrate)?;
            if bus.reads_stdin() {
                warn!("input is stdin; quit with Ctrl-C");
                view = view.with_quit_hint(screen::SIGNAL_HINT);
            } else {
                screen::quit_on_keypress(stop.clone())?;
            }
            if !stdout().is_terminal() {
                view = view.without_clear();
            }
            let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(LiveDisplay::new(view, *refresh))];
            if let Some(path) = log_csv {
                sinks.push(Box::new(
                    FixLog::open(path).with_context(|| format!("opening fix log {path:?}"))?,
                ));
            }
            run(bus, sinks, stop)
        }
        Commands::Bridge { bus, output, log } => {
            signal::stop_on_signal(&stop);
            let publisher = JsonLinesPublisher::new(publish_dest(output)?);
            let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(PublishChannel::new(publisher))];
            if let Some(path) = log {
                sinks.push(Box::new(
                    FixLog::open(path).with_context(|| format!("opening fix log {path:?}"))?,
                ));
            }
            run(bus, sinks, stop)
        }
        Commands::Decode { format, frames } => decode::decode(frames, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn bus_defaults() {
        let cli = Cli::try_parse_from(["here4", "listen"]).unwrap();
        let Commands::Listen { bus, log, aux_log } = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(bus.can_if, "can1");
        assert_eq!(bus.bitrate, 1_000_000);
        assert_eq!(bus.node_id, 125);
        assert_eq!(log, PathBuf::from("here4_gnss.csv"));
        assert_eq!(aux_log, PathBuf::from("here4_gnss_aux.csv"));
        assert!(matches!(bus.input(), Input::Interface { .. }));
        assert_eq!(bus.pump_config().poll_timeout, Duration::from_millis(200));
    }

    #[test]
    fn node_id_range() {
        assert!(Cli::try_parse_from(["here4", "live", "--node-id", "128"]).is_err());
        assert!(Cli::try_parse_from(["here4", "live", "--messages", "a", "--candump", "b"]).is_err());
    }

    #[test]
    fn stdin_input() {
        let cli = Cli::try_parse_from(["here4", "bridge", "--candump", "-"]).unwrap();
        let Commands::Bridge { bus, output, .. } = cli.command else {
            panic!("expected bridge");
        };
        assert!(bus.reads_stdin());
        assert_eq!(output, PathBuf::from("-"));
    }
}
