use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::presenter::GRID_COLOUR;
use crate::scheduler::Scheduler;
use crate::session::{ErrorSink, SessionSetup};

/// Who steps the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Topology {
    /// the host tick runs one VM cycle, then presents
    Cooperative,
    /// the VM runs on its own thread; the host tick presents its newest frame
    Offloaded,
}

/// Run a CHIP-8 ROM in the terminal
#[derive(Debug, Parser)]
#[command(name = "chip8-host", version)]
pub struct Args {
    /// ROM file to run
    #[arg(conflicts_with = "catalog")]
    pub rom: Option<PathBuf>,

    /// JSON ROM catalog: [{ "file", "title", "keyMapping"? }]
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// title of the catalog entry to start with; needs --catalog
    #[arg(long)]
    pub select: Option<String>,

    /// host ticks per second
    #[arg(long, default_value_t = 60.0, value_parser = positive_rate)]
    pub rate: f64,

    /// on-screen pixels per VM pixel
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=64))]
    pub scale: u32,

    /// draw a grid on cell boundaries
    #[arg(long)]
    pub grid: bool,

    #[arg(long, value_enum, default_value_t = Topology::Cooperative)]
    pub topology: Topology,

    /// instructions per VM cycle
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..))]
    pub quantum: u32,

    /// offloaded VM cycle period in milliseconds
    #[arg(long, default_value_t = 2)]
    pub worker_period_ms: u64,

    /// how long a terminal key counts as held after its last repeat
    #[arg(long, default_value_t = 150)]
    pub key_hold_ms: u64,

    /// write logs here instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Cross-argument rules clap can't express once a positional ROM
    /// conflicts with the catalog.
    pub fn check(&self) -> Result<(), clap::Error> {
        if self.select.is_some() && self.catalog.is_none() {
            return Err(Self::command().error(
                ErrorKind::MissingRequiredArgument,
                "--select only picks from a --catalog",
            ));
        }
        Ok(())
    }

    /// parse and check, for callers that want the error back
    pub fn try_parse_checked<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let args = Self::try_parse_from(itr)?;
        args.check()?;
        Ok(args)
    }
}

fn positive_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("rate must be a positive number of ticks per second, got {s}"))
    }
}

/// Host settings independent of the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub rate_hz: f64,
    pub scale: usize,
    pub grid: bool,
    pub topology: Topology,
    pub quantum: u32,
    pub worker_period: Duration,
    pub key_hold: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            rate_hz: 60.0,
            scale: 10,
            grid: false,
            topology: Topology::Cooperative,
            quantum: 8,
            worker_period: Duration::from_millis(2),
            key_hold: Duration::from_millis(150),
        }
    }
}

impl HostConfig {
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::with_rate(self.rate_hz)
    }

    /// everything but the backend, for `Host::new`
    pub fn setup<D>(&self, display: D, errors: Box<dyn ErrorSink>) -> SessionSetup<D> {
        SessionSetup {
            display,
            scheduler: self.scheduler(),
            scale: self.scale,
            grid: self.grid.then_some(GRID_COLOUR),
            errors,
        }
    }
}

impl From<&Args> for HostConfig {
    fn from(args: &Args) -> Self {
        HostConfig {
            rate_hz: args.rate,
            scale: args.scale as usize,
            grid: args.grid,
            topology: args.topology,
            quantum: args.quantum,
            worker_period: Duration::from_millis(args.worker_period_ms),
            key_hold: Duration::from_millis(args.key_hold_ms),
        }
    }
}
