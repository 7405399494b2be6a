use std::error::Error;
use std::fs::File;
use std::sync::mpsc::channel;
use std::thread;

use clap::Parser;
use log::error;

use chip8_host::app::{self, RomCursor};
use chip8_host::backend::{Backend, LocalVm};
use chip8_host::catalog::RomCatalog;
use chip8_host::config::{Args, HostConfig, Topology};
use chip8_host::display::TermDisplay;
use chip8_host::input::TermInput;
use chip8_host::machine::Chip8Machine;
use chip8_host::session::{Host, HostEvent, LogSink};
use chip8_host::worker::WorkerVm;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if let Err(err) = args.check() {
        err.exit();
    }
    init_logging(&args)?;
    let config = HostConfig::from(&args);

    let (catalog, start) = match (&args.catalog, &args.rom) {
        (Some(path), _) => {
            let catalog = RomCatalog::load(path)?;
            let start = match &args.select {
                Some(title) => catalog.position(title)?,
                None => 0,
            };
            (catalog, start)
        }
        (None, Some(rom)) => (RomCatalog::single(rom), 0),
        (None, None) => return Err("give a ROM file or --catalog".into()),
    };

    match config.topology {
        Topology::Cooperative => {
            let quantum = config.quantum;
            run_with(&config, catalog, start, move || {
                Ok(LocalVm::new(Chip8Machine::new(quantum)))
            })
        }
        Topology::Offloaded => {
            let quantum = config.quantum;
            let pending = WorkerVm::spawn(move || Chip8Machine::new(quantum), config.worker_period);
            run_with(&config, catalog, start, move || Ok(pending.wait_ready()?))
        }
    }
}

/// Wire everything up and run until quit. `ready` produces the backend on
/// a side thread; the host is gated until it does.
fn run_with<B, F>(
    config: &HostConfig,
    catalog: RomCatalog,
    start: usize,
    ready: F,
) -> Result<(), Box<dyn Error>>
where
    B: Backend + Send + 'static,
    F: FnOnce() -> Result<B, Box<dyn Error + Send + Sync>> + Send + 'static,
{
    let (tx, rx) = channel();

    let ready_tx = tx.clone();
    thread::spawn(move || match ready() {
        Ok(backend) => {
            let _ = ready_tx.send(HostEvent::Ready(backend));
        }
        Err(e) => error!("VM failed to come up: {e}"),
    });

    let mut roms = RomCursor::new(catalog, start);
    roms.fetch_current(&tx);

    let display = TermDisplay::new()?;
    let mut input = TermInput::new(config.key_hold);
    let mut host: Host<B, TermDisplay> = Host::new(config.setup(display, Box::new(LogSink)));

    app::run(&mut host, &mut input, &rx, &tx, &mut roms)?;
    Ok(())
}

// stderr shares the terminal with the canvas, so keep it quiet unless
// logs go to a file
fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    let default_filter = if args.log_file.is_some() { "info" } else { "warn" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if let Some(path) = &args.log_file {
        builder.target(env_logger::Target::Pipe(Box::new(File::create(path)?)));
    }
    builder.init();
    Ok(())
}
