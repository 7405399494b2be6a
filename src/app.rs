/// # app
///
/// The host's main loop: wait for input until the next tick is due, feed
/// everything that arrived on the event channel through the host, then run
/// the due tick. Only I/O errors end the loop; anything else is reported
/// and the loop carries on.
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::backend::Backend;
use crate::catalog::RomCatalog;
use crate::display::Display;
use crate::error::HostError;
use crate::input::Input;
use crate::session::{Flow, Host, HostEvent};

/// longest the loop blocks on input when nothing is scheduled
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Cycles through catalog entries, fetching each in the background.
pub struct RomCursor {
    catalog: RomCatalog,
    index: usize,
}

impl RomCursor {
    pub fn new(catalog: RomCatalog, index: usize) -> Self {
        RomCursor { catalog, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fetch_current<B: Send + 'static>(&self, tx: &Sender<HostEvent<B>>) {
        if let Some(entry) = self.catalog.entries.get(self.index) {
            info!("fetching {}", entry.title);
        }
        self.catalog
            .fetch_in_background(self.index, tx.clone(), HostEvent::from);
    }

    pub fn advance(&mut self) {
        if !self.catalog.entries.is_empty() {
            self.index = (self.index + 1) % self.catalog.entries.len();
        }
    }
}

pub fn run<B, D, I>(
    host: &mut Host<B, D>,
    input: &mut I,
    events: &Receiver<HostEvent<B>>,
    tx: &Sender<HostEvent<B>>,
    roms: &mut RomCursor,
) -> Result<(), HostError>
where
    B: Backend + Send + 'static,
    D: Display,
    I: Input,
{
    loop {
        let timeout = host
            .time_until_next_tick(Instant::now())
            .map_or(IDLE_POLL, |t| t.min(IDLE_POLL));

        for event in input.poll_events(timeout)? {
            if step(host, HostEvent::Input(event), tx, roms)? == Flow::Quit {
                return Ok(());
            }
        }

        loop {
            match events.try_recv() {
                Ok(event) => {
                    if step(host, event, tx, roms)? == Flow::Quit {
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("event channel closed");
                    break;
                }
            }
        }

        host.run_due(Instant::now())?;
    }
}

fn step<B, D>(
    host: &mut Host<B, D>,
    event: HostEvent<B>,
    tx: &Sender<HostEvent<B>>,
    roms: &mut RomCursor,
) -> Result<Flow, HostError>
where
    B: Backend + Send + 'static,
    D: Display,
{
    match host.dispatch(event, Instant::now()) {
        Ok(Flow::NextRom) => {
            roms.advance();
            roms.fetch_current(tx);
            Ok(Flow::Continue)
        }
        Ok(flow) => Ok(flow),
        Err(HostError::Io(err)) => Err(HostError::Io(err)),
        Err(err) => {
            host.report(&err);
            Ok(Flow::Continue)
        }
    }
}
