/// # session
///
/// One running VM session plus the gate in front of it.
///
/// `Session` owns the backend, the scheduler, the active key mapping and
/// the display; event handlers get it by `&mut` rather than reaching for
/// globals. `Host` holds everything needed to build a session and refuses
/// to touch the VM until the backend has been handed over as ready.
///
/// ROM swap order: stage (allocate + copy) → install mapping → stop →
/// reset + load → re-fetch video → start. Staging comes first so an
/// oversized ROM leaves the running session exactly as it was.
use std::time::Instant;

use log::{debug, error, info, trace, warn};

use crate::backend::Backend;
use crate::catalog::RomImage;
use crate::display::Display;
use crate::error::{CatalogError, HostError};
use crate::input::InputEvent;
use crate::keymap::KeyMapping;
use crate::presenter::{Presenter, Rgba};
use crate::scheduler::{Scheduler, Tick};

/// Where tick faults and other non-fatal errors go.
pub trait ErrorSink {
    fn report(&mut self, err: &HostError);
}

/// reports through the log
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&mut self, err: &HostError) {
        error!("{err}");
    }
}

impl<F: FnMut(&HostError)> ErrorSink for F {
    fn report(&mut self, err: &HostError) {
        self(err)
    }
}

pub struct Session<B, D> {
    backend: B,
    display: D,
    scheduler: Scheduler,
    presenter: Presenter,
    mapping: KeyMapping,
    errors: Box<dyn ErrorSink>,
    title: Option<String>,
}

impl<B: Backend, D: Display> Session<B, D> {
    pub fn new(
        backend: B,
        display: D,
        scheduler: Scheduler,
        presenter: Presenter,
        errors: Box<dyn ErrorSink>,
    ) -> Self {
        Session {
            backend,
            display,
            scheduler,
            presenter,
            mapping: KeyMapping::default(),
            errors,
            title: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn mapping(&self) -> &KeyMapping {
        &self.mapping
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Swap in `rom` and start ticking from `now`. On error the previous
    /// ROM, mapping and scheduler state are untouched if staging failed.
    pub fn switch_rom(&mut self, rom: RomImage, now: Instant) -> Result<(), HostError> {
        self.backend.stage_rom(&rom.bytes)?;
        self.mapping = rom.key_mapping.unwrap_or_default();

        self.scheduler.stop();
        self.backend.pause()?;
        self.backend.install_rom()?;
        self.backend.resume()?;
        self.scheduler.start(now);

        info!("running {} ({} bytes)", rom.title, rom.bytes.len());
        self.title = Some(rom.title);
        Ok(())
    }

    /// Hard reset. The VM keeps its ROM; with a ROM loaded, ticking
    /// restarts from `now`, which is also how a faulted session recovers.
    pub fn reset(&mut self, now: Instant) -> Result<(), HostError> {
        debug!("hard reset");
        self.scheduler.stop();
        self.backend.pause()?;
        self.backend.reset()?;
        if self.title.is_some() {
            self.backend.resume()?;
            self.scheduler.start(now);
        }
        Ok(())
    }

    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) -> Result<(), HostError> {
        match event {
            InputEvent::Key { symbol, pressed } => match self.mapping.resolve(symbol) {
                Some(key) => self.backend.set_key(key, *pressed),
                None => {
                    trace!("unmapped symbol {:?}", symbol);
                    Ok(())
                }
            },
            InputEvent::Reset => self.reset(now),
            InputEvent::NextRom | InputEvent::Quit => Ok(()),
        }
    }

    /// stop ticking; safe to call from anywhere, including while handling
    /// a tick
    pub fn stop(&mut self) -> Result<(), HostError> {
        self.scheduler.stop();
        self.backend.pause()
    }

    /// run every tick due at `now` (at most one, see `Scheduler::poll`)
    pub fn run_due(&mut self, now: Instant) -> Result<(), HostError> {
        if let Some(tick) = self.scheduler.poll(now) {
            self.on_tick(tick)?;
        }
        Ok(())
    }

    /// Step and present. A faulting step stops the scheduler and goes to
    /// the error sink; only a broken display is returned as an error.
    pub fn on_tick(&mut self, tick: Tick) -> Result<(), HostError> {
        if !self.scheduler.is_current(tick.timer) {
            trace!("dropping stale tick {:?}", tick);
            return Ok(());
        }
        match self.backend.tick() {
            Ok(Some(cells)) => {
                let surface = self.presenter.present(cells);
                self.display.draw(&surface)?;
            }
            Ok(None) => {}
            Err(source) => {
                self.scheduler.stop();
                if let Err(err) = self.backend.pause() {
                    warn!("pausing after fault: {err}");
                }
                self.errors.report(&HostError::TickFault {
                    tick: tick.seq,
                    source,
                });
            }
        }
        Ok(())
    }

    pub fn report(&mut self, err: &HostError) {
        self.errors.report(err);
    }
}

/// Everything a session needs besides the backend. Presenter geometry
/// comes from the backend once it is ready.
pub struct SessionSetup<D> {
    pub display: D,
    pub scheduler: Scheduler,
    pub scale: usize,
    pub grid: Option<Rgba>,
    pub errors: Box<dyn ErrorSink>,
}

/// Things that happen to the host, from any source.
pub enum HostEvent<B> {
    /// the VM is ready to take calls; honoured once
    Ready(B),
    Input(InputEvent),
    RomFetched(RomImage),
    RomFailed(CatalogError),
}

impl<B> From<Result<RomImage, CatalogError>> for HostEvent<B> {
    fn from(res: Result<RomImage, CatalogError>) -> Self {
        match res {
            Ok(rom) => HostEvent::RomFetched(rom),
            Err(err) => HostEvent::RomFailed(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Ready,
}

/// What the driver loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    NextRom,
    Quit,
}

pub struct Host<B, D> {
    setup: Option<SessionSetup<D>>,
    session: Option<Session<B, D>>,
    pending_rom: Option<RomImage>,
}

impl<B: Backend, D: Display> Host<B, D> {
    pub fn new(setup: SessionSetup<D>) -> Self {
        Host {
            setup: Some(setup),
            session: None,
            pending_rom: None,
        }
    }

    pub fn readiness(&self) -> Readiness {
        match self.session {
            Some(_) => Readiness::Ready,
            None => Readiness::Uninitialized,
        }
    }

    pub fn session(&self) -> Option<&Session<B, D>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session<B, D>> {
        self.session.as_mut()
    }

    /// React to one event. Errors are the caller's to report or bail on.
    pub fn dispatch(&mut self, event: HostEvent<B>, now: Instant) -> Result<Flow, HostError> {
        match event {
            HostEvent::Ready(backend) => {
                self.become_ready(backend, now)?;
                Ok(Flow::Continue)
            }
            HostEvent::Input(InputEvent::Quit) => Ok(Flow::Quit),
            HostEvent::Input(InputEvent::NextRom) => Ok(Flow::NextRom),
            HostEvent::Input(input) => {
                match self.session.as_mut() {
                    Some(session) => session.handle_input(&input, now)?,
                    None => debug!("VM not ready, dropping {:?}", input),
                }
                Ok(Flow::Continue)
            }
            HostEvent::RomFetched(rom) => {
                match self.session.as_mut() {
                    Some(session) => session.switch_rom(rom, now)?,
                    None => {
                        debug!("VM not ready, holding {} until it is", rom.title);
                        self.pending_rom = Some(rom);
                    }
                }
                Ok(Flow::Continue)
            }
            HostEvent::RomFailed(err) => Err(err.into()),
        }
    }

    fn become_ready(&mut self, backend: B, now: Instant) -> Result<(), HostError> {
        let setup = match self.setup.take() {
            Some(setup) => setup,
            None => {
                warn!("VM reported ready twice; ignoring");
                return Ok(());
            }
        };
        let (width, height) = backend.video_size();
        info!("VM ready, {width}x{height} display");
        let mut presenter = Presenter::new(width, height, setup.scale);
        if let Some(colour) = setup.grid {
            presenter = presenter.with_grid(colour);
        }
        let mut session = Session::new(
            backend,
            setup.display,
            setup.scheduler,
            presenter,
            setup.errors,
        );
        let pending = self.pending_rom.take();
        let result = match pending {
            Some(rom) => session.switch_rom(rom, now),
            None => Ok(()),
        };
        self.session = Some(session);
        result
    }

    /// how long the driver may block before the next tick is due
    pub fn time_until_next_tick(&self, now: Instant) -> Option<std::time::Duration> {
        self.session
            .as_ref()
            .and_then(|s| s.scheduler.time_until_next(now))
    }

    pub fn run_due(&mut self, now: Instant) -> Result<(), HostError> {
        match self.session.as_mut() {
            Some(session) => session.run_due(now),
            None => Ok(()),
        }
    }

    /// hand a non-fatal error to the session's sink, or the log before
    /// there is a session
    pub fn report(&mut self, err: &HostError) {
        match (self.session.as_mut(), self.setup.as_mut()) {
            (Some(session), _) => session.report(err),
            (None, Some(setup)) => setup.errors.report(err),
            (None, None) => error!("{err}"),
        }
    }
}
