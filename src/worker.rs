//! # Offloaded VM
//!
//! A VM running its own loop on a dedicated thread. The host talks to it
//! over two typed channels:
//!
//! - **commands** (host → worker): start/stop, reset, ROM load, keys
//! - **messages** (worker → host): readiness, frame-ready, faults
//!
//! Every reset or load the host issues carries a new generation number;
//! the worker stamps each frame with the generation it was drawn under and
//! the host drops anything older than its last reset/load. A frame from
//! before a reset is never presented.
//!
//! Frames arrive in production order and none are dropped by the channel.
//! The host drains all of them each tick and presents only the newest.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::backend::Backend;
use crate::error::{HostError, VmError};
use crate::vm::{VideoHandle, VmBinding};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Start,
    Stop,
    Reset { generation: u64 },
    Load { bytes: Vec<u8>, generation: u64 },
    SetKey { key: u8, pressed: bool },
    Shutdown,
}

/// A copy of the video buffer as it stood after one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub generation: u64,
    pub seq: u64,
    pub cells: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Ready {
        capacity: usize,
        width: usize,
        height: usize,
    },
    FrameReady(Frame),
    Fault { generation: u64, error: VmError },
}

struct WorkerLoop<V> {
    vm: V,
    period: Duration,
    commands: Receiver<WorkerCommand>,
    messages: Sender<WorkerMessage>,
    running: bool,
    generation: u64,
    video: VideoHandle,
    last_sent: Vec<u32>,
    seq: u64,
}

impl<V: VmBinding> WorkerLoop<V> {
    fn run(mut self) {
        loop {
            if self.process_commands() {
                return;
            }
            if self.running {
                self.cycle();
                spin_sleep::sleep(self.period);
            }
        }
    }

    /// Returns true once the worker should exit. Blocks while stopped.
    fn process_commands(&mut self) -> bool {
        loop {
            let cmd = if self.running {
                match self.commands.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => return false,
                    Err(TryRecvError::Disconnected) => return true,
                }
            } else {
                match self.commands.recv() {
                    Ok(cmd) => cmd,
                    Err(_) => return true,
                }
            };

            match cmd {
                WorkerCommand::Start => self.running = true,
                WorkerCommand::Stop => self.running = false,
                WorkerCommand::Reset { generation } => {
                    self.vm.reset_state();
                    self.rebind(generation);
                }
                WorkerCommand::Load { bytes, generation } => match self.vm.install_rom(&bytes) {
                    Ok(_) => self.rebind(generation),
                    Err(error) => {
                        self.running = false;
                        self.send(WorkerMessage::Fault { generation, error });
                    }
                },
                WorkerCommand::SetKey { key, pressed } => self.vm.set_key(key, pressed),
                WorkerCommand::Shutdown => return true,
            }
        }
    }

    fn rebind(&mut self, generation: u64) {
        self.generation = generation;
        self.video = self.vm.video_pointer();
        // force the first frame of the new generation out
        self.last_sent.clear();
    }

    fn cycle(&mut self) {
        if let Err(error) = self.vm.cycle() {
            self.running = false;
            let generation = self.generation;
            self.send(WorkerMessage::Fault { generation, error });
            return;
        }
        let changed = self
            .vm
            .video(self.video)
            .map(|cells| (cells != self.last_sent.as_slice()).then(|| cells.to_vec()));
        let frame = match changed {
            Ok(Some(cells)) => cells,
            Ok(None) => return,
            Err(error) => {
                self.running = false;
                let generation = self.generation;
                self.send(WorkerMessage::Fault { generation, error });
                return;
            }
        };
        self.seq += 1;
        self.last_sent.clone_from(&frame);
        let generation = self.generation;
        let seq = self.seq;
        self.send(WorkerMessage::FrameReady(Frame {
            generation,
            seq,
            cells: frame,
        }));
    }

    fn send(&mut self, msg: WorkerMessage) {
        if self.messages.send(msg).is_err() {
            // host side is gone; stop producing
            self.running = false;
        }
    }
}

/// Worker spawned but not yet known to be ready.
pub struct PendingWorker {
    commands: Sender<WorkerCommand>,
    messages: Receiver<WorkerMessage>,
    thread: JoinHandle<()>,
}

impl PendingWorker {
    /// block until the worker reports ready
    pub fn wait_ready(self) -> Result<WorkerVm, VmError> {
        match self.messages.recv() {
            Ok(WorkerMessage::Ready {
                capacity,
                width,
                height,
            }) => {
                info!("VM worker ready: {width}x{height} display, {capacity} byte ROM capacity");
                Ok(WorkerVm {
                    commands: self.commands,
                    messages: self.messages,
                    thread: Some(self.thread),
                    capacity,
                    size: (width, height),
                    generation: 0,
                    staged: None,
                    latest: None,
                })
            }
            Ok(other) => {
                warn!("VM worker spoke before ready: {:?}", other);
                Err(VmError::WorkerGone)
            }
            Err(_) => Err(VmError::WorkerGone),
        }
    }
}

/// Host-side handle to a VM on its own thread.
pub struct WorkerVm {
    commands: Sender<WorkerCommand>,
    messages: Receiver<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
    capacity: usize,
    size: (usize, usize),
    generation: u64,
    staged: Option<Vec<u8>>,
    latest: Option<Frame>,
}

impl WorkerVm {
    /// Build the VM on a new thread with `make` and run it every `period`
    /// once started.
    pub fn spawn<V, F>(make: F, period: Duration) -> PendingWorker
    where
        V: VmBinding + 'static,
        F: FnOnce() -> V + Send + 'static,
    {
        let (commands, command_rx) = channel();
        let (message_tx, messages) = channel();
        let thread = thread::spawn(move || {
            let vm = make();
            let (width, height) = vm.video_size();
            let ready = WorkerMessage::Ready {
                capacity: vm.rom_capacity(),
                width,
                height,
            };
            if message_tx.send(ready).is_err() {
                return;
            }
            let video = vm.video_pointer();
            WorkerLoop {
                vm,
                period,
                commands: command_rx,
                messages: message_tx,
                running: false,
                generation: 0,
                video,
                last_sent: Vec::new(),
                seq: 0,
            }
            .run();
            debug!("VM worker exited");
        });
        PendingWorker {
            commands,
            messages,
            thread,
        }
    }

    /// generation of the last reset/load issued
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn command(&self, cmd: WorkerCommand) -> Result<(), HostError> {
        self.commands
            .send(cmd)
            .map_err(|_| HostError::Vm(VmError::WorkerGone))
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        // anything already held belongs to the old generation
        self.latest = None;
        self.generation
    }
}

impl Drop for WorkerVm {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Backend for WorkerVm {
    fn video_size(&self) -> (usize, usize) {
        self.size
    }

    fn stage_rom(&mut self, bytes: &[u8]) -> Result<(), HostError> {
        if bytes.len() > self.capacity {
            return Err(HostError::Allocation {
                requested: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.staged = Some(bytes.to_vec());
        Ok(())
    }

    fn install_rom(&mut self) -> Result<(), HostError> {
        let bytes = self
            .staged
            .take()
            .ok_or(HostError::Vm(VmError::NoRomStaged))?;
        let generation = self.next_generation();
        self.command(WorkerCommand::Load { bytes, generation })
    }

    fn reset(&mut self) -> Result<(), HostError> {
        let generation = self.next_generation();
        self.command(WorkerCommand::Reset { generation })
    }

    fn set_key(&mut self, key: u8, pressed: bool) -> Result<(), HostError> {
        self.command(WorkerCommand::SetKey { key, pressed })
    }

    fn resume(&mut self) -> Result<(), HostError> {
        self.command(WorkerCommand::Start)
    }

    fn pause(&mut self) -> Result<(), HostError> {
        self.command(WorkerCommand::Stop)
    }

    fn tick(&mut self) -> Result<Option<&[u32]>, VmError> {
        let mut fresh = false;
        loop {
            match self.messages.try_recv() {
                Ok(WorkerMessage::FrameReady(frame)) => {
                    if frame.generation < self.generation {
                        trace!(
                            "dropping frame {} of generation {} (now {})",
                            frame.seq,
                            frame.generation,
                            self.generation
                        );
                        continue;
                    }
                    self.latest = Some(frame);
                    fresh = true;
                }
                Ok(WorkerMessage::Fault { generation, error }) => {
                    if generation == self.generation {
                        return Err(error);
                    }
                    debug!("ignoring fault from generation {generation}: {error}");
                }
                Ok(WorkerMessage::Ready { .. }) => warn!("VM worker reported ready twice"),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(VmError::WorkerGone),
            }
        }
        Ok(match (&self.latest, fresh) {
            (Some(frame), true) => Some(frame.cells.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Chip8Machine;
    use std::time::Instant;

    const PERIOD: Duration = Duration::from_millis(1);

    fn ready_worker() -> WorkerVm {
        WorkerVm::spawn(|| Chip8Machine::new(4), PERIOD)
            .wait_ready()
            .expect("worker comes up")
    }

    /// tick until a frame shows up or give up after a second
    fn next_frame(worker: &mut WorkerVm) -> Result<Option<Vec<u32>>, VmError> {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if let Some(cells) = worker.tick()? {
                return Ok(Some(cells.to_vec()));
            }
            thread::sleep(PERIOD);
        }
        Ok(None)
    }

    #[test]
    fn test_ready_reports_geometry() {
        let worker = ready_worker();
        assert_eq!(worker.video_size(), (64, 32));
        assert_eq!(worker.capacity, 3584);
    }

    #[test]
    fn test_oversized_rom_rejected_host_side() {
        let mut worker = ready_worker();
        assert!(matches!(
            worker.stage_rom(&vec![0; 4000]),
            Err(HostError::Allocation { .. })
        ));
        assert_eq!(worker.generation(), 0);
    }

    #[test]
    fn test_frames_flow_after_start() -> Result<(), HostError> {
        let mut worker = ready_worker();
        // draw glyph 0 then spin
        worker.stage_rom(&[0xa0, 0x50, 0xd0, 0x05, 0x12, 0x04])?;
        worker.install_rom()?;
        worker.resume()?;
        let cells = next_frame(&mut worker)?.expect("a frame");
        assert_eq!(cells[0] & 0xff, 0xff);
        worker.pause()?;
        Ok(())
    }

    #[test]
    fn test_frames_from_before_reset_are_dropped() -> Result<(), HostError> {
        let mut worker = ready_worker();
        worker.stage_rom(&[0xa0, 0x50, 0xd0, 0x05, 0x12, 0x04])?;
        worker.install_rom()?;
        worker.resume()?;
        next_frame(&mut worker)?.expect("a frame");

        // paused, so whatever is still in flight is from the old generation
        worker.pause()?;
        worker.reset()?;
        assert!(worker.latest.is_none());
        for _ in 0..5 {
            assert_eq!(worker.tick()?, None);
        }
        Ok(())
    }

    /// tick until the worker reports a fault or give up after a second
    fn next_fault(worker: &mut WorkerVm) -> Option<VmError> {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if let Err(err) = worker.tick() {
                return Some(err);
            }
            thread::sleep(PERIOD);
        }
        None
    }

    #[test]
    fn test_fault_surfaces_on_tick() -> Result<(), HostError> {
        let mut worker = ready_worker();
        worker.stage_rom(&[0x1f, 0xff])?;
        worker.install_rom()?;
        worker.resume()?;
        assert_eq!(next_fault(&mut worker), Some(VmError::ProgramCounter { pc: 0x0fff }));
        Ok(())
    }

    #[test]
    fn test_reset_and_resume_runs_again_after_fault() -> Result<(), HostError> {
        let mut worker = ready_worker();
        worker.stage_rom(&[0x1f, 0xff])?;
        worker.install_rom()?;
        worker.resume()?;
        assert!(next_fault(&mut worker).is_some());

        worker.pause()?;
        worker.reset()?;
        worker.resume()?;
        assert_eq!(worker.generation(), 2);
        // only a worker that is running again can fault again
        assert_eq!(next_fault(&mut worker), Some(VmError::ProgramCounter { pc: 0x0fff }));
        Ok(())
    }
}
