/// # backend
///
/// What a session needs from "the VM", whichever thread it runs on.
/// `LocalVm` steps a binding in place on the host thread; the worker module
/// provides the offloaded flavour.
use crate::error::{HostError, VmError};
use crate::vm::{VideoHandle, VmBinding};

pub trait Backend {
    /// (width, height) of the video buffer in cells
    fn video_size(&self) -> (usize, usize);

    /// Get a whole ROM into the VM without disturbing what's running. An
    /// oversized ROM fails here, before anything has changed.
    fn stage_rom(&mut self, bytes: &[u8]) -> Result<(), HostError>;

    /// reset and make the staged ROM the running program
    fn install_rom(&mut self) -> Result<(), HostError>;

    fn reset(&mut self) -> Result<(), HostError>;

    fn set_key(&mut self, key: u8, pressed: bool) -> Result<(), HostError>;

    /// let a VM with its own timing run; no-op for host-stepped VMs
    fn resume(&mut self) -> Result<(), HostError>;

    /// halt a VM with its own timing; no-op for host-stepped VMs
    fn pause(&mut self) -> Result<(), HostError>;

    /// Host tick. Returns the cells to present, or None when nothing new
    /// has been drawn since the last tick.
    fn tick(&mut self) -> Result<Option<&[u32]>, VmError>;
}

/// Single-thread topology: every tick runs one `cycle()` synchronously and
/// the buffer is read straight after it.
pub struct LocalVm<V> {
    vm: V,
    video: VideoHandle,
}

impl<V: VmBinding> LocalVm<V> {
    pub fn new(vm: V) -> Self {
        let video = vm.video_pointer();
        LocalVm { vm, video }
    }

    pub fn vm(&self) -> &V {
        &self.vm
    }

    // after any reset/load the old handle is stale
    fn refresh_video(&mut self) {
        self.video = self.vm.video_pointer();
    }
}

impl<V: VmBinding> Backend for LocalVm<V> {
    fn video_size(&self) -> (usize, usize) {
        self.vm.video_size()
    }

    fn stage_rom(&mut self, bytes: &[u8]) -> Result<(), HostError> {
        let handle = self.vm.allocate_rom(bytes.len())?;
        self.vm.copy_rom(handle, bytes)?;
        Ok(())
    }

    fn install_rom(&mut self) -> Result<(), HostError> {
        self.vm.reset_state();
        let loaded = self.vm.load_rom();
        self.refresh_video();
        Ok(loaded?)
    }

    fn reset(&mut self) -> Result<(), HostError> {
        self.vm.reset_state();
        self.refresh_video();
        Ok(())
    }

    fn set_key(&mut self, key: u8, pressed: bool) -> Result<(), HostError> {
        self.vm.set_key(key, pressed);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), HostError> {
        Ok(())
    }

    fn pause(&mut self) -> Result<(), HostError> {
        Ok(())
    }

    fn tick(&mut self) -> Result<Option<&[u32]>, VmError> {
        self.vm.cycle()?;
        self.vm.video(self.video).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Chip8Machine;

    #[test]
    fn test_oversized_rom_fails_at_stage() {
        let mut local = LocalVm::new(Chip8Machine::default());
        let err = local.stage_rom(&vec![0; 5000]).unwrap_err();
        assert!(matches!(err, HostError::Allocation { requested: 5000, .. }));
    }

    #[test]
    fn test_install_without_stage_fails() {
        let mut local = LocalVm::new(Chip8Machine::default());
        assert!(matches!(local.install_rom(), Err(HostError::Vm(VmError::NoRomStaged))));
    }

    #[test]
    fn test_tick_reads_fresh_handle_after_reset() -> Result<(), HostError> {
        let mut local = LocalVm::new(Chip8Machine::default());
        local.stage_rom(&[0x12, 0x00])?;
        local.install_rom()?;
        assert!(local.tick()?.is_some());
        local.reset()?;
        let cells = local.tick()?.expect("local VM presents every tick");
        assert_eq!(cells.len(), 64 * 32);
        Ok(())
    }

    #[test]
    fn test_set_key_reaches_vm() -> Result<(), HostError> {
        let mut local = LocalVm::new(Chip8Machine::default());
        local.set_key(0xa, true)?;
        assert!(local.vm().key_pressed(0xa));
        local.set_key(0xa, false)?;
        assert!(!local.vm().key_pressed(0xa));
        Ok(())
    }
}
