/// # vm
///
/// The capability set the host drives. A VM owns its memory; the host only
/// ever holds handles into it, and every handle carries the generation it
/// was issued under so a handle outliving a reset/load is rejected instead
/// of read.
use crate::error::VmError;

/// number of keypad slots, ids 0x0-0xf
pub const KEYPAD_SIZE: usize = 16;

/// logical display size of a standard CHIP-8
pub const VIDEO_WIDTH: usize = 64;
pub const VIDEO_HEIGHT: usize = 32;

/// Reservation for a ROM image inside the VM, valid until the next
/// allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomHandle {
    pub len: usize,
    pub generation: u64,
}

/// Read window onto the video buffer: base + length + generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoHandle {
    pub base: usize,
    pub len: usize,
    pub generation: u64,
}

/// A stepping virtual machine. None of these calls are reentrant; a caller
/// on another thread needs its own synchronisation.
pub trait VmBinding {
    /// most ROM bytes `allocate_rom` will accept
    fn rom_capacity(&self) -> usize;

    /// reserve `len` bytes for a ROM; fails without touching VM state if
    /// `len` exceeds `rom_capacity`
    fn allocate_rom(&mut self, len: usize) -> Result<RomHandle, VmError>;

    /// copy the whole ROM into the reservation; a copy that doesn't fill
    /// the reservation exactly is rejected
    fn copy_rom(&mut self, handle: RomHandle, bytes: &[u8]) -> Result<(), VmError>;

    /// install the copied ROM as the active program and rewind to the
    /// entry point
    fn load_rom(&mut self) -> Result<(), VmError>;

    /// clear registers, stack, timers, keypad and video
    fn reset_state(&mut self);

    /// out-of-range ids are ignored
    fn set_key(&mut self, key: u8, pressed: bool);

    fn key_pressed(&self, key: u8) -> bool;

    /// run one scheduling quantum
    fn cycle(&mut self) -> Result<(), VmError>;

    /// (width, height) of the video buffer in cells
    fn video_size(&self) -> (usize, usize);

    /// handle to the video buffer; re-fetch after every reset or load
    fn video_pointer(&self) -> VideoHandle;

    /// cells behind `handle`, rejected if the handle is from an older
    /// generation
    fn video(&self, handle: VideoHandle) -> Result<&[u32], VmError>;

    /// allocate, copy, reset and load in the order the binding requires;
    /// nothing is changed if the allocation fails
    fn install_rom(&mut self, bytes: &[u8]) -> Result<VideoHandle, VmError> {
        let handle = self.allocate_rom(bytes.len())?;
        self.copy_rom(handle, bytes)?;
        self.reset_state();
        self.load_rom()?;
        Ok(self.video_pointer())
    }
}
