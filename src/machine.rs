/// # machine
///
/// Reference `VmBinding` used by the binary and the tests. It owns a 4K
/// memory map, a staged ROM slot, the keypad and a 64x32 video buffer of
/// 32-bit cells whose low byte is the luminance.
///
/// Only the instructions that touch the display are executed:
///  00E0  clear screen
///  1NNN  jump
///  6XKK  VX = KK
///  7XKK  VX += KK
///  ANNN  I = NNN
///  DXYN  XOR an 8xN sprite from I at (VX, VY), VF = collision
/// everything else is a no-op. Lit cells are written as 0xffffffff, so
/// anything reading them must mask off the low byte.
use log::trace;

use crate::error::VmError;
use crate::memory::{Chip8MemoryMap, MemoryMap, CHIP8_PROGRAM_ADDR, CHIP8_PROGRAM_CAPACITY};
use crate::vm::{RomHandle, VideoHandle, VmBinding, KEYPAD_SIZE, VIDEO_HEIGHT, VIDEO_WIDTH};

const VIDEO_CELLS: usize = VIDEO_WIDTH * VIDEO_HEIGHT;
const LIT: u32 = 0xffff_ffff;

struct StagedRom {
    handle: RomHandle,
    bytes: Vec<u8>,
    copied: bool,
}

pub struct Chip8Machine {
    memory: Chip8MemoryMap,
    staged: Option<StagedRom>,
    rom_generation: u64,
    video: Box<[u32]>,
    video_generation: u64,
    keypad: [bool; KEYPAD_SIZE],
    registers: [u8; 16],
    program_counter: u16,
    i: u16,
    quantum: u32,
}

impl Chip8Machine {
    /// `quantum` is how many instructions one `cycle()` executes
    pub fn new(quantum: u32) -> Self {
        Chip8Machine {
            memory: Chip8MemoryMap::new(),
            staged: None,
            rom_generation: 0,
            video: vec![0; VIDEO_CELLS].into_boxed_slice(),
            video_generation: 0,
            keypad: [false; KEYPAD_SIZE],
            registers: [0; 16],
            program_counter: CHIP8_PROGRAM_ADDR,
            i: 0,
            quantum: quantum.max(1),
        }
    }

    pub fn program_counter(&self) -> u16 {
        self.program_counter
    }

    fn step(&mut self) -> Result<(), VmError> {
        let pc = self.program_counter;
        let opcode = self
            .memory
            .get_word(pc)
            .ok_or(VmError::ProgramCounter { pc })?;
        self.program_counter = pc.wrapping_add(2);

        let x = ((opcode & 0x0f00) >> 8) as usize;
        let y = ((opcode & 0x00f0) >> 4) as usize;
        let kk = (opcode & 0x00ff) as u8;
        let nnn = opcode & 0x0fff;

        match opcode & 0xf000 {
            0x0000 if opcode == 0x00e0 => self.video.fill(0),
            0x1000 => self.program_counter = nnn,
            0x6000 => self.registers[x] = kk,
            0x7000 => self.registers[x] = self.registers[x].wrapping_add(kk),
            0xa000 => self.i = nnn,
            0xd000 => self.draw_sprite(x, y, (opcode & 0x000f) as usize)?,
            _ => trace!("no-op {opcode:#06x} at {pc:#06x}"),
        }
        Ok(())
    }

    fn draw_sprite(&mut self, x: usize, y: usize, rows: usize) -> Result<(), VmError> {
        let start_x = self.registers[x] as usize % VIDEO_WIDTH;
        let start_y = self.registers[y] as usize % VIDEO_HEIGHT;
        let sprite = self
            .memory
            .get_ro_slice(self.i, rows)
            .ok_or(VmError::ProgramCounter { pc: self.i })?;

        let mut collision = false;
        for (row, bits) in sprite.iter().enumerate() {
            let py = (start_y + row) % VIDEO_HEIGHT;
            for col in 0..8 {
                if bits & (0x80 >> col) == 0 {
                    continue;
                }
                let px = (start_x + col) % VIDEO_WIDTH;
                let cell = &mut self.video[py * VIDEO_WIDTH + px];
                collision |= *cell & 0xff != 0;
                *cell ^= LIT;
            }
        }
        self.registers[0xf] = collision as u8;
        Ok(())
    }
}

impl Default for Chip8Machine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl VmBinding for Chip8Machine {
    fn rom_capacity(&self) -> usize {
        CHIP8_PROGRAM_CAPACITY
    }

    fn allocate_rom(&mut self, len: usize) -> Result<RomHandle, VmError> {
        if len > CHIP8_PROGRAM_CAPACITY {
            return Err(VmError::Allocation {
                requested: len,
                capacity: CHIP8_PROGRAM_CAPACITY,
            });
        }
        self.rom_generation += 1;
        let handle = RomHandle {
            len,
            generation: self.rom_generation,
        };
        self.staged = Some(StagedRom {
            handle,
            bytes: vec![0; len],
            copied: false,
        });
        Ok(handle)
    }

    fn copy_rom(&mut self, handle: RomHandle, bytes: &[u8]) -> Result<(), VmError> {
        let staged = self
            .staged
            .as_mut()
            .filter(|s| s.handle == handle)
            .ok_or(VmError::RomHandleMismatch)?;
        if bytes.len() != staged.bytes.len() {
            return Err(VmError::RomLength {
                expected: staged.bytes.len(),
                actual: bytes.len(),
            });
        }
        staged.bytes.copy_from_slice(bytes);
        staged.copied = true;
        Ok(())
    }

    fn load_rom(&mut self) -> Result<(), VmError> {
        let staged = self
            .staged
            .take()
            .filter(|s| s.copied)
            .ok_or(VmError::NoRomStaged)?;
        self.memory.load_program(&staged.bytes)?;
        self.program_counter = self.memory.program_addr;
        self.video_generation += 1;
        Ok(())
    }

    fn reset_state(&mut self) {
        self.registers = [0; 16];
        self.i = 0;
        self.program_counter = self.memory.program_addr;
        self.keypad = [false; KEYPAD_SIZE];
        self.video.fill(0);
        self.video_generation += 1;
    }

    fn set_key(&mut self, key: u8, pressed: bool) {
        if let Some(slot) = self.keypad.get_mut(key as usize) {
            *slot = pressed;
        }
    }

    fn key_pressed(&self, key: u8) -> bool {
        self.keypad.get(key as usize).copied().unwrap_or(false)
    }

    fn cycle(&mut self) -> Result<(), VmError> {
        for _ in 0..self.quantum {
            self.step()?;
        }
        Ok(())
    }

    fn video_size(&self) -> (usize, usize) {
        (VIDEO_WIDTH, VIDEO_HEIGHT)
    }

    fn video_pointer(&self) -> VideoHandle {
        VideoHandle {
            base: 0,
            len: self.video.len(),
            generation: self.video_generation,
        }
    }

    fn video(&self, handle: VideoHandle) -> Result<&[u32], VmError> {
        if handle.generation != self.video_generation {
            return Err(VmError::StaleBuffer {
                held: handle.generation,
                current: self.video_generation,
            });
        }
        self.video
            .get(handle.base..handle.base + handle.len)
            .ok_or(VmError::StaleBuffer {
                held: handle.generation,
                current: self.video_generation,
            })
    }
}
