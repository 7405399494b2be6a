use crate::error::VmError;

// NB. addresses are u16 as per the chip-8; lengths are usize to stop endless casting

/// Represents the memory map the reference machine runs from
pub trait MemoryMap {
    /// write a chunk of bytes into "RAM"
    fn write(&mut self, data: &[u8], addr: u16) -> Result<(), VmError> {
        let bytes = self
            .get_rw_slice(addr, data.len())
            .ok_or(VmError::ProgramCounter { pc: addr })?;
        bytes.copy_from_slice(data);
        Ok(())
    }

    /// get a two-byte big-endian word (opcodes)
    fn get_word(&self, addr: u16) -> Option<u16> {
        let word = self.get_ro_slice(addr, 2)?;
        Some(((word[0] as u16) << 8) | (word[1] as u16))
    }

    /// get a r/w slice of the underlying memory, None if it runs off the end
    fn get_rw_slice(&mut self, addr: u16, len: usize) -> Option<&mut [u8]>;

    /// get a r/o slice of the underlying memory, None if it runs off the end
    fn get_ro_slice(&self, addr: u16, len: usize) -> Option<&[u8]>;
}

/// 4K CHIP-8 memory map as laid out by contemporary interpreters:
///   0x0000-0x01ff  interpreter (font at 0x050)
///   0x0200-0x0fff  program
///
/// the display lives outside this map, in the machine's video buffer
pub struct Chip8MemoryMap {
    bytes: Box<[u8]>,
    pub program_addr: u16,
}

impl MemoryMap for Chip8MemoryMap {
    fn get_rw_slice(&mut self, addr: u16, len: usize) -> Option<&mut [u8]> {
        let a = addr as usize;
        self.bytes.get_mut(a..a.checked_add(len)?)
    }
    fn get_ro_slice(&self, addr: u16, len: usize) -> Option<&[u8]> {
        let a = addr as usize;
        self.bytes.get(a..a.checked_add(len)?)
    }
}

/// how much RAM we have
pub const CHIP8_RAM_SIZE_BYTES: usize = 4096;

/// where the program is loaded
pub const CHIP8_PROGRAM_ADDR: u16 = 0x0200;

/// most program bytes that fit between the program address and top of RAM
pub const CHIP8_PROGRAM_CAPACITY: usize = CHIP8_RAM_SIZE_BYTES - CHIP8_PROGRAM_ADDR as usize;

const CHIP8_CONTEMPORARY_FONT_ADDR: u16 = 0x050;

impl Chip8MemoryMap {
    /// initialises CHIP-8 with contemporary memory contents
    pub fn new() -> Self {
        let mut bytes = vec![0u8; CHIP8_RAM_SIZE_BYTES].into_boxed_slice();
        let font = CHIP8_CONTEMPORARY_FONT_ADDR as usize;
        bytes[font..font + CHIP8_CONTEMPORARY_FONT.len()].copy_from_slice(&CHIP8_CONTEMPORARY_FONT);
        Chip8MemoryMap {
            bytes,
            program_addr: CHIP8_PROGRAM_ADDR,
        }
    }

    /// replace the program area: `program` at 0x200, the rest zeroed so
    /// nothing from a previous ROM survives
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), VmError> {
        if program.len() > CHIP8_PROGRAM_CAPACITY {
            return Err(VmError::Allocation {
                requested: program.len(),
                capacity: CHIP8_PROGRAM_CAPACITY,
            });
        }
        let start = self.program_addr as usize;
        self.bytes[start..].fill(0);
        self.write(program, self.program_addr)
    }
}

impl Default for Chip8MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

const CHIP8_CONTEMPORARY_FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_zeroed() {
        let m = Chip8MemoryMap::new();
        // NB. memory is zeroed from 0x200 because before that we bake in the
        //     font
        assert_eq!(m.bytes[0x200..], [0; 0xe00]);
    }

    #[test]
    fn test_font_baked_in() {
        let m = Chip8MemoryMap::new();
        assert_eq!(m.get_ro_slice(0x050, 5), Some(&[0xF0, 0x90, 0x90, 0x90, 0xF0][..]));
    }

    #[test]
    fn test_write_slice_ok() -> Result<(), VmError> {
        let mut dst = Chip8MemoryMap::new();
        dst.write(&[0, 1, 2, 3, 4, 5, 6, 7], 0x300)?;
        assert_eq!(
            dst.get_ro_slice(0x2f8, 16),
            Some(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7][..])
        );
        Ok(())
    }

    #[test]
    fn test_read_word() {
        let mut m = Chip8MemoryMap::new();
        m.write(&[0, 1, 2, 3, 4, 5, 6, 7], 0x200).unwrap();
        assert_eq!(m.get_word(0x204), Some(0x0405));
    }

    #[test]
    fn test_read_word_off_the_end() {
        let m = Chip8MemoryMap::new();
        assert_eq!(m.get_word(0x0fff), None);
        assert_eq!(m.get_word(0x0ffe), Some(0));
    }

    #[test]
    fn test_write_too_much_errors() {
        let mut dst = Chip8MemoryMap::new();
        assert!(dst.write(&[0; 8], 4089).is_err());
    }

    #[test]
    fn test_program_load_ok() -> Result<(), VmError> {
        let mut dst = Chip8MemoryMap::new();
        dst.load_program(&[0x00, 0xe0])?; // clear screen
        assert_eq!(dst.get_ro_slice(0x200, 2), Some(&[0x00, 0xe0][..]));
        Ok(())
    }

    #[test]
    fn test_program_load_clears_previous_program() -> Result<(), VmError> {
        let mut dst = Chip8MemoryMap::new();
        dst.load_program(&[0x12, 0x00, 0x12, 0x00])?;
        dst.load_program(&[0x00, 0xe0])?;
        assert_eq!(dst.get_ro_slice(0x200, 4), Some(&[0x00, 0xe0, 0, 0][..]));
        Ok(())
    }

    #[test]
    fn test_program_too_big() {
        let mut dst = Chip8MemoryMap::new();
        let prog = vec![0u8; CHIP8_PROGRAM_CAPACITY + 1];
        assert_eq!(
            dst.load_program(&prog),
            Err(VmError::Allocation {
                requested: 3585,
                capacity: 3584
            })
        );
    }

    #[test]
    fn test_mem_layout() {
        let m = Chip8MemoryMap::new();
        assert_eq!(m.program_addr, 0x0200);
        assert_eq!(m.get_ro_slice(0x0050, 1), Some(&[0xF0][..]));
        assert_eq!(CHIP8_PROGRAM_CAPACITY, 3584);
    }
}
