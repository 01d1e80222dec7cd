//! Plain ROM cartridge without bank switching
//!
//! Images up to 16KB appear at 0x4000 and are mirrored at 0x8000; larger
//! images map linearly from 0x4000.

/// Unbanked cartridge
#[derive(Debug, Clone)]
pub struct Normal {
    rom: Vec<u8>,
}

impl Normal {
    pub fn new(rom: Vec<u8>) -> Self {
        Self { rom }
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn read(&self, addr: u16) -> u8 {
        if self.rom.is_empty() {
            return 0xFF;
        }
        let offset = (addr as usize).wrapping_sub(0x4000);
        if self.rom.len() <= 0x4000 {
            self.rom[(offset & 0x3FFF) % self.rom.len()]
        } else {
            self.rom.get(offset).copied().unwrap_or(0xFF)
        }
    }
}
