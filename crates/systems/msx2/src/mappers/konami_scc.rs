//! Konami 8KB mapper with SCC sound chip
//!
//! # Register Map
//!
//! - 0x5000-0x57FF: bank at 0x4000-0x5FFF
//! - 0x7000-0x77FF: bank at 0x6000-0x7FFF
//! - 0x9000-0x97FF: bank at 0x8000-0x9FFF
//! - 0xB000-0xB7FF: bank at 0xA000-0xBFFF
//! - 0x9800-0x9FFF: SCC register file (256 bytes, mirrored)

use super::{banked_read, MapperState, BANK_SIZE, SCC_REGISTERS};
use emu_core::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Clone)]
pub struct KonamiScc {
    rom: Vec<u8>,
    banks: [u8; 4],
    scc: Vec<u8>,
}

impl KonamiScc {
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            banks: [0; 4],
            scc: vec![0; SCC_REGISTERS],
        }
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn scc_registers(&self) -> &[u8] {
        &self.scc
    }

    pub fn read(&self, addr: u16) -> u8 {
        let page = ((addr >> 13) as usize).wrapping_sub(2) & 3;
        banked_read(
            &self.rom,
            self.banks[page] as usize,
            BANK_SIZE,
            addr as usize & (BANK_SIZE - 1),
        )
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x5000..=0x57FF | 0x7000..=0x77FF | 0x9000..=0x97FF | 0xB000..=0xB7FF => {
                let page = ((addr >> 13) - 2) as usize;
                self.banks[page] = val;
                log(LogCategory::Mapper, LogLevel::Trace, || {
                    format!("Konami SCC page {} <- {:02X}", page + 2, val)
                });
            }
            0x9800..=0x9FFF => {
                self.scc[addr as usize & (SCC_REGISTERS - 1)] = val;
            }
            _ => {}
        }
    }

    /// Banks return to 0 and the SCC is silenced
    pub fn reset(&mut self) {
        self.banks = [0; 4];
        self.scc.fill(0);
    }

    pub(super) fn save(&self, state: &mut MapperState) {
        state.banks = self.banks.map(u16::from);
        state.scc = Some(self.scc.clone());
    }

    pub(super) fn restore(&mut self, state: &MapperState) {
        self.banks = state.banks.map(|bank| bank as u8);
        if let Some(scc) = &state.scc {
            self.scc = scc.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::tests::numbered_rom;

    #[test]
    fn test_bank_registers() {
        let mut cart = KonamiScc::new(numbered_rom(16));
        assert_eq!(cart.read(0x6000), 0);
        cart.write(0x5000, 1);
        cart.write(0x7000, 2);
        cart.write(0x9000, 3);
        cart.write(0xB000, 4);
        assert_eq!(cart.read(0x4000), 1);
        assert_eq!(cart.read(0x6000), 2);
        assert_eq!(cart.read(0x8000), 3);
        assert_eq!(cart.read(0xA000), 4);
        // Outside the register windows nothing changes
        cart.write(0x5800, 7);
        assert_eq!(cart.read(0x4000), 1);
    }

    #[test]
    fn test_scc_register_file() {
        let mut cart = KonamiScc::new(numbered_rom(16));
        cart.write(0x9880, 0x12);
        cart.write(0x9F8F, 0x34);
        assert_eq!(cart.scc_registers()[0x80], 0x12);
        assert_eq!(cart.scc_registers()[0x8F], 0x34);
        // SCC writes are not bank selects
        assert_eq!(cart.read(0x8000), 0);
        cart.reset();
        assert_eq!(cart.scc_registers()[0x80], 0);
    }
}
