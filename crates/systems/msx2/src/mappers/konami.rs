//! Konami 8KB mapper without SCC
//!
//! Page 2 (0x4000-0x5FFF) is fixed to bank 0. A write anywhere in
//! 0x6000-0x7FFF, 0x8000-0x9FFF or 0xA000-0xBFFF selects the bank of that
//! page.

use super::{banked_read, MapperState, BANK_SIZE};
use emu_core::logging::{log, LogCategory, LogLevel};

const POWER_ON_BANKS: [u8; 4] = [0, 1, 2, 3];

#[derive(Debug, Clone)]
pub struct Konami {
    rom: Vec<u8>,
    banks: [u8; 4],
}

impl Konami {
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            banks: POWER_ON_BANKS,
        }
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
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
        if let 0x6000..=0xBFFF = addr {
            let page = ((addr >> 13) - 2) as usize;
            self.banks[page] = val;
            log(LogCategory::Mapper, LogLevel::Trace, || {
                format!("Konami page {} <- {:02X}", page + 2, val)
            });
        }
    }

    pub fn reset(&mut self) {
        self.banks = POWER_ON_BANKS;
    }

    pub(super) fn save(&self, state: &mut MapperState) {
        state.banks = self.banks.map(u16::from);
    }

    pub(super) fn restore(&mut self, state: &MapperState) {
        self.banks = state.banks.map(|bank| bank as u8);
        self.banks[0] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::tests::numbered_rom;

    #[test]
    fn test_power_on_banks() {
        let cart = Konami::new(numbered_rom(8));
        assert_eq!(cart.read(0x4000), 0);
        assert_eq!(cart.read(0x6000), 1);
        assert_eq!(cart.read(0x8000), 2);
        assert_eq!(cart.read(0xA000), 3);
    }

    #[test]
    fn test_page2_is_fixed() {
        let mut cart = Konami::new(numbered_rom(8));
        cart.write(0x4000, 5);
        cart.write(0x5FFF, 5);
        assert_eq!(cart.read(0x4000), 0);
    }

    #[test]
    fn test_bank_select_anywhere_in_page() {
        let mut cart = Konami::new(numbered_rom(8));
        cart.write(0x7FFF, 4);
        cart.write(0x8123, 5);
        cart.write(0xA000, 6);
        assert_eq!(cart.read(0x6000), 4);
        assert_eq!(cart.read(0x8000), 5);
        assert_eq!(cart.read(0xA000), 6);
        cart.write(0xA000, 9);
        assert_eq!(cart.read(0xA000), 1);
    }
}
