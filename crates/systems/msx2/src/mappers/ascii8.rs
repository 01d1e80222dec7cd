//! ASCII 8KB mapper, optionally with 8KB battery SRAM
//!
//! # Register Map
//!
//! - 0x6000-0x67FF: bank at 0x4000-0x5FFF
//! - 0x6800-0x6FFF: bank at 0x6000-0x7FFF
//! - 0x7000-0x77FF: bank at 0x8000-0x9FFF (SRAM when bits 4-7 are set)
//! - 0x7800-0x7FFF: bank at 0xA000-0xBFFF

use super::{banked_read, MapperState, BANK_SIZE, SRAM_SIZE};
use emu_core::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Clone)]
pub struct Ascii8 {
    rom: Vec<u8>,
    banks: [u8; 4],
    sram: Option<Vec<u8>>,
    sram_selected: bool,
}

impl Ascii8 {
    pub fn new(rom: Vec<u8>, with_sram: bool) -> Self {
        Self {
            rom,
            banks: [0; 4],
            sram: with_sram.then(|| vec![0; SRAM_SIZE]),
            sram_selected: false,
        }
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn has_sram(&self) -> bool {
        self.sram.is_some()
    }

    fn sram_window(&self, addr: u16) -> bool {
        self.sram_selected && (0x8000..=0x9FFF).contains(&addr)
    }

    pub fn read(&self, addr: u16) -> u8 {
        if self.sram_window(addr) {
            if let Some(sram) = &self.sram {
                return sram[addr as usize & (SRAM_SIZE - 1)];
            }
        }
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
            0x6000..=0x7FFF => {
                let page = ((addr - 0x6000) >> 11) as usize;
                if page == 2 && self.sram.is_some() && val & 0xF0 != 0 {
                    self.sram_selected = true;
                } else {
                    if page == 2 {
                        self.sram_selected = false;
                    }
                    self.banks[page] = val;
                }
                log(LogCategory::Mapper, LogLevel::Trace, || {
                    format!("ASCII8 page {} <- {:02X}", page + 2, val)
                });
            }
            0x8000..=0x9FFF if self.sram_selected => {
                if let Some(sram) = &mut self.sram {
                    sram[addr as usize & (SRAM_SIZE - 1)] = val;
                }
            }
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        self.banks = [0; 4];
        self.sram_selected = false;
    }

    pub(super) fn save(&self, state: &mut MapperState) {
        state.banks = self.banks.map(u16::from);
        state.sram_selected = self.sram_selected;
        state.sram = self.sram.clone();
    }

    pub(super) fn restore(&mut self, state: &MapperState) {
        self.banks = state.banks.map(|bank| bank as u8);
        self.sram_selected = state.sram_selected && self.sram.is_some();
        if self.sram.is_some() {
            self.sram = state.sram.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappers::tests::numbered_rom;

    #[test]
    fn test_bank_registers() {
        let mut cart = Ascii8::new(numbered_rom(8), false);
        assert_eq!(cart.read(0x4000), 0);
        cart.write(0x6000, 3);
        cart.write(0x6800, 4);
        cart.write(0x7000, 5);
        cart.write(0x7800, 6);
        assert_eq!(cart.read(0x4000), 3);
        assert_eq!(cart.read(0x6000), 4);
        assert_eq!(cart.read(0x8000), 5);
        assert_eq!(cart.read(0xBFFF), 6);
    }

    #[test]
    fn test_bank_wraps_modulo_size() {
        let mut cart = Ascii8::new(numbered_rom(8), false);
        cart.write(0x6000, 11);
        assert_eq!(cart.read(0x4000), 3);
    }

    #[test]
    fn test_sram_select_on_page4_register() {
        let mut cart = Ascii8::new(numbered_rom(8), true);
        cart.write(0x7000, 0x20);
        cart.write(0x8123, 0xAB);
        assert_eq!(cart.read(0x8123), 0xAB);
        // Writes outside the SRAM window never hit SRAM
        cart.write(0xA000, 0xCD);
        assert_eq!(cart.read(0xA000), 0);

        // Selecting a ROM bank again hides SRAM
        cart.write(0x7000, 0x02);
        assert_eq!(cart.read(0x8123), 2);
        cart.write(0x7000, 0x10);
        assert_eq!(cart.read(0x8123), 0xAB);
    }

    #[test]
    fn test_high_bank_without_sram_is_rom() {
        let mut cart = Ascii8::new(numbered_rom(64), false);
        cart.write(0x7000, 0x21);
        assert_eq!(cart.read(0x8000), 0x21);
    }

    #[test]
    fn test_reset_keeps_sram() {
        let mut cart = Ascii8::new(numbered_rom(8), true);
        cart.write(0x7000, 0x10);
        cart.write(0x8000, 0x55);
        cart.write(0x6000, 2);
        cart.reset();
        assert_eq!(cart.read(0x4000), 0);
        assert_eq!(cart.read(0x8000), 0);
        cart.write(0x7000, 0x10);
        assert_eq!(cart.read(0x8000), 0x55);
    }
}
