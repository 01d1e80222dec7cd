//! ASCII 16KB mapper, optionally with battery SRAM
//!
//! # Register Map
//!
//! - 0x6000-0x67FF: 16KB bank at 0x4000-0x7FFF
//! - 0x7000-0x77FF: 16KB bank at 0x8000-0xBFFF; with SRAM, bit 4 maps the
//!   8KB SRAM there instead (mirrored across the 16KB window)

use super::{banked_read, MapperState, SRAM_SIZE};
use emu_core::logging::{log, LogCategory, LogLevel};

const BANK16: usize = 0x4000;

#[derive(Debug, Clone)]
pub struct Ascii16 {
    rom: Vec<u8>,
    /// 16KB bank numbers for 0x4000 and 0x8000
    banks: [u8; 2],
    sram: Option<Vec<u8>>,
    sram_selected: bool,
}

impl Ascii16 {
    pub fn new(rom: Vec<u8>, with_sram: bool) -> Self {
        Self {
            rom,
            banks: [0; 2],
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

    pub fn read(&self, addr: u16) -> u8 {
        let half = if addr < 0x8000 { 0 } else { 1 };
        if half == 1 && self.sram_selected {
            if let Some(sram) = &self.sram {
                return sram[addr as usize & (SRAM_SIZE - 1)];
            }
        }
        banked_read(
            &self.rom,
            self.banks[half] as usize,
            BANK16,
            addr as usize & (BANK16 - 1),
        )
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x6000..=0x67FF => {
                self.banks[0] = val;
                log(LogCategory::Mapper, LogLevel::Trace, || {
                    format!("ASCII16 0x4000 <- {:02X}", val)
                });
            }
            0x7000..=0x77FF => {
                if self.sram.is_some() && val & 0x10 != 0 {
                    self.sram_selected = true;
                } else {
                    self.sram_selected = false;
                    self.banks[1] = val;
                }
                log(LogCategory::Mapper, LogLevel::Trace, || {
                    format!("ASCII16 0x8000 <- {:02X}", val)
                });
            }
            0x8000..=0xBFFF if self.sram_selected => {
                if let Some(sram) = &mut self.sram {
                    sram[addr as usize & (SRAM_SIZE - 1)] = val;
                }
            }
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        self.banks = [0; 2];
        self.sram_selected = false;
    }

    /// Saved as 8KB bank numbers, the unit every mapper shares
    pub(super) fn save(&self, state: &mut MapperState) {
        let [low, high] = self.banks.map(|bank| u16::from(bank) * 2);
        state.banks = [low, low + 1, high, high + 1];
        state.sram_selected = self.sram_selected;
        state.sram = self.sram.clone();
    }

    pub(super) fn restore(&mut self, state: &MapperState) {
        self.banks = [(state.banks[0] / 2) as u8, (state.banks[2] / 2) as u8];
        self.sram_selected = state.sram_selected && self.sram.is_some();
        if self.sram.is_some() {
            self.sram = state.sram.clone();
        }
    }
}
