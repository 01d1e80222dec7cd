//! MSX cartridge mappers
//!
//! A cartridge sits in slot 1-0 and owns pages 2-5 (0x4000-0xBFFF). Writes
//! inside the window are bank-select commands for the mapper; reads go to the
//! selected 8KB bank. Bank numbers wrap modulo the number of banks in the ROM.

mod ascii16;
mod ascii8;
mod konami;
mod konami_scc;
mod normal;

pub use ascii16::Ascii16;
pub use ascii8::Ascii8;
pub use konami::Konami;
pub use konami_scc::KonamiScc;
pub use normal::Normal;

use serde::{Deserialize, Serialize};

use crate::error::{Msx2Error, Result};
use crate::savestate::b64;

pub const BANK_SIZE: usize = 0x2000;
pub const SRAM_SIZE: usize = 0x2000;
pub const SCC_REGISTERS: usize = 0x100;

/// Declared cartridge type, with the numeric codes used at the host boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RomKind {
    Normal,
    Ascii8,
    Ascii8Sram,
    Ascii16,
    Ascii16Sram,
    KonamiScc,
    Konami,
}

impl RomKind {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(RomKind::Normal),
            1 => Ok(RomKind::Ascii8),
            2 => Ok(RomKind::Ascii8Sram),
            3 => Ok(RomKind::Ascii16),
            4 => Ok(RomKind::Ascii16Sram),
            5 => Ok(RomKind::KonamiScc),
            6 => Ok(RomKind::Konami),
            _ => Err(Msx2Error::UnsupportedMapper(code)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RomKind::Normal => 0,
            RomKind::Ascii8 => 1,
            RomKind::Ascii8Sram => 2,
            RomKind::Ascii16 => 3,
            RomKind::Ascii16Sram => 4,
            RomKind::KonamiScc => 5,
            RomKind::Konami => 6,
        }
    }

    /// Parse a mapper name as used in machine profiles and on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "normal" | "plain" => Some(RomKind::Normal),
            "ascii8" | "asc8" => Some(RomKind::Ascii8),
            "ascii8sram" | "asc8sram" => Some(RomKind::Ascii8Sram),
            "ascii16" | "asc16" => Some(RomKind::Ascii16),
            "ascii16sram" | "asc16sram" => Some(RomKind::Ascii16Sram),
            "konamiscc" | "scc" => Some(RomKind::KonamiScc),
            "konami" => Some(RomKind::Konami),
            _ => None,
        }
    }
}

/// Bank registers, SRAM and SCC registers of a cartridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperState {
    pub kind: RomKind,
    /// Selected bank per 8KB page of the window, in 8KB units
    pub banks: [u16; 4],
    pub sram_selected: bool,
    #[serde(with = "b64::option", default)]
    pub sram: Option<Vec<u8>>,
    #[serde(with = "b64::option", default)]
    pub scc: Option<Vec<u8>>,
}

/// Number of whole-or-partial banks of `size` bytes in `rom`, at least 1
pub(crate) fn bank_count(rom: &[u8], size: usize) -> usize {
    rom.len().div_ceil(size).max(1)
}

/// Byte `offset` of bank `bank` (wrapped), 0xFF past the end of the image
pub(crate) fn banked_read(rom: &[u8], bank: usize, size: usize, offset: usize) -> u8 {
    let bank = bank % bank_count(rom, size);
    rom.get(bank * size + offset).copied().unwrap_or(0xFF)
}

/// Unified mapper enum that dispatches to specific implementations
#[derive(Debug, Clone)]
pub enum Mapper {
    Normal(Normal),
    Ascii8(Ascii8),
    Ascii16(Ascii16),
    KonamiScc(KonamiScc),
    Konami(Konami),
}

impl Mapper {
    /// Wrap a ROM image with the bank-switching behaviour of `kind`
    pub fn new(rom: Vec<u8>, kind: RomKind) -> Self {
        match kind {
            RomKind::Normal => Mapper::Normal(Normal::new(rom)),
            RomKind::Ascii8 => Mapper::Ascii8(Ascii8::new(rom, false)),
            RomKind::Ascii8Sram => Mapper::Ascii8(Ascii8::new(rom, true)),
            RomKind::Ascii16 => Mapper::Ascii16(Ascii16::new(rom, false)),
            RomKind::Ascii16Sram => Mapper::Ascii16(Ascii16::new(rom, true)),
            RomKind::KonamiScc => Mapper::KonamiScc(KonamiScc::new(rom)),
            RomKind::Konami => Mapper::Konami(Konami::new(rom)),
        }
    }

    pub fn kind(&self) -> RomKind {
        match self {
            Mapper::Normal(_) => RomKind::Normal,
            Mapper::Ascii8(m) if m.has_sram() => RomKind::Ascii8Sram,
            Mapper::Ascii8(_) => RomKind::Ascii8,
            Mapper::Ascii16(m) if m.has_sram() => RomKind::Ascii16Sram,
            Mapper::Ascii16(_) => RomKind::Ascii16,
            Mapper::KonamiScc(_) => RomKind::KonamiScc,
            Mapper::Konami(_) => RomKind::Konami,
        }
    }

    pub fn rom(&self) -> &[u8] {
        match self {
            Mapper::Normal(m) => m.rom(),
            Mapper::Ascii8(m) => m.rom(),
            Mapper::Ascii16(m) => m.rom(),
            Mapper::KonamiScc(m) => m.rom(),
            Mapper::Konami(m) => m.rom(),
        }
    }

    /// Read from the cartridge window (0x4000-0xBFFF)
    pub fn read(&self, addr: u16) -> u8 {
        match self {
            Mapper::Normal(m) => m.read(addr),
            Mapper::Ascii8(m) => m.read(addr),
            Mapper::Ascii16(m) => m.read(addr),
            Mapper::KonamiScc(m) => m.read(addr),
            Mapper::Konami(m) => m.read(addr),
        }
    }

    /// Write to the cartridge window (bank registers, SRAM, SCC)
    pub fn write(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Normal(_) => {}
            Mapper::Ascii8(m) => m.write(addr, val),
            Mapper::Ascii16(m) => m.write(addr, val),
            Mapper::KonamiScc(m) => m.write(addr, val),
            Mapper::Konami(m) => m.write(addr, val),
        }
    }

    /// Banks back to power-on values; SRAM is battery backed and survives
    pub fn reset(&mut self) {
        match self {
            Mapper::Normal(_) => {}
            Mapper::Ascii8(m) => m.reset(),
            Mapper::Ascii16(m) => m.reset(),
            Mapper::KonamiScc(m) => m.reset(),
            Mapper::Konami(m) => m.reset(),
        }
    }

    pub fn state(&self) -> MapperState {
        let mut state = MapperState {
            kind: self.kind(),
            banks: [0; 4],
            sram_selected: false,
            sram: None,
            scc: None,
        };
        match self {
            Mapper::Normal(_) => {}
            Mapper::Ascii8(m) => m.save(&mut state),
            Mapper::Ascii16(m) => m.save(&mut state),
            Mapper::KonamiScc(m) => m.save(&mut state),
            Mapper::Konami(m) => m.save(&mut state),
        }
        state
    }

    /// Check a saved state belongs to this cartridge type
    pub fn validate_state(&self, state: &MapperState) -> std::result::Result<(), String> {
        if state.kind != self.kind() {
            return Err(format!(
                "state has a {:?} cartridge, machine has {:?}",
                state.kind,
                self.kind()
            ));
        }
        let sram_ok = match &state.sram {
            Some(sram) => sram.len() == SRAM_SIZE,
            None => !matches!(state.kind, RomKind::Ascii8Sram | RomKind::Ascii16Sram),
        };
        let scc_ok = match &state.scc {
            Some(scc) => scc.len() == SCC_REGISTERS,
            None => state.kind != RomKind::KonamiScc,
        };
        if !sram_ok || !scc_ok {
            return Err("cartridge state has malformed SRAM or SCC data".into());
        }
        // A 16KB register of 0xFF spans 8KB banks 0x1FE and 0x1FF
        let bank_limit = match state.kind {
            RomKind::Ascii16 | RomKind::Ascii16Sram => 0x1FF,
            _ => 0xFF,
        };
        if let Some(bank) = state.banks.iter().find(|&&bank| bank > bank_limit) {
            return Err(format!("cartridge state selects bank {:#X}", bank));
        }
        Ok(())
    }

    pub fn restore_state(&mut self, state: &MapperState) {
        match self {
            Mapper::Normal(_) => {}
            Mapper::Ascii8(m) => m.restore(state),
            Mapper::Ascii16(m) => m.restore(state),
            Mapper::KonamiScc(m) => m.restore(state),
            Mapper::Konami(m) => m.restore(state),
        }
    }
}
