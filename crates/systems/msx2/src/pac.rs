//! FM-PAC battery-backed SRAM
//!
//! 8KB of SRAM overlays the first half of the FM BIOS quadrant once 0x4D and
//! 0x69 are written to its last two bytes (quadrant offsets 0x1FFE/0x1FFF).
//! Those two bytes always read the ROM. Other writes to the page belong to
//! the FM sound chip, which is not emulated.

use serde::{Deserialize, Serialize};

use crate::savestate::b64;
use emu_core::logging::{log, LogCategory, LogLevel};

pub const PAC_SIZE: usize = 0x2000;
const ENABLE_KEY: [u8; 2] = [0x4D, 0x69];
const KEY_OFFSET: u16 = 0x1FFE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacState {
    #[serde(with = "b64")]
    pub sram: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PacSram {
    sram: Vec<u8>,
}

impl PacSram {
    pub fn new() -> Self {
        Self {
            sram: vec![0; PAC_SIZE],
        }
    }

    pub fn enabled(&self) -> bool {
        self.sram[KEY_OFFSET as usize..] == ENABLE_KEY
    }

    /// SRAM byte at a quadrant offset, `None` where the BIOS ROM shows through
    pub fn read(&self, window: u16) -> Option<u8> {
        (self.enabled() && window < KEY_OFFSET).then(|| self.sram[window as usize])
    }

    pub fn write(&mut self, window: u16, val: u8) {
        match window {
            0x1FFE | 0x1FFF => {
                let was = self.enabled();
                self.sram[window as usize] = val;
                if was != self.enabled() {
                    log(LogCategory::Slots, LogLevel::Debug, || {
                        format!("PAC SRAM {}", if was { "disabled" } else { "enabled" })
                    });
                }
            }
            w if self.enabled() && (w as usize) < PAC_SIZE => self.sram[w as usize] = val,
            _ => log(LogCategory::Audio, LogLevel::Trace, || {
                format!("FM write {:04X} <- {:02X} ignored", window, val)
            }),
        }
    }

    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    pub fn state(&self) -> PacState {
        PacState {
            sram: self.sram.clone(),
        }
    }

    pub fn validate_state(state: &PacState) -> std::result::Result<(), String> {
        if state.sram.len() != PAC_SIZE {
            return Err(format!("PAC SRAM of {} bytes", state.sram.len()));
        }
        Ok(())
    }

    pub fn restore_state(&mut self, state: &PacState) {
        self.sram.copy_from_slice(&state.sram);
    }
}

impl Default for PacSram {
    fn default() -> Self {
        Self::new()
    }
}
