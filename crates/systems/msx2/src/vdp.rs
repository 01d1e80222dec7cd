//! Yamaha V9938 Video Display Processor (reduced)
//!
//! Register file R0-R46, status registers S0-S9, 128KB VRAM and the 9-bit
//! palette are complete, so software can program the chip freely. Rendering
//! covers TEXT1 and GRAPHIC1; every other mode shows the backdrop colour.
//!
//! # Ports
//! - 0x98: VRAM data
//! - 0x99: control (address / register setup) and status read
//! - 0x9A: palette data
//! - 0x9B: indirect register access through R17

use serde::{Deserialize, Serialize};

use crate::savestate::b64;
use emu_core::apu::timing::CYCLES_PER_LINE;
use emu_core::apu::TimingMode;
use emu_core::logging::{log, LogCategory, LogLevel};

pub const VRAM_SIZE: usize = 0x20000;
pub const SCREEN_WIDTH: usize = 568;
pub const SCREEN_HEIGHT: usize = 240;
pub const FRAMEBUFFER_LEN: usize = SCREEN_WIDTH * SCREEN_HEIGHT;
const BORDER_X: usize = 28;
const REGISTER_COUNT: usize = 64;
const STATUS_COUNT: usize = 10;

/// Power-on palette (R, G, B; 3 bits each)
const DEFAULT_PALETTE: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (0, 0, 0),
    (1, 6, 1),
    (3, 7, 3),
    (1, 1, 7),
    (2, 3, 7),
    (5, 1, 1),
    (2, 6, 7),
    (7, 1, 1),
    (7, 3, 3),
    (6, 6, 1),
    (6, 6, 4),
    (1, 4, 1),
    (6, 2, 5),
    (5, 5, 5),
    (7, 7, 7),
];

fn default_palette() -> [u16; 16] {
    DEFAULT_PALETTE.map(|(r, g, b)| ((r as u16) << 6) | ((g as u16) << 3) | b as u16)
}

/// 9-bit palette entry (RRRGGGBBB) to RGB565
fn to_rgb565(entry: u16) -> u16 {
    let r = (entry >> 6) & 7;
    let g = (entry >> 3) & 7;
    let b = entry & 7;
    ((r * 31 / 7) << 11) | ((g * 63 / 7) << 5) | (b * 31 / 7)
}

/// Display mode decoded from M1-M5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    Text1,
    Graphic1,
    Other,
}

/// Saved VDP state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdpState {
    #[serde(with = "b64")]
    pub vram: Vec<u8>,
    pub registers: Vec<u8>,
    pub status: Vec<u8>,
    pub palette: Vec<u16>,
    pub address: u32,
    pub read_ahead: u8,
    pub control_latch: Option<u8>,
    pub palette_latch: Option<u8>,
    pub line: u32,
    pub line_cycles: u32,
}

/// VDP state and rendering
pub struct Vdp {
    vram: Vec<u8>,
    registers: [u8; REGISTER_COUNT],
    status: [u8; STATUS_COUNT],
    palette: [u16; 16],

    // Access state
    address: u32,
    read_ahead: u8,
    control_latch: Option<u8>,
    palette_latch: Option<u8>,

    // Raster position
    line: u32,
    line_cycles: u32,
    lines_per_frame: u32,
}

impl Vdp {
    pub fn new(timing: TimingMode) -> Self {
        let mut vdp = Self {
            vram: vec![0; VRAM_SIZE],
            registers: [0; REGISTER_COUNT],
            status: [0; STATUS_COUNT],
            palette: default_palette(),
            address: 0,
            read_ahead: 0,
            control_latch: None,
            palette_latch: None,
            line: 0,
            line_cycles: 0,
            lines_per_frame: timing.lines_per_frame(),
        };
        vdp.reset();
        vdp
    }

    pub fn reset(&mut self) {
        self.vram.fill(0);
        self.registers.fill(0);
        self.status.fill(0);
        // S2: transfer ready, fixed bits set
        self.status[2] = 0x8C;
        self.palette = default_palette();
        self.address = 0;
        self.read_ahead = 0;
        self.control_latch = None;
        self.palette_latch = None;
        self.line = 0;
        self.line_cycles = 0;
    }

    pub fn register(&self, reg: usize) -> u8 {
        self.registers[reg % REGISTER_COUNT]
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    /// Number of displayed lines (R9 LN)
    pub fn display_lines(&self) -> u32 {
        if self.registers[9] & 0x80 != 0 {
            212
        } else {
            192
        }
    }

    pub fn screen_mode(&self) -> ScreenMode {
        let m1 = self.registers[1] & 0x10 != 0;
        let m2 = self.registers[1] & 0x08 != 0;
        let m345 = self.registers[0] & 0x0E;
        match (m1, m2, m345) {
            (true, false, 0) => ScreenMode::Text1,
            (false, false, 0) => ScreenMode::Graphic1,
            _ => ScreenMode::Other,
        }
    }

    /// Interrupt line: vblank flag raised and IE0 enabled
    pub fn irq(&self) -> bool {
        self.status[0] & 0x80 != 0 && self.registers[1] & 0x20 != 0
    }

    fn write_register(&mut self, reg: u8, val: u8) {
        let reg = (reg & 0x3F) as usize;
        if reg > 46 {
            return;
        }
        self.registers[reg] = val;
        if reg == 14 {
            self.address = (self.address & 0x3FFF) | (((val & 0x07) as u32) << 14);
        }
        log(LogCategory::Video, LogLevel::Trace, || {
            format!("R#{} <- {:02X}", reg, val)
        });
    }

    /// Port 0x98 write
    pub fn write_data(&mut self, val: u8) {
        self.control_latch = None;
        self.vram[self.address as usize] = val;
        self.read_ahead = val;
        self.increment_address();
    }

    /// Port 0x98 read
    pub fn read_data(&mut self) -> u8 {
        self.control_latch = None;
        let val = self.read_ahead;
        self.read_ahead = self.vram[self.address as usize];
        self.increment_address();
        val
    }

    fn increment_address(&mut self) {
        self.address = (self.address + 1) & (VRAM_SIZE as u32 - 1);
        if self.address & 0x3FFF == 0 {
            self.registers[14] = ((self.address >> 14) & 0x07) as u8;
        }
    }

    /// Port 0x99 write
    pub fn write_control(&mut self, val: u8) {
        match self.control_latch.take() {
            None => self.control_latch = Some(val),
            Some(low) => {
                if val & 0x80 != 0 {
                    self.write_register(val, low);
                } else {
                    let high = ((self.registers[14] & 0x07) as u32) << 14;
                    self.address = high | (((val & 0x3F) as u32) << 8) | low as u32;
                    if val & 0x40 == 0 {
                        // Read setup prefetches
                        self.read_ahead = self.vram[self.address as usize];
                        self.increment_address();
                    }
                }
            }
        }
    }

    /// Port 0x99 read: status register selected by R15
    pub fn read_status(&mut self) -> u8 {
        self.control_latch = None;
        let index = (self.registers[15] & 0x0F) as usize;
        match index {
            0 => {
                let val = self.status[0];
                self.status[0] &= 0x1F;
                val
            }
            1 => {
                // V9938 id, FH flag cleared on read
                let val = self.status[1] & 0x01;
                self.status[1] = 0;
                val
            }
            _ if index < STATUS_COUNT => self.status[index],
            _ => 0xFF,
        }
    }

    /// Port 0x9A write
    pub fn write_palette(&mut self, val: u8) {
        match self.palette_latch.take() {
            None => self.palette_latch = Some(val),
            Some(first) => {
                let index = (self.registers[16] & 0x0F) as usize;
                let r = ((first >> 4) & 7) as u16;
                let b = (first & 7) as u16;
                let g = (val & 7) as u16;
                self.palette[index] = (r << 6) | (g << 3) | b;
                self.registers[16] = ((index + 1) & 0x0F) as u8;
            }
        }
    }

    /// Port 0x9B write
    pub fn write_indirect(&mut self, val: u8) {
        let target = self.registers[17] & 0x3F;
        if target != 17 {
            self.write_register(target, val);
        }
        if self.registers[17] & 0x80 == 0 {
            self.registers[17] = (self.registers[17] & 0xC0) | ((target + 1) & 0x3F);
        }
    }

    /// Run the raster for `cycles` CPU cycles. Returns the interrupt line.
    pub fn advance(&mut self, cycles: u32) -> bool {
        self.line_cycles += cycles;
        while self.line_cycles >= CYCLES_PER_LINE {
            self.line_cycles -= CYCLES_PER_LINE;
            self.line += 1;
            if self.line == self.display_lines() {
                self.status[0] |= 0x80;
                self.status[2] |= 0x40;
            }
            if self.line >= self.lines_per_frame {
                self.line = 0;
                self.status[2] &= !0x40;
            }
        }
        self.irq()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn color(&self, index: u8) -> u16 {
        let index = if index == 0 {
            self.registers[7] & 0x0F
        } else {
            index & 0x0F
        };
        to_rgb565(self.palette[index as usize])
    }

    /// Render the current VRAM contents into a 568x240 RGB565 surface.
    pub fn render(&self, out: &mut [u16]) {
        let backdrop = self.color(0);
        out.fill(backdrop);
        if self.registers[1] & 0x40 == 0 {
            return;
        }

        let lines = self.display_lines() as usize;
        let top = (SCREEN_HEIGHT - lines) / 2;
        let mut row = [0u8; 256];
        for y in 0..lines {
            let filled = match self.screen_mode() {
                ScreenMode::Text1 => self.text1_line(y, &mut row),
                ScreenMode::Graphic1 => self.graphic1_line(y, &mut row),
                ScreenMode::Other => false,
            };
            if !filled {
                continue;
            }
            let line = &mut out[(top + y) * SCREEN_WIDTH..(top + y + 1) * SCREEN_WIDTH];
            for (x, &index) in row.iter().enumerate() {
                let pixel = self.color(index);
                line[BORDER_X + x * 2] = pixel;
                line[BORDER_X + x * 2 + 1] = pixel;
            }
        }
    }

    fn table_base(&self, reg: usize, shift: u32, mask: u32) -> usize {
        (((self.registers[reg] as u32) << shift) & mask) as usize
    }

    fn text1_line(&self, y: usize, row: &mut [u8; 256]) -> bool {
        if y >= 192 {
            return false;
        }
        let names = self.table_base(2, 10, 0x1FC00);
        let patterns = self.table_base(4, 11, 0x1F800);
        let fg = self.registers[7] >> 4;
        let bg = self.registers[7] & 0x0F;
        row.fill(bg);
        for column in 0..40 {
            let name = self.vram[names + (y / 8) * 40 + column] as usize;
            let bits = self.vram[(patterns + name * 8 + y % 8) & (VRAM_SIZE - 1)];
            for px in 0..6 {
                if bits & (0x80 >> px) != 0 {
                    row[8 + column * 6 + px] = fg;
                }
            }
        }
        true
    }

    fn graphic1_line(&self, y: usize, row: &mut [u8; 256]) -> bool {
        if y >= 192 {
            return false;
        }
        let names = self.table_base(2, 10, 0x1FC00);
        let colors = self.table_base(3, 6, 0x3FC0) | self.table_base(10, 14, 0x1C000);
        let patterns = self.table_base(4, 11, 0x1F800);
        for column in 0..32 {
            let name = self.vram[names + (y / 8) * 32 + column] as usize;
            let bits = self.vram[(patterns + name * 8 + y % 8) & (VRAM_SIZE - 1)];
            let color = self.vram[(colors + name / 8) & (VRAM_SIZE - 1)];
            for px in 0..8 {
                row[column * 8 + px] = if bits & (0x80 >> px) != 0 {
                    color >> 4
                } else {
                    color & 0x0F
                };
            }
        }
        true
    }

    pub fn state(&self) -> VdpState {
        VdpState {
            vram: self.vram.clone(),
            registers: self.registers.to_vec(),
            status: self.status.to_vec(),
            palette: self.palette.to_vec(),
            address: self.address,
            read_ahead: self.read_ahead,
            control_latch: self.control_latch,
            palette_latch: self.palette_latch,
            line: self.line,
            line_cycles: self.line_cycles,
        }
    }

    pub fn validate_state(state: &VdpState) -> Result<(), String> {
        if state.vram.len() != VRAM_SIZE
            || state.registers.len() != REGISTER_COUNT
            || state.status.len() != STATUS_COUNT
            || state.palette.len() != 16
        {
            return Err("video state has the wrong shape".into());
        }
        Ok(())
    }

    /// Apply a state already checked by `validate_state`
    pub fn restore_state(&mut self, state: VdpState) {
        self.registers.copy_from_slice(&state.registers);
        self.status.copy_from_slice(&state.status);
        self.palette.copy_from_slice(&state.palette);
        self.vram = state.vram;
        self.address = state.address & (VRAM_SIZE as u32 - 1);
        self.read_ahead = state.read_ahead;
        self.control_latch = state.control_latch;
        self.palette_latch = state.palette_latch;
        self.line = state.line % self.lines_per_frame;
        self.line_cycles = state.line_cycles % CYCLES_PER_LINE;
    }
}
