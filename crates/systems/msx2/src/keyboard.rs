//! PPI keyboard interface (ports 0xA9-0xAB)
//!
//! The host passes either one ASCII-like key code per frame, looked up in a
//! fixed table of matrix positions, or a whole 16-row matrix with a set bit
//! per held key. Pressed keys show up, active-low, when the BIOS scans the
//! matching row through port 0xA9. Port C (0xAA) carries the row
//! number in its low nibble; port 0xAB sets or clears single port C bits.

use serde::{Deserialize, Serialize};

use crate::error::{Msx2Error, Result};
use emu_core::logging::{log, LogCategory, LogLevel};

pub const PAD_UP: u8 = 0x01;
pub const PAD_DOWN: u8 = 0x02;
pub const PAD_LEFT: u8 = 0x04;
pub const PAD_RIGHT: u8 = 0x08;
pub const PAD_T1: u8 = 0x10;
pub const PAD_T2: u8 = 0x20;
pub const PAD_S1: u8 = 0x40;
pub const PAD_S2: u8 = 0x80;

/// Rows in a host key matrix; the PPI can select 16 rows
pub const MATRIX_ROWS: usize = 16;

const PORT_C_POWER_ON: u8 = 0x50;
const SHIFT_ROW: u8 = 6;

/// Matrix position(s) of a key code: (bit, row) pairs plus the shift flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPosition {
    pub keys: &'static [(u8, u8)],
    pub shift: bool,
}

const fn plain(keys: &'static [(u8, u8)]) -> Option<KeyPosition> {
    Some(KeyPosition { keys, shift: false })
}

const fn shifted(keys: &'static [(u8, u8)]) -> Option<KeyPosition> {
    Some(KeyPosition { keys, shift: true })
}

/// Matrix position for a host key code, `None` for unmapped codes
pub fn key_position(code: u8) -> Option<KeyPosition> {
    match code {
        b'0' => plain(&[(0, 0)]),
        b'1' => plain(&[(1, 0)]),
        b'!' => shifted(&[(1, 0)]),
        b'2' => plain(&[(2, 0)]),
        b'"' => shifted(&[(2, 0)]),
        b'3' => plain(&[(3, 0)]),
        b'#' => shifted(&[(3, 0)]),
        b'4' => plain(&[(4, 0)]),
        b'$' => shifted(&[(4, 0)]),
        b'5' => plain(&[(5, 0)]),
        b'%' => shifted(&[(5, 0)]),
        b'6' => plain(&[(6, 0)]),
        b'&' => shifted(&[(6, 0)]),
        b'7' => plain(&[(7, 0)]),
        b'\'' => shifted(&[(7, 0)]),
        b'8' => plain(&[(0, 1)]),
        b'(' => shifted(&[(0, 1)]),
        b'9' => plain(&[(1, 1)]),
        b')' => shifted(&[(1, 1)]),
        b'-' => plain(&[(2, 1)]),
        b'=' => shifted(&[(2, 1)]),
        b'^' => plain(&[(3, 1)]),
        b'~' => shifted(&[(3, 1)]),
        b'\\' => plain(&[(4, 1)]),
        b'|' => shifted(&[(4, 1)]),
        b'@' => plain(&[(5, 1)]),
        b'`' => shifted(&[(5, 1)]),
        b'[' => plain(&[(6, 1)]),
        b'{' => shifted(&[(6, 1)]),
        b';' => plain(&[(7, 1)]),
        b'+' => shifted(&[(7, 1)]),
        b':' => plain(&[(0, 2)]),
        b'*' => shifted(&[(0, 2)]),
        b']' => plain(&[(1, 2)]),
        b'}' => shifted(&[(1, 2)]),
        b',' => plain(&[(2, 2)]),
        b'<' => shifted(&[(2, 2)]),
        b'.' => plain(&[(3, 2)]),
        b'>' => shifted(&[(3, 2)]),
        b'/' => plain(&[(4, 2)]),
        b'?' => shifted(&[(4, 2)]),
        b'_' => plain(&[(5, 2)]),
        b'a'..=b'z' | b'A'..=b'Z' => {
            static LETTERS: [(u8, u8); 26] = [
                (6, 2), (7, 2), (0, 3), (1, 3), (2, 3), (3, 3), (4, 3), (5, 3), (6, 3),
                (7, 3), (0, 4), (1, 4), (2, 4), (3, 4), (4, 4), (5, 4), (6, 4), (7, 4),
                (0, 5), (1, 5), (2, 5), (3, 5), (4, 5), (5, 5), (6, 5), (7, 5),
            ];
            let index = (code.to_ascii_lowercase() - b'a') as usize;
            Some(KeyPosition {
                keys: std::slice::from_ref(&LETTERS[index]),
                shift: code.is_ascii_uppercase(),
            })
        }
        b'\r' | b'\n' => plain(&[(7, 7)]),
        b'\t' => plain(&[(3, 7)]),
        b' ' => plain(&[(0, 8)]),
        // CTRL + STOP
        0x18 => plain(&[(1, 6), (4, 7)]),
        0x1B => plain(&[(2, 7)]),
        // DEL acts as backspace
        0x7F => plain(&[(5, 7)]),
        0xC0 => plain(&[(5, 8)]),
        0xC1 => plain(&[(6, 8)]),
        0xC2 => plain(&[(4, 8)]),
        0xC3 => plain(&[(7, 8)]),
        0xF1 => plain(&[(5, 6)]),
        0xF2 => plain(&[(6, 6)]),
        0xF3 => plain(&[(7, 6)]),
        0xF4 => plain(&[(0, 7)]),
        0xF5 => plain(&[(1, 7)]),
        0xF6 => shifted(&[(5, 6)]),
        0xF7 => shifted(&[(6, 6)]),
        0xF8 => shifted(&[(7, 6)]),
        0xF9 => shifted(&[(0, 7)]),
        0xFA => shifted(&[(1, 7)]),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardState {
    pub port_c: u8,
    pub row: u8,
}

/// Keyboard matrix side of the PPI
#[derive(Debug, Clone)]
pub struct Keyboard {
    port_c: u8,
    row: u8,
    key: Option<KeyPosition>,
    matrix: Option<[u8; MATRIX_ROWS]>,
    special: [Option<KeyPosition>; 2],
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            port_c: PORT_C_POWER_ON,
            row: PORT_C_POWER_ON & 0x0F,
            key: None,
            matrix: None,
            special: [None; 2],
        }
    }

    /// Keys pressed while pad 1 select (S1) / start (S2) is held; 0 clears
    pub fn set_special_keys(&mut self, select: u8, start: u8) -> Result<()> {
        let lookup = |code: u8| match code {
            0 => Ok(None),
            code => key_position(code)
                .map(Some)
                .ok_or(Msx2Error::UnknownKeyCode(code)),
        };
        let select = lookup(select)?;
        let start = lookup(start)?;
        self.special = [select, start];
        Ok(())
    }

    /// Key held for the coming frame; 0 or an unmapped code means none
    pub fn set_key(&mut self, code: u8) {
        self.matrix = None;
        self.key = key_position(code);
        if code != 0 && self.key.is_none() {
            log(LogCategory::Bus, LogLevel::Debug, || {
                format!("Ignoring unmapped key code {:02X}", code)
            });
        }
    }

    /// Whole matrix held for the coming frame, replacing the single key
    pub fn set_matrix(&mut self, matrix: &[u8; MATRIX_ROWS]) {
        self.key = None;
        self.matrix = Some(*matrix);
    }

    /// Port 0xA9: selected row, pressed keys read as 0
    pub fn read_row(&self, pad1: u8) -> u8 {
        let mut pressed = match &self.matrix {
            Some(matrix) => matrix[self.row as usize & (MATRIX_ROWS - 1)],
            None => 0,
        };
        let mut press = |position: &KeyPosition| {
            if position.shift && self.row == SHIFT_ROW {
                pressed |= 0x01;
            }
            for &(bit, row) in position.keys {
                if row == self.row {
                    pressed |= 1 << bit;
                }
            }
        };
        if let Some(key) = &self.key {
            press(key);
        }
        for (position, pad_bit) in self.special.iter().zip([PAD_S1, PAD_S2]) {
            if let Some(position) = position {
                if pad1 & pad_bit != 0 {
                    press(position);
                }
            }
        }
        !pressed
    }

    /// Port 0xAA read
    pub fn port_c(&self) -> u8 {
        self.port_c
    }

    /// Port 0xAA write
    pub fn write_port_c(&mut self, val: u8) {
        let changed = self.port_c ^ val;
        self.port_c = val;
        if changed & 0x0F != 0 {
            self.row = val & 0x0F;
        }
    }

    /// Port 0xAB: bit set/reset when bit 7 is clear, mode words ignored
    pub fn write_control(&mut self, val: u8) {
        if val & 0x80 != 0 {
            return;
        }
        let bit = (val & 0x0E) >> 1;
        if val & 0x01 != 0 {
            self.port_c |= 1 << bit;
        } else {
            self.port_c &= !(1 << bit);
        }
        if bit <= 3 {
            self.row = self.port_c & 0x0F;
        }
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    /// Power-on PPI state; special key assignments are configuration and stay
    pub fn reset(&mut self) {
        self.port_c = PORT_C_POWER_ON;
        self.row = PORT_C_POWER_ON & 0x0F;
        self.key = None;
        self.matrix = None;
    }

    pub fn state(&self) -> KeyboardState {
        KeyboardState {
            port_c: self.port_c,
            row: self.row,
        }
    }

    pub fn restore_state(&mut self, state: &KeyboardState) {
        self.port_c = state.port_c;
        self.row = state.row & 0x0F;
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}
