//! Kanji ROM character generator
//!
//! Two independent address/index pairs: ports 0xD8/0xD9 address the JIS level
//! 1 half of the font, 0xDA/0xDB the level 2 half at offset 0x20000. Each
//! glyph is 32 bytes and reads auto-increment within the glyph.

use serde::{Deserialize, Serialize};

use crate::error::{Msx2Error, Result};

pub const FONT_SIZE: usize = 0x40000;
const LEVEL2_OFFSET: usize = 0x20000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanjiState {
    pub address: [u32; 2],
    pub index: [u8; 2],
}

pub struct Kanji {
    font: Vec<u8>,
    address: [u32; 2],
    index: [u8; 2],
}

impl Kanji {
    pub fn new() -> Self {
        Self {
            font: vec![0xFF; FONT_SIZE],
            address: [0; 2],
            index: [0; 2],
        }
    }

    /// Install glyph data; anything past the supplied bytes reads 0xFF
    pub fn load_font(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > FONT_SIZE {
            return Err(Msx2Error::BufferSize {
                expected: FONT_SIZE,
                actual: data.len(),
            });
        }
        self.font.fill(0xFF);
        self.font[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Low address bits (ports 0xD8 / 0xDA)
    pub fn write_low(&mut self, pair: usize, val: u8) {
        self.address[pair] = (self.address[pair] & 0x1F800) | (((val & 0x3F) as u32) << 5);
        self.index[pair] = 0;
    }

    /// High address bits (ports 0xD9 / 0xDB)
    pub fn write_high(&mut self, pair: usize, val: u8) {
        self.address[pair] = (self.address[pair] & 0x7E0) | (((val & 0x3F) as u32) << 11);
        self.index[pair] = 0;
    }

    /// Next glyph byte (ports 0xD9 / 0xDB)
    pub fn read(&mut self, pair: usize) -> u8 {
        let base = if pair == 0 { 0 } else { LEVEL2_OFFSET };
        let offset = base + self.address[pair] as usize + self.index[pair] as usize;
        self.index[pair] = (self.index[pair] + 1) & 0x1F;
        self.font.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn reset(&mut self) {
        self.address = [0; 2];
        self.index = [0; 2];
    }

    pub fn state(&self) -> KanjiState {
        KanjiState {
            address: self.address,
            index: self.index,
        }
    }

    pub fn restore_state(&mut self, state: &KanjiState) {
        self.address = state.address.map(|a| a & 0x1FFE0);
        self.index = state.index.map(|i| i & 0x1F);
    }
}

impl Default for Kanji {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font() -> Vec<u8> {
        (0..FONT_SIZE).map(|i| (i / 32) as u8).collect()
    }

    #[test]
    fn test_glyph_addressing() {
        let mut kanji = Kanji::new();
        kanji.load_font(&font()).unwrap();
        kanji.write_low(0, 0x21);
        kanji.write_high(0, 0x02);
        // glyph (2 << 6) | 0x21
        let glyph = ((2 << 6) | 0x21) as u8;
        assert_eq!(kanji.read(0), glyph);
        for _ in 0..31 {
            kanji.read(0);
        }
        // index wraps within the same glyph
        assert_eq!(kanji.read(0), glyph);
        assert_eq!(kanji.state().index[0], 1);
    }

    #[test]
    fn test_pairs_are_independent() {
        let mut kanji = Kanji::new();
        kanji.load_font(&font()).unwrap();
        kanji.write_low(1, 0x01);
        kanji.read(0);
        assert_eq!(kanji.read(1), ((LEVEL2_OFFSET + 0x20) / 32) as u8);
        assert_eq!(kanji.state().index, [1, 1]);
        kanji.write_high(1, 0);
        assert_eq!(kanji.state().index, [1, 0]);
    }

    #[test]
    fn test_font_size_limit() {
        let mut kanji = Kanji::new();
        assert_eq!(
            kanji.load_font(&vec![0; FONT_SIZE + 1]),
            Err(Msx2Error::BufferSize {
                expected: FONT_SIZE,
                actual: FONT_SIZE + 1
            })
        );
        kanji.load_font(&[0x12; 16]).unwrap();
        assert_eq!(kanji.read(0), 0x12);
        kanji.write_low(0, 1);
        assert_eq!(kanji.read(0), 0xFF);
    }
}
