//! Frame timing for the two video standards.

use serde::{Deserialize, Serialize};

/// Z80 clock of an MSX machine (NTSC colour burst).
pub const CPU_CLOCK_HZ: u32 = 3_579_545;

/// CPU cycles per scanline.
pub const CYCLES_PER_LINE: u32 = 228;

/// Video standard timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimingMode {
    /// NTSC - 262 lines, 60 Hz
    #[default]
    Ntsc,
    /// PAL - 313 lines, 50 Hz
    Pal,
}

impl TimingMode {
    /// Get the CPU clock frequency in Hz for this timing mode
    pub fn cpu_clock_hz(&self) -> u32 {
        CPU_CLOCK_HZ
    }

    /// Get the frame rate in Hz for this timing mode
    pub fn frame_rate_hz(&self) -> f64 {
        match self {
            TimingMode::Ntsc => 59.92,
            TimingMode::Pal => 50.16,
        }
    }

    pub fn lines_per_frame(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 262,
            TimingMode::Pal => 313,
        }
    }

    /// CPU cycles in one video frame
    pub fn cycles_per_frame(&self) -> u32 {
        self.lines_per_frame() * CYCLES_PER_LINE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_frame_length() {
        assert_eq!(TimingMode::Ntsc.cycles_per_frame(), 59_736);
        assert_eq!(TimingMode::default(), TimingMode::Ntsc);
    }

    #[test]
    fn test_pal_frame_length() {
        assert_eq!(TimingMode::Pal.lines_per_frame(), 313);
        assert_eq!(TimingMode::Pal.cycles_per_frame(), 71_364);
    }
}
