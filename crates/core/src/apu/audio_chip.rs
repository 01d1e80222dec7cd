//! Audio chip trait for pluggable audio implementations.
//!
//! A system drives its sound chip with "advance by N CPU cycles" calls and
//! drains the produced samples once per frame.

use super::TimingMode;

/// Host output rate every chip resamples to.
pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// A trait for programmable sound generators.
pub trait AudioChip {
    /// Write to a register on the audio chip
    fn write_register(&mut self, reg: u8, val: u8);

    /// Read from a register on the audio chip (if supported)
    fn read_register(&self, reg: u8) -> u8 {
        let _ = reg;
        0xFF // Default: no readable registers
    }

    /// Run the chip for `cycles` CPU cycles, buffering output samples.
    fn advance(&mut self, cycles: u32);

    /// Move buffered interleaved stereo samples into `out`.
    fn drain_samples(&mut self, out: &mut Vec<i16>);

    /// Get the timing mode of this chip (NTSC/PAL)
    fn timing(&self) -> TimingMode;

    /// Reset the chip to power-on state
    fn reset(&mut self);

    /// Output sample rate (in Hz)
    fn sample_rate(&self) -> u32 {
        OUTPUT_SAMPLE_RATE
    }
}
