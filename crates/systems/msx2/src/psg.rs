//! General Instrument AY-3-8910 PSG
//!
//! Three square-wave tone channels, the noise generator and the envelope
//! generator, mixed to 44.1kHz stereo. Register 14 reads the joystick port
//! chosen by bit 6 of register 15.
//!
//! # Ports
//! - 0xA0: register latch
//! - 0xA1: register write
//! - 0xA2: register read

use serde::{Deserialize, Serialize};

use emu_core::apu::audio_chip::OUTPUT_SAMPLE_RATE;
use emu_core::apu::timing::CPU_CLOCK_HZ;
use emu_core::apu::{AudioChip, TimingMode};
use emu_core::logging::{log, LogCategory, LogLevel};

/// CPU cycles per generator step (PSG clock is CPU/2, generators run at /16)
const CYCLES_PER_STEP: u32 = 32;

/// Ring buffer capacity in samples (interleaved L/R)
pub const SOUND_BUFFER_LEN: usize = 0x4000;

const VOLUME_TABLE: [i32; 16] = [
    0, 150, 224, 318, 462, 675, 925, 1495, 1847, 2891, 3852, 4914, 6230, 7507, 9264, 10922,
];

/// Saved PSG state (buffered output is not part of it)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsgState {
    pub registers: [u8; 16],
    pub latch: u8,
    pub tone_counters: [u16; 3],
    pub tone_output: [bool; 3],
    pub noise_counter: u16,
    pub noise_lfsr: u32,
    pub envelope_counter: u32,
    pub envelope_step: u8,
    pub envelope_holding: bool,
    pub step_cycles: u32,
    pub sample_phase: u64,
}

/// AY-3-8910 with the MSX joystick wiring
pub struct Psg {
    registers: [u8; 16],
    latch: u8,
    pads: [u8; 2],

    tone_counters: [u16; 3],
    tone_output: [bool; 3],
    noise_counter: u16,
    noise_lfsr: u32,
    envelope_counter: u32,
    envelope_step: u8,
    envelope_holding: bool,

    step_cycles: u32,
    sample_phase: u64,

    buffer: Box<[i16]>,
    buffer_head: usize,
    buffer_len: usize,
    timing: TimingMode,
}

impl Psg {
    pub fn new(timing: TimingMode) -> Self {
        let mut psg = Self {
            registers: [0; 16],
            latch: 0,
            pads: [0; 2],
            tone_counters: [0; 3],
            tone_output: [false; 3],
            noise_counter: 0,
            noise_lfsr: 1,
            envelope_counter: 0,
            envelope_step: 0,
            envelope_holding: false,
            step_cycles: 0,
            sample_phase: 0,
            buffer: vec![0; SOUND_BUFFER_LEN].into_boxed_slice(),
            buffer_head: 0,
            buffer_len: 0,
            timing,
        };
        psg.reset();
        psg
    }

    /// Joypad bits held for this frame (active-high)
    pub fn set_pads(&mut self, pad1: u8, pad2: u8) {
        self.pads = [pad1, pad2];
    }

    pub fn pads(&self) -> [u8; 2] {
        self.pads
    }

    /// Port 0xA0
    pub fn select(&mut self, reg: u8) {
        self.latch = reg & 0x0F;
    }

    /// Port 0xA1
    pub fn write(&mut self, val: u8) {
        self.write_register(self.latch, val);
    }

    pub fn latched(&self) -> u8 {
        self.latch
    }

    /// Port 0xA2
    pub fn read(&self) -> u8 {
        self.read_register(self.latch)
    }

    fn tone_period(&self, channel: usize) -> u16 {
        let lo = self.registers[channel * 2] as u16;
        let hi = (self.registers[channel * 2 + 1] & 0x0F) as u16;
        ((hi << 8) | lo).max(1)
    }

    fn envelope_period(&self) -> u32 {
        (((self.registers[12] as u32) << 8) | self.registers[11] as u32).max(1)
    }

    fn envelope_volume(&self) -> u8 {
        let shape = self.registers[13];
        let attack = shape & 0x04 != 0;
        let level = self.envelope_step & 0x0F;
        if self.envelope_holding {
            // Continue=0 ends at 0; hold/alternate pick the final level
            if shape & 0x08 == 0 {
                return 0;
            }
            let alternate = shape & 0x02 != 0;
            return if attack != alternate { 15 } else { 0 };
        }
        let rising = if shape & 0x02 != 0 && self.envelope_step & 0x10 != 0 {
            !attack
        } else {
            attack
        };
        if rising {
            level
        } else {
            15 - level
        }
    }

    fn step_generators(&mut self) {
        for channel in 0..3 {
            self.tone_counters[channel] += 1;
            if self.tone_counters[channel] >= self.tone_period(channel) {
                self.tone_counters[channel] = 0;
                self.tone_output[channel] = !self.tone_output[channel];
            }
        }

        self.noise_counter += 1;
        let noise_period = ((self.registers[6] & 0x1F) as u16).max(1) * 2;
        if self.noise_counter >= noise_period {
            self.noise_counter = 0;
            let feedback = (self.noise_lfsr ^ (self.noise_lfsr >> 3)) & 1;
            self.noise_lfsr = (self.noise_lfsr >> 1) | (feedback << 16);
        }

        if !self.envelope_holding {
            self.envelope_counter += 1;
            if self.envelope_counter >= self.envelope_period() {
                self.envelope_counter = 0;
                self.envelope_step += 1;
                let shape = self.registers[13];
                let cycle_done = self.envelope_step & 0x0F == 0;
                if cycle_done {
                    let continues = shape & 0x08 != 0;
                    let hold = shape & 0x01 != 0;
                    if !continues || hold {
                        self.envelope_holding = true;
                    }
                }
                self.envelope_step &= 0x1F;
            }
        }
    }

    fn mix(&self) -> i16 {
        let mixer = self.registers[7];
        let noise = self.noise_lfsr & 1 != 0;
        let mut total = 0i32;
        for channel in 0..3 {
            let tone_on = mixer & (1 << channel) == 0;
            let noise_on = mixer & (8 << channel) == 0;
            let high = (!tone_on || self.tone_output[channel]) && (!noise_on || noise);
            if !high {
                continue;
            }
            let amplitude = self.registers[8 + channel];
            let volume = if amplitude & 0x10 != 0 {
                self.envelope_volume()
            } else {
                amplitude & 0x0F
            };
            total += VOLUME_TABLE[volume as usize];
        }
        total.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    fn push_sample(&mut self, sample: i16) {
        for _ in 0..2 {
            let tail = (self.buffer_head + self.buffer_len) % SOUND_BUFFER_LEN;
            self.buffer[tail] = sample;
            if self.buffer_len == SOUND_BUFFER_LEN {
                // Full: drop the oldest sample
                self.buffer_head = (self.buffer_head + 1) % SOUND_BUFFER_LEN;
            } else {
                self.buffer_len += 1;
            }
        }
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer_len
    }

    pub fn state(&self) -> PsgState {
        PsgState {
            registers: self.registers,
            latch: self.latch,
            tone_counters: self.tone_counters,
            tone_output: self.tone_output,
            noise_counter: self.noise_counter,
            noise_lfsr: self.noise_lfsr,
            envelope_counter: self.envelope_counter,
            envelope_step: self.envelope_step,
            envelope_holding: self.envelope_holding,
            step_cycles: self.step_cycles,
            sample_phase: self.sample_phase,
        }
    }

    pub fn restore_state(&mut self, state: &PsgState) {
        self.registers = state.registers;
        self.latch = state.latch & 0x0F;
        self.tone_counters = state.tone_counters;
        self.tone_output = state.tone_output;
        self.noise_counter = state.noise_counter;
        self.noise_lfsr = state.noise_lfsr.max(1);
        self.envelope_counter = state.envelope_counter;
        self.envelope_step = state.envelope_step & 0x1F;
        self.envelope_holding = state.envelope_holding;
        self.step_cycles = state.step_cycles % CYCLES_PER_STEP;
        self.sample_phase = state.sample_phase % CPU_CLOCK_HZ as u64;
        self.buffer_head = 0;
        self.buffer_len = 0;
    }
}

impl AudioChip for Psg {
    fn write_register(&mut self, reg: u8, val: u8) {
        let reg = (reg & 0x0F) as usize;
        let val = match reg {
            1 | 3 | 5 | 13 => val & 0x0F,
            6 | 8 | 9 | 10 => val & 0x1F,
            _ => val,
        };
        self.registers[reg] = val;
        if reg == 13 {
            self.envelope_counter = 0;
            self.envelope_step = 0;
            self.envelope_holding = false;
        }
        log(LogCategory::Audio, LogLevel::Trace, || {
            format!("PSG R{} <- {:02X}", reg, val)
        });
    }

    fn read_register(&self, reg: u8) -> u8 {
        match reg & 0x0F {
            14 => {
                let port = ((self.registers[15] >> 6) & 1) as usize;
                // Joystick lines are active-low; bits 6-7 read high
                0xC0 | (!self.pads[port] & 0x3F)
            }
            15 => self.registers[15],
            reg => self.registers[reg as usize],
        }
    }

    fn advance(&mut self, cycles: u32) {
        self.step_cycles += cycles;
        while self.step_cycles >= CYCLES_PER_STEP {
            self.step_cycles -= CYCLES_PER_STEP;
            self.step_generators();
        }
        self.sample_phase += cycles as u64 * OUTPUT_SAMPLE_RATE as u64;
        while self.sample_phase >= CPU_CLOCK_HZ as u64 {
            self.sample_phase -= CPU_CLOCK_HZ as u64;
            let sample = self.mix();
            self.push_sample(sample);
        }
    }

    fn drain_samples(&mut self, out: &mut Vec<i16>) {
        out.reserve(self.buffer_len);
        for i in 0..self.buffer_len {
            out.push(self.buffer[(self.buffer_head + i) % SOUND_BUFFER_LEN]);
        }
        self.buffer_head = 0;
        self.buffer_len = 0;
    }

    fn timing(&self) -> TimingMode {
        self.timing
    }

    fn reset(&mut self) {
        self.registers = [0; 16];
        // Mixer: everything off until the BIOS programs it
        self.registers[7] = 0xBF;
        self.latch = 0;
        self.tone_counters = [0; 3];
        self.tone_output = [false; 3];
        self.noise_counter = 0;
        self.noise_lfsr = 1;
        self.envelope_counter = 0;
        self.envelope_step = 0;
        self.envelope_holding = false;
        self.step_cycles = 0;
        self.sample_phase = 0;
        self.buffer.fill(0);
        self.buffer_head = 0;
        self.buffer_len = 0;
    }
}
