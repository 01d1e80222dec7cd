//! Ricoh RP5C01 real-time clock (ports 0xB4/0xB5)
//!
//! Port 0xB4 selects one of 16 registers; port 0xB5 reads or writes it as a
//! 4-bit value (reads come back with the high nibble set). Registers 0-12 are
//! banked:
//!
//! - block 0: time and date as BCD digits
//! - block 1: alarm, 12/24 hour select (reg 10) and leap year counter (reg 11)
//! - blocks 2 and 3: battery-backed RAM holding the BIOS settings
//!
//! Register 13 picks the block and enables the timer, 14 is the test
//! register and 15 resets the alarm and the sub-second divider.
//!
//! The clock powers on at 1980-01-01 00:00:00 and counts emulated CPU
//! cycles, never host time.

use serde::{Deserialize, Serialize};

use emu_core::apu::timing::CPU_CLOCK_HZ;
use emu_core::logging::{log, LogCategory, LogLevel};

pub const REGISTERS: usize = 13;
pub const BLOCKS: usize = 4;

const MODE: u8 = 13;
const TEST: u8 = 14;
const RESET: u8 = 15;

const MODE_BLOCK: u8 = 0x03;
const MODE_TIMER_ENABLE: u8 = 0x08;
const RESET_ALARM: u8 = 0x01;
const RESET_DIVIDER: u8 = 0x02;

// block 0, low digit of each pair
const SECONDS: usize = 0;
const MINUTES: usize = 2;
const HOURS: usize = 4;
const WEEKDAY: usize = 6;
const DAY: usize = 7;
const MONTH: usize = 9;
const YEAR: usize = 11;

// block 1
const ALARM: std::ops::Range<usize> = 2..9;
const HOUR_MODE: usize = 10;
const LEAP_YEAR: usize = 11;

/// Implemented bits of the time and alarm registers
const MASKS: [[u8; REGISTERS]; 2] = [
    [0x0F, 0x07, 0x0F, 0x07, 0x0F, 0x03, 0x07, 0x0F, 0x03, 0x0F, 0x01, 0x0F, 0x0F],
    [0x00, 0x00, 0x0F, 0x07, 0x0F, 0x03, 0x07, 0x0F, 0x03, 0x00, 0x01, 0x03, 0x00],
];

fn mask(block: usize, index: usize) -> u8 {
    MASKS.get(block).map_or(0x0F, |masks| masks[index])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcState {
    pub index: u8,
    pub mode: u8,
    pub test: u8,
    pub registers: [[u8; REGISTERS]; BLOCKS],
    /// CPU cycles into the current second
    pub cycles: u32,
}

/// 1980-01-01 00:00:00, a Tuesday, 24 hour mode, leap year
fn power_on_registers() -> [[u8; REGISTERS]; BLOCKS] {
    let mut registers = [[0; REGISTERS]; BLOCKS];
    registers[0][WEEKDAY] = 2;
    registers[0][DAY] = 1;
    registers[0][MONTH] = 1;
    registers[1][HOUR_MODE] = 1;
    registers
}

#[derive(Debug, Clone)]
pub struct Rtc {
    index: u8,
    mode: u8,
    test: u8,
    registers: [[u8; REGISTERS]; BLOCKS],
    cycles: u32,
}

impl Rtc {
    pub fn new() -> Self {
        Self {
            index: 0,
            mode: MODE_TIMER_ENABLE,
            test: 0,
            registers: power_on_registers(),
            cycles: 0,
        }
    }

    fn block(&self) -> usize {
        (self.mode & MODE_BLOCK) as usize
    }

    /// Port 0xB4
    pub fn select(&mut self, val: u8) {
        self.index = val & 0x0F;
    }

    /// Port 0xB5 read
    pub fn read(&self) -> u8 {
        let value = match self.index {
            MODE => self.mode,
            TEST | RESET => 0x0F,
            index => {
                let (block, index) = (self.block(), index as usize);
                self.registers[block][index] & mask(block, index)
            }
        };
        0xF0 | value
    }

    /// Port 0xB5 write
    pub fn write(&mut self, val: u8) {
        let val = val & 0x0F;
        match self.index {
            MODE => self.mode = val,
            TEST => self.test = val,
            RESET => {
                if val & RESET_ALARM != 0 {
                    self.registers[1][ALARM].fill(0);
                }
                if val & RESET_DIVIDER != 0 {
                    self.cycles = 0;
                }
            }
            index => {
                let (block, index) = (self.block(), index as usize);
                self.registers[block][index] = val & mask(block, index);
            }
        }
        log(LogCategory::Bus, LogLevel::Trace, || {
            format!("RTC register {} <- {:X}", self.index, val)
        });
    }

    /// Count CPU cycles; every full second advances the time when the timer
    /// is enabled
    pub fn advance(&mut self, cycles: u32) {
        self.cycles += cycles;
        while self.cycles >= CPU_CLOCK_HZ {
            self.cycles -= CPU_CLOCK_HZ;
            if self.mode & MODE_TIMER_ENABLE != 0 {
                self.tick_second();
            }
        }
    }

    fn digits(&self, at: usize) -> u8 {
        let time = &self.registers[0];
        time[at] + 10 * time[at + 1]
    }

    fn set_digits(&mut self, at: usize, value: u8) {
        self.registers[0][at] = value % 10;
        self.registers[0][at + 1] = value / 10;
    }

    fn days_in_month(&self) -> u8 {
        match self.digits(MONTH) {
            2 if self.registers[1][LEAP_YEAR] == 0 => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    fn tick_second(&mut self) {
        let seconds = self.digits(SECONDS) + 1;
        if seconds < 60 {
            self.set_digits(SECONDS, seconds);
            return;
        }
        self.set_digits(SECONDS, 0);

        let minutes = self.digits(MINUTES) + 1;
        if minutes < 60 {
            self.set_digits(MINUTES, minutes);
            return;
        }
        self.set_digits(MINUTES, 0);

        if self.tick_hour() {
            self.tick_day();
        }
    }

    /// Returns true when the day rolls over
    fn tick_hour(&mut self) -> bool {
        if self.registers[1][HOUR_MODE] & 1 != 0 {
            let hours = self.digits(HOURS) + 1;
            if hours < 24 {
                self.set_digits(HOURS, hours);
                return false;
            }
            self.set_digits(HOURS, 0);
            return true;
        }

        // 12 hour mode: hours 0-11, bit 1 of the tens digit is PM
        let time = &mut self.registers[0];
        let pm = time[HOURS + 1] & 0x02;
        let hours = time[HOURS] + 10 * (time[HOURS + 1] & 0x01) + 1;
        if hours < 12 {
            time[HOURS] = hours % 10;
            time[HOURS + 1] = pm | hours / 10;
            return false;
        }
        time[HOURS] = 0;
        time[HOURS + 1] = pm ^ 0x02;
        pm != 0
    }

    fn tick_day(&mut self) {
        self.registers[0][WEEKDAY] = (self.registers[0][WEEKDAY] + 1) % 7;

        let day = self.digits(DAY) + 1;
        if day <= self.days_in_month() {
            self.set_digits(DAY, day);
            return;
        }
        self.set_digits(DAY, 1);

        let month = self.digits(MONTH) + 1;
        if month <= 12 {
            self.set_digits(MONTH, month);
            return;
        }
        self.set_digits(MONTH, 1);

        let year = (self.digits(YEAR) + 1) % 100;
        self.set_digits(YEAR, year);
        self.registers[1][LEAP_YEAR] = (self.registers[1][LEAP_YEAR] + 1) & 0x03;
    }

    /// Register select and mode back to power-on; time and RAM are battery
    /// backed and keep running
    pub fn reset(&mut self) {
        self.index = 0;
        self.mode = MODE_TIMER_ENABLE;
        self.test = 0;
    }

    pub fn state(&self) -> RtcState {
        RtcState {
            index: self.index,
            mode: self.mode,
            test: self.test,
            registers: self.registers,
            cycles: self.cycles,
        }
    }

    pub fn restore_state(&mut self, state: &RtcState) {
        self.index = state.index & 0x0F;
        self.mode = state.mode & 0x0F;
        self.test = state.test & 0x0F;
        for (block, registers) in state.registers.iter().enumerate() {
            for (index, &value) in registers.iter().enumerate() {
                self.registers[block][index] = value & mask(block, index);
            }
        }
        self.cycles = state.cycles % CPU_CLOCK_HZ;
    }
}

impl Default for Rtc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poke(rtc: &mut Rtc, index: u8, val: u8) {
        rtc.select(index);
        rtc.write(val);
    }

    fn peek(rtc: &mut Rtc, index: u8) -> u8 {
        rtc.select(index);
        rtc.read() & 0x0F
    }

    /// Time of day as (hours, minutes, seconds) decoded from block 0
    fn clock(rtc: &mut Rtc) -> (u8, u8, u8) {
        poke(rtc, MODE, MODE_TIMER_ENABLE);
        let pair = |rtc: &mut Rtc, at: u8| peek(rtc, at) + 10 * peek(rtc, at + 1);
        (pair(rtc, 4), pair(rtc, 2), pair(rtc, 0))
    }

    fn date(rtc: &mut Rtc) -> (u8, u8, u8) {
        poke(rtc, MODE, MODE_TIMER_ENABLE);
        let pair = |rtc: &mut Rtc, at: u8| peek(rtc, at) + 10 * peek(rtc, at + 1);
        (pair(rtc, 11), pair(rtc, 9), pair(rtc, 7))
    }

    /// Write a BCD pair into block 0
    fn set_pair(rtc: &mut Rtc, at: u8, value: u8) {
        poke(rtc, MODE, 0);
        poke(rtc, at, value % 10);
        poke(rtc, at + 1, value / 10);
    }

    #[test]
    fn test_power_on_date() {
        let mut rtc = Rtc::new();
        assert_eq!(date(&mut rtc), (0, 1, 1));
        assert_eq!(clock(&mut rtc), (0, 0, 0));
        assert_eq!(peek(&mut rtc, 6), 2);
        rtc.select(0);
        assert_eq!(rtc.read() & 0xF0, 0xF0);
    }

    #[test]
    fn test_counts_cpu_seconds() {
        let mut rtc = Rtc::new();
        rtc.advance(CPU_CLOCK_HZ - 1);
        assert_eq!(clock(&mut rtc), (0, 0, 0));
        rtc.advance(1);
        assert_eq!(clock(&mut rtc), (0, 0, 1));
        rtc.advance(CPU_CLOCK_HZ * 60);
        assert_eq!(clock(&mut rtc), (0, 1, 1));
    }

    #[test]
    fn test_stopped_timer_holds_time() {
        let mut rtc = Rtc::new();
        poke(&mut rtc, MODE, 0);
        rtc.advance(CPU_CLOCK_HZ * 5);
        assert_eq!(clock(&mut rtc), (0, 0, 0));
    }

    #[test]
    fn test_leap_year_february() {
        let mut rtc = Rtc::new();
        set_pair(&mut rtc, 9, 2);
        set_pair(&mut rtc, 7, 28);
        set_pair(&mut rtc, 4, 23);
        set_pair(&mut rtc, 2, 59);
        set_pair(&mut rtc, 0, 59);
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE);
        rtc.advance(CPU_CLOCK_HZ);
        assert_eq!(date(&mut rtc), (0, 2, 29));
        assert_eq!(clock(&mut rtc), (0, 0, 0));

        // 1981 is not a leap year
        poke(&mut rtc, MODE, 1);
        poke(&mut rtc, 11, 1);
        set_pair(&mut rtc, 7, 28);
        set_pair(&mut rtc, 4, 23);
        set_pair(&mut rtc, 2, 59);
        set_pair(&mut rtc, 0, 59);
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE);
        rtc.advance(CPU_CLOCK_HZ);
        assert_eq!(date(&mut rtc), (0, 3, 1));
    }

    #[test]
    fn test_new_year_bumps_leap_counter() {
        let mut rtc = Rtc::new();
        set_pair(&mut rtc, 9, 12);
        set_pair(&mut rtc, 7, 31);
        set_pair(&mut rtc, 4, 23);
        set_pair(&mut rtc, 2, 59);
        set_pair(&mut rtc, 0, 59);
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE);
        rtc.advance(CPU_CLOCK_HZ);
        assert_eq!(date(&mut rtc), (1, 1, 1));
        poke(&mut rtc, MODE, 1);
        assert_eq!(peek(&mut rtc, 11), 1);
    }

    #[test]
    fn test_twelve_hour_mode_flips_pm() {
        let mut rtc = Rtc::new();
        poke(&mut rtc, MODE, 1);
        poke(&mut rtc, 10, 0);
        // 11:59:59 AM
        set_pair(&mut rtc, 4, 11);
        set_pair(&mut rtc, 2, 59);
        set_pair(&mut rtc, 0, 59);
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE);
        rtc.advance(CPU_CLOCK_HZ);
        assert_eq!(peek(&mut rtc, 5), 0x02);
        assert_eq!(peek(&mut rtc, 4), 0);
        assert_eq!(date(&mut rtc), (0, 1, 1));
    }

    #[test]
    fn test_ram_blocks_keep_nibbles() {
        let mut rtc = Rtc::new();
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE | 2);
        poke(&mut rtc, 0, 0xA);
        poke(&mut rtc, 12, 0x3F);
        assert_eq!(peek(&mut rtc, 0), 0xA);
        assert_eq!(peek(&mut rtc, 12), 0xF);
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE | 3);
        assert_eq!(peek(&mut rtc, 0), 0);
        // unimplemented time bits read back as 0
        poke(&mut rtc, MODE, 0);
        poke(&mut rtc, 1, 0xF);
        assert_eq!(peek(&mut rtc, 1), 0x7);
    }

    #[test]
    fn test_reset_register_clears_alarm() {
        let mut rtc = Rtc::new();
        poke(&mut rtc, MODE, 1);
        poke(&mut rtc, 3, 5);
        poke(&mut rtc, RESET, RESET_ALARM);
        assert_eq!(peek(&mut rtc, 3), 0);
        assert_eq!(peek(&mut rtc, 10), 1);
    }

    #[test]
    fn test_reset_keeps_time_and_ram() {
        let mut rtc = Rtc::new();
        poke(&mut rtc, MODE, 2);
        poke(&mut rtc, 4, 9);
        rtc.advance(CPU_CLOCK_HZ * 3);
        assert_eq!(clock(&mut rtc), (0, 0, 0));
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE);
        rtc.advance(CPU_CLOCK_HZ * 3);
        rtc.reset();
        assert_eq!(clock(&mut rtc), (0, 0, 3));
        poke(&mut rtc, MODE, 2);
        assert_eq!(peek(&mut rtc, 4), 9);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut rtc = Rtc::new();
        rtc.advance(CPU_CLOCK_HZ * 75 + 1234);
        poke(&mut rtc, MODE, MODE_TIMER_ENABLE | 2);
        poke(&mut rtc, 7, 0xC);
        let state = rtc.state();

        let mut other = Rtc::new();
        other.restore_state(&state);
        assert_eq!(other.state(), state);
        other.advance(CPU_CLOCK_HZ - 1234);
        assert_eq!(clock(&mut other), (0, 1, 16));
    }
}
