//! Zilog Z80 CPU core implementation
//!
//! Covers the unprefixed table, the CB bit/rotate group and the commonly used
//! ED instructions (interrupt modes, block transfers, 16-bit arithmetic and
//! port I/O through C). Index-register prefixes (DD/FD) and anything else that
//! is not decoded execute as no-ops and are reported under the Stubs log
//! category.

use serde::{Deserialize, Serialize};

use crate::logging::{log, LogCategory, LogLevel};

/// Memory interface trait for the Z80 CPU
pub trait MemoryZ80 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);

    /// Read from I/O port
    fn io_read(&mut self, port: u8) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write to I/O port
    fn io_write(&mut self, port: u8, val: u8) {
        let _ = (port, val);
    }
}

// Flag bit positions (in F register)
pub const FLAG_S: u8 = 0x80;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_C: u8 = 0x01;

/// Serializable snapshot of the register file and interrupt state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Z80Registers {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_prime: u16,
    pub bc_prime: u16,
    pub de_prime: u16,
    pub hl_prime: u16,
    pub ix: u16,
    pub iy: u16,
    pub i: u8,
    pub r: u8,
    pub sp: u16,
    pub pc: u16,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
    pub ei_delay: bool,
}

/// Zilog Z80 CPU state
#[derive(Debug)]
pub struct CpuZ80<M: MemoryZ80> {
    /// Main registers
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    /// Shadow registers (Z80 specific)
    pub a_prime: u8,
    pub f_prime: u8,
    pub b_prime: u8,
    pub c_prime: u8,
    pub d_prime: u8,
    pub e_prime: u8,
    pub h_prime: u8,
    pub l_prime: u8,

    /// Index registers (Z80 specific)
    pub ix: u16,
    pub iy: u16,

    /// Special registers
    pub i: u8, // Interrupt vector
    pub r: u8, // Memory refresh

    /// Stack pointer
    pub sp: u16,
    /// Program counter
    pub pc: u16,

    /// Interrupt flags
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8, // Interrupt mode (0, 1, or 2)
    /// Set by EI; interrupts are not accepted until the next instruction ends
    pub ei_delay: bool,

    /// State
    pub halted: bool,
    pub cycles: u64,

    /// Memory interface
    pub memory: M,
}

impl<M: MemoryZ80> CpuZ80<M> {
    /// Create a new Z80 CPU
    pub fn new(memory: M) -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_prime: 0,
            f_prime: 0,
            b_prime: 0,
            c_prime: 0,
            d_prime: 0,
            e_prime: 0,
            h_prime: 0,
            l_prime: 0,
            ix: 0,
            iy: 0,
            i: 0,
            r: 0,
            sp: 0,
            pc: 0,
            iff1: false,
            iff2: false,
            im: 0,
            ei_delay: false,
            halted: false,
            cycles: 0,
            memory,
        }
    }

    /// Reset the CPU
    pub fn reset(&mut self) {
        self.set_registers(&Z80Registers::default());
        self.cycles = 0;
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn set_bc(&mut self, val: u16) {
        [self.b, self.c] = val.to_be_bytes();
    }

    pub fn set_de(&mut self, val: u16) {
        [self.d, self.e] = val.to_be_bytes();
    }

    pub fn set_hl(&mut self, val: u16) {
        [self.h, self.l] = val.to_be_bytes();
    }

    pub fn set_af(&mut self, val: u16) {
        [self.a, self.f] = val.to_be_bytes();
    }

    /// Capture the register file.
    pub fn registers(&self) -> Z80Registers {
        Z80Registers {
            af: self.af(),
            bc: self.bc(),
            de: self.de(),
            hl: self.hl(),
            af_prime: u16::from_be_bytes([self.a_prime, self.f_prime]),
            bc_prime: u16::from_be_bytes([self.b_prime, self.c_prime]),
            de_prime: u16::from_be_bytes([self.d_prime, self.e_prime]),
            hl_prime: u16::from_be_bytes([self.h_prime, self.l_prime]),
            ix: self.ix,
            iy: self.iy,
            i: self.i,
            r: self.r,
            sp: self.sp,
            pc: self.pc,
            iff1: self.iff1,
            iff2: self.iff2,
            im: self.im,
            halted: self.halted,
            ei_delay: self.ei_delay,
        }
    }

    /// Replace the register file.
    pub fn set_registers(&mut self, regs: &Z80Registers) {
        self.set_af(regs.af);
        self.set_bc(regs.bc);
        self.set_de(regs.de);
        self.set_hl(regs.hl);
        [self.a_prime, self.f_prime] = regs.af_prime.to_be_bytes();
        [self.b_prime, self.c_prime] = regs.bc_prime.to_be_bytes();
        [self.d_prime, self.e_prime] = regs.de_prime.to_be_bytes();
        [self.h_prime, self.l_prime] = regs.hl_prime.to_be_bytes();
        self.ix = regs.ix;
        self.iy = regs.iy;
        self.i = regs.i;
        self.r = regs.r;
        self.sp = regs.sp;
        self.pc = regs.pc;
        self.iff1 = regs.iff1;
        self.iff2 = regs.iff2;
        self.im = regs.im;
        self.halted = regs.halted;
        self.ei_delay = regs.ei_delay;
    }

    /// Execute one instruction
    pub fn step(&mut self) -> u32 {
        self.ei_delay = false;
        let cycles = if self.halted {
            self.r = self.r.wrapping_add(1);
            4
        } else {
            let opcode = self.fetch();
            self.execute(opcode)
        };
        self.cycles += cycles as u64;
        cycles
    }

    /// Raise the maskable interrupt line.
    ///
    /// Returns the cycles spent accepting it, or 0 when interrupts are
    /// disabled (or EI has just executed).
    pub fn interrupt(&mut self) -> u32 {
        if !self.iff1 || self.ei_delay {
            return 0;
        }
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        self.r = self.r.wrapping_add(1);
        let pc = self.pc;
        self.push_u16(pc);
        let cycles = match self.im {
            2 => {
                let vector = u16::from_be_bytes([self.i, 0xFF]);
                self.pc = self.read_u16(vector);
                19
            }
            // IM 0 on MSX always sees RST 38h on the data bus
            _ => {
                self.pc = 0x0038;
                13
            }
        };
        log(LogCategory::CPU, LogLevel::Trace, || {
            format!("IRQ accepted (IM {}), vector {:04X}", self.im, self.pc)
        });
        self.cycles += cycles as u64;
        cycles
    }

    fn fetch(&mut self) -> u8 {
        let val = self.memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
        val
    }

    fn read_pc(&mut self) -> u8 {
        let val = self.memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn read_pc_u16(&mut self) -> u16 {
        let lo = self.read_pc();
        let hi = self.read_pc();
        u16::from_le_bytes([lo, hi])
    }

    fn read_u16(&self, addr: u16) -> u16 {
        let lo = self.memory.read(addr);
        let hi = self.memory.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn write_u16(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.memory.write(addr, lo);
        self.memory.write(addr.wrapping_add(1), hi);
    }

    fn push_u16(&mut self, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, hi);
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, lo);
    }

    fn pop_u16(&mut self) -> u16 {
        let val = self.read_u16(self.sp);
        self.sp = self.sp.wrapping_add(2);
        val
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    /// 8-bit register by encoding (B C D E H L (HL) A)
    fn reg(&self, idx: u8) -> u8 {
        match idx & 7 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => self.memory.read(self.hl()),
            _ => self.a,
        }
    }

    fn set_reg(&mut self, idx: u8, val: u8) {
        match idx & 7 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => self.memory.write(self.hl(), val),
            _ => self.a = val,
        }
    }

    /// 16-bit register pair by encoding (BC DE HL SP)
    fn pair(&self, idx: u8) -> u16 {
        match idx & 3 {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl(),
            _ => self.sp,
        }
    }

    fn set_pair(&mut self, idx: u8, val: u16) {
        match idx & 3 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    fn condition(&self, cc: u8) -> bool {
        match cc & 7 {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            3 => self.flag(FLAG_C),
            4 => !self.flag(FLAG_PV),
            5 => self.flag(FLAG_PV),
            6 => !self.flag(FLAG_S),
            _ => self.flag(FLAG_S),
        }
    }

    fn sz_flags(val: u8) -> u8 {
        let mut f = val & FLAG_S;
        if val == 0 {
            f |= FLAG_Z;
        }
        f
    }

    fn szp_flags(val: u8) -> u8 {
        let mut f = Self::sz_flags(val);
        if val.count_ones() % 2 == 0 {
            f |= FLAG_PV;
        }
        f
    }

    fn alu(&mut self, op: u8, val: u8) {
        let a = self.a;
        match op & 7 {
            // ADD / ADC
            0 | 1 => {
                let carry = (op & 7 == 1 && self.flag(FLAG_C)) as u8;
                let result = a.wrapping_add(val).wrapping_add(carry);
                let wide = a as u16 + val as u16 + carry as u16;
                let mut f = Self::sz_flags(result);
                if (a & 0x0F) + (val & 0x0F) + carry > 0x0F {
                    f |= FLAG_H;
                }
                if (a ^ val) & 0x80 == 0 && (a ^ result) & 0x80 != 0 {
                    f |= FLAG_PV;
                }
                if wide > 0xFF {
                    f |= FLAG_C;
                }
                self.a = result;
                self.f = f;
            }
            // SUB / SBC / CP
            2 | 3 | 7 => {
                let carry = (op & 7 == 3 && self.flag(FLAG_C)) as u8;
                let result = a.wrapping_sub(val).wrapping_sub(carry);
                let mut f = Self::sz_flags(result) | FLAG_N;
                if (a & 0x0F) < (val & 0x0F) + carry {
                    f |= FLAG_H;
                }
                if (a ^ val) & 0x80 != 0 && (a ^ result) & 0x80 != 0 {
                    f |= FLAG_PV;
                }
                if (a as u16) < val as u16 + carry as u16 {
                    f |= FLAG_C;
                }
                self.f = f;
                if op & 7 != 7 {
                    self.a = result;
                }
            }
            4 => {
                self.a &= val;
                self.f = Self::szp_flags(self.a) | FLAG_H;
            }
            5 => {
                self.a ^= val;
                self.f = Self::szp_flags(self.a);
            }
            _ => {
                self.a |= val;
                self.f = Self::szp_flags(self.a);
            }
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        let mut f = (self.f & FLAG_C) | Self::sz_flags(result);
        if val & 0x0F == 0x0F {
            f |= FLAG_H;
        }
        if val == 0x7F {
            f |= FLAG_PV;
        }
        self.f = f;
        result
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        let mut f = (self.f & FLAG_C) | Self::sz_flags(result) | FLAG_N;
        if val & 0x0F == 0 {
            f |= FLAG_H;
        }
        if val == 0x80 {
            f |= FLAG_PV;
        }
        self.f = f;
        result
    }

    fn add16(&mut self, lhs: u16, rhs: u16) -> u16 {
        let wide = lhs as u32 + rhs as u32;
        let mut f = self.f & (FLAG_S | FLAG_Z | FLAG_PV);
        if (lhs & 0x0FFF) + (rhs & 0x0FFF) > 0x0FFF {
            f |= FLAG_H;
        }
        if wide > 0xFFFF {
            f |= FLAG_C;
        }
        self.f = f;
        wide as u16
    }

    fn adc_sbc16(&mut self, rhs: u16, subtract: bool) {
        let lhs = self.hl();
        let carry = self.flag(FLAG_C) as u32;
        let (result, mut f) = if subtract {
            let result = (lhs as u32).wrapping_sub(rhs as u32).wrapping_sub(carry);
            let mut f = FLAG_N;
            if (lhs & 0x0FFF) < (rhs & 0x0FFF) + carry as u16 {
                f |= FLAG_H;
            }
            if (lhs ^ rhs) & 0x8000 != 0 && (lhs ^ result as u16) & 0x8000 != 0 {
                f |= FLAG_PV;
            }
            if result > 0xFFFF {
                f |= FLAG_C;
            }
            (result as u16, f)
        } else {
            let result = lhs as u32 + rhs as u32 + carry;
            let mut f = 0;
            if (lhs & 0x0FFF) + (rhs & 0x0FFF) + carry as u16 > 0x0FFF {
                f |= FLAG_H;
            }
            if (lhs ^ rhs) & 0x8000 == 0 && (lhs ^ result as u16) & 0x8000 != 0 {
                f |= FLAG_PV;
            }
            if result > 0xFFFF {
                f |= FLAG_C;
            }
            (result as u16, f)
        };
        if result == 0 {
            f |= FLAG_Z;
        }
        f |= (result >> 8) as u8 & FLAG_S;
        self.f = f;
        self.set_hl(result);
    }

    fn daa(&mut self) {
        let a = self.a;
        let mut diff = 0u8;
        let mut carry = self.flag(FLAG_C);
        if self.flag(FLAG_H) || a & 0x0F > 9 {
            diff |= 0x06;
        }
        if carry || a > 0x99 {
            diff |= 0x60;
            carry = true;
        }
        let subtract = self.flag(FLAG_N);
        let result = if subtract {
            a.wrapping_sub(diff)
        } else {
            a.wrapping_add(diff)
        };
        let half = if subtract {
            self.flag(FLAG_H) && a & 0x0F < 6
        } else {
            a & 0x0F > 9
        };
        let mut f = Self::szp_flags(result) | (self.f & FLAG_N);
        if half {
            f |= FLAG_H;
        }
        if carry {
            f |= FLAG_C;
        }
        self.a = result;
        self.f = f;
    }

    fn jr(&mut self, taken: bool) -> u32 {
        let offset = self.read_pc() as i8;
        if taken {
            self.pc = self.pc.wrapping_add(offset as u16);
            12
        } else {
            7
        }
    }

    fn stub(&self, prefix: &str, opcode: u8) {
        let pc = self.pc;
        log(LogCategory::Stubs, LogLevel::Debug, || {
            format!(
                "Z80: unimplemented opcode {}{:02X} near {:04X}",
                prefix,
                opcode,
                pc.wrapping_sub(1)
            )
        });
    }

    fn execute(&mut self, opcode: u8) -> u32 {
        match opcode {
            0x00 => 4, // NOP
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.read_pc_u16();
                self.set_pair(opcode >> 4, val);
                10
            }
            0x02 => {
                self.memory.write(self.bc(), self.a);
                7
            }
            0x12 => {
                self.memory.write(self.de(), self.a);
                7
            }
            0x0A => {
                self.a = self.memory.read(self.bc());
                7
            }
            0x1A => {
                self.a = self.memory.read(self.de());
                7
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let idx = opcode >> 4;
                self.set_pair(idx, self.pair(idx).wrapping_add(1));
                6
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let idx = opcode >> 4;
                self.set_pair(idx, self.pair(idx).wrapping_sub(1));
                6
            }
            // INC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let idx = opcode >> 3;
                let val = self.inc8(self.reg(idx));
                self.set_reg(idx, val);
                if idx & 7 == 6 {
                    11
                } else {
                    4
                }
            }
            // DEC r
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let idx = opcode >> 3;
                let val = self.dec8(self.reg(idx));
                self.set_reg(idx, val);
                if idx & 7 == 6 {
                    11
                } else {
                    4
                }
            }
            // LD r,n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let idx = opcode >> 3;
                let val = self.read_pc();
                self.set_reg(idx, val);
                if idx & 7 == 6 {
                    10
                } else {
                    7
                }
            }
            0x07 => {
                // RLCA
                let carry = self.a >> 7;
                self.a = self.a.rotate_left(1);
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | carry;
                4
            }
            0x0F => {
                // RRCA
                let carry = self.a & 1;
                self.a = self.a.rotate_right(1);
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | carry;
                4
            }
            0x17 => {
                // RLA
                let carry = self.a >> 7;
                self.a = (self.a << 1) | (self.f & FLAG_C);
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | carry;
                4
            }
            0x1F => {
                // RRA
                let carry = self.a & 1;
                self.a = (self.a >> 1) | ((self.f & FLAG_C) << 7);
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | carry;
                4
            }
            0x08 => {
                std::mem::swap(&mut self.a, &mut self.a_prime);
                std::mem::swap(&mut self.f, &mut self.f_prime);
                4
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let rhs = self.pair(opcode >> 4);
                let val = self.add16(self.hl(), rhs);
                self.set_hl(val);
                11
            }
            0x10 => {
                // DJNZ
                self.b = self.b.wrapping_sub(1);
                let taken = self.b != 0;
                self.jr(taken) + 1
            }
            0x18 => self.jr(true),
            0x20 | 0x28 | 0x30 | 0x38 => {
                let taken = self.condition((opcode >> 3) & 3);
                self.jr(taken)
            }
            0x22 => {
                let addr = self.read_pc_u16();
                self.write_u16(addr, self.hl());
                16
            }
            0x2A => {
                let addr = self.read_pc_u16();
                let val = self.read_u16(addr);
                self.set_hl(val);
                16
            }
            0x32 => {
                let addr = self.read_pc_u16();
                self.memory.write(addr, self.a);
                13
            }
            0x3A => {
                let addr = self.read_pc_u16();
                self.a = self.memory.read(addr);
                13
            }
            0x27 => {
                self.daa();
                4
            }
            0x2F => {
                self.a = !self.a;
                self.f |= FLAG_H | FLAG_N;
                4
            }
            0x37 => {
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | FLAG_C;
                4
            }
            0x3F => {
                let carry = self.f & FLAG_C;
                let half = if carry != 0 { FLAG_H } else { 0 };
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV)) | half | (carry ^ FLAG_C);
                4
            }
            0x76 => {
                self.halted = true;
                4
            } // HALT
            // LD r,r'
            0x40..=0x7F => {
                let val = self.reg(opcode);
                self.set_reg(opcode >> 3, val);
                if opcode & 7 == 6 || (opcode >> 3) & 7 == 6 {
                    7
                } else {
                    4
                }
            }
            // ALU A,r
            0x80..=0xBF => {
                let val = self.reg(opcode);
                self.alu(opcode >> 3, val);
                if opcode & 7 == 6 {
                    7
                } else {
                    4
                }
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition(opcode >> 3) {
                    self.pc = self.pop_u16();
                    11
                } else {
                    5
                }
            }
            0xC9 => {
                self.pc = self.pop_u16();
                10
            }
            0xC1 | 0xD1 | 0xE1 => {
                let val = self.pop_u16();
                self.set_pair((opcode >> 4) & 3, val);
                10
            }
            0xF1 => {
                let val = self.pop_u16();
                self.set_af(val);
                10
            }
            0xC5 | 0xD5 | 0xE5 => {
                let val = self.pair((opcode >> 4) & 3);
                self.push_u16(val);
                11
            }
            0xF5 => {
                let val = self.af();
                self.push_u16(val);
                11
            }
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let addr = self.read_pc_u16();
                if self.condition(opcode >> 3) {
                    self.pc = addr;
                }
                10
            }
            0xC3 => {
                self.pc = self.read_pc_u16();
                10
            }
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let addr = self.read_pc_u16();
                if self.condition(opcode >> 3) {
                    let ret = self.pc;
                    self.push_u16(ret);
                    self.pc = addr;
                    17
                } else {
                    10
                }
            }
            0xCD => {
                let addr = self.read_pc_u16();
                let ret = self.pc;
                self.push_u16(ret);
                self.pc = addr;
                17
            }
            // ALU A,n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.read_pc();
                self.alu(opcode >> 3, val);
                7
            }
            // RST
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let ret = self.pc;
                self.push_u16(ret);
                self.pc = (opcode & 0x38) as u16;
                11
            }
            0xCB => {
                let op = self.fetch();
                self.execute_cb(op)
            }
            0xD3 => {
                let port = self.read_pc();
                self.memory.io_write(port, self.a);
                11
            }
            0xDB => {
                let port = self.read_pc();
                self.a = self.memory.io_read(port);
                11
            }
            0xD9 => {
                std::mem::swap(&mut self.b, &mut self.b_prime);
                std::mem::swap(&mut self.c, &mut self.c_prime);
                std::mem::swap(&mut self.d, &mut self.d_prime);
                std::mem::swap(&mut self.e, &mut self.e_prime);
                std::mem::swap(&mut self.h, &mut self.h_prime);
                std::mem::swap(&mut self.l, &mut self.l_prime);
                4
            }
            0xE3 => {
                let val = self.read_u16(self.sp);
                self.write_u16(self.sp, self.hl());
                self.set_hl(val);
                19
            }
            0xE9 => {
                self.pc = self.hl();
                4
            }
            0xEB => {
                let de = self.de();
                let hl = self.hl();
                self.set_de(hl);
                self.set_hl(de);
                4
            }
            0xF3 => {
                self.iff1 = false;
                self.iff2 = false;
                4
            } // DI
            0xFB => {
                self.iff1 = true;
                self.iff2 = true;
                self.ei_delay = true;
                4
            } // EI
            0xF9 => {
                self.sp = self.hl();
                6
            }
            0xED => {
                let op = self.fetch();
                self.execute_ed(op)
            }
            // DD / FD index prefixes
            _ => {
                self.stub("", opcode);
                4
            }
        }
    }

    fn execute_cb(&mut self, op: u8) -> u32 {
        let idx = op & 7;
        let y = (op >> 3) & 7;
        let val = self.reg(idx);
        let memory_operand = idx == 6;
        match op >> 6 {
            0 => {
                let carry_in = self.f & FLAG_C;
                let (result, carry) = match y {
                    0 => (val.rotate_left(1), val >> 7),
                    1 => (val.rotate_right(1), val & 1),
                    2 => ((val << 1) | carry_in, val >> 7),
                    3 => ((val >> 1) | (carry_in << 7), val & 1),
                    4 => (val << 1, val >> 7),
                    5 => ((val >> 1) | (val & 0x80), val & 1),
                    6 => ((val << 1) | 1, val >> 7),
                    _ => (val >> 1, val & 1),
                };
                self.f = Self::szp_flags(result) | carry;
                self.set_reg(idx, result);
                if memory_operand {
                    15
                } else {
                    8
                }
            }
            1 => {
                let set = val & (1 << y) != 0;
                let mut f = (self.f & FLAG_C) | FLAG_H;
                if !set {
                    f |= FLAG_Z | FLAG_PV;
                }
                if set && y == 7 {
                    f |= FLAG_S;
                }
                self.f = f;
                if memory_operand {
                    12
                } else {
                    8
                }
            }
            2 => {
                self.set_reg(idx, val & !(1 << y));
                if memory_operand {
                    15
                } else {
                    8
                }
            }
            _ => {
                self.set_reg(idx, val | (1 << y));
                if memory_operand {
                    15
                } else {
                    8
                }
            }
        }
    }

    fn execute_ed(&mut self, op: u8) -> u32 {
        match op {
            // IN r,(C)
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let val = self.memory.io_read(self.c);
                self.f = (self.f & FLAG_C) | Self::szp_flags(val);
                let idx = (op >> 3) & 7;
                if idx != 6 {
                    self.set_reg(idx, val);
                }
                12
            }
            // OUT (C),r
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let idx = (op >> 3) & 7;
                let val = if idx == 6 { 0 } else { self.reg(idx) };
                self.memory.io_write(self.c, val);
                12
            }
            0x42 | 0x52 | 0x62 | 0x72 => {
                let rhs = self.pair(op >> 4);
                self.adc_sbc16(rhs, true);
                15
            }
            0x4A | 0x5A | 0x6A | 0x7A => {
                let rhs = self.pair(op >> 4);
                self.adc_sbc16(rhs, false);
                15
            }
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.read_pc_u16();
                let val = self.pair(op >> 4);
                self.write_u16(addr, val);
                20
            }
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.read_pc_u16();
                let val = self.read_u16(addr);
                self.set_pair(op >> 4, val);
                20
            }
            0x44 => {
                // NEG
                let val = self.a;
                self.a = 0;
                self.alu(2, val);
                8
            }
            0x45 | 0x4D => {
                // RETN / RETI
                self.iff1 = self.iff2;
                self.pc = self.pop_u16();
                14
            }
            0x46 | 0x66 => {
                self.im = 0;
                8
            }
            0x56 | 0x76 => {
                self.im = 1;
                8
            }
            0x5E | 0x7E => {
                self.im = 2;
                8
            }
            0x47 => {
                self.i = self.a;
                9
            }
            0x4F => {
                self.r = self.a;
                9
            }
            0x57 | 0x5F => {
                self.a = if op == 0x57 { self.i } else { self.r };
                let mut f = (self.f & FLAG_C) | Self::sz_flags(self.a);
                if self.iff2 {
                    f |= FLAG_PV;
                }
                self.f = f;
                9
            }
            // LDI / LDD / LDIR / LDDR
            0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                let val = self.memory.read(self.hl());
                self.memory.write(self.de(), val);
                let step: u16 = if op & 0x08 == 0 { 1 } else { 0xFFFF };
                self.set_hl(self.hl().wrapping_add(step));
                self.set_de(self.de().wrapping_add(step));
                let bc = self.bc().wrapping_sub(1);
                self.set_bc(bc);
                self.f &= FLAG_S | FLAG_Z | FLAG_C;
                if bc != 0 {
                    self.f |= FLAG_PV;
                }
                if op & 0x10 != 0 && bc != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
            // INI / IND / INIR / INDR
            0xA2 | 0xAA | 0xB2 | 0xBA => {
                let val = self.memory.io_read(self.c);
                self.memory.write(self.hl(), val);
                let step: u16 = if op & 0x08 == 0 { 1 } else { 0xFFFF };
                self.set_hl(self.hl().wrapping_add(step));
                self.block_io_tail(op)
            }
            // OUTI / OUTD / OTIR / OTDR
            0xA3 | 0xAB | 0xB3 | 0xBB => {
                let val = self.memory.read(self.hl());
                self.memory.io_write(self.c, val);
                let step: u16 = if op & 0x08 == 0 { 1 } else { 0xFFFF };
                self.set_hl(self.hl().wrapping_add(step));
                self.block_io_tail(op)
            }
            _ => {
                self.stub("ED", op);
                8
            }
        }
    }

    fn block_io_tail(&mut self, op: u8) -> u32 {
        self.b = self.b.wrapping_sub(1);
        self.f = Self::sz_flags(self.b) | FLAG_N | (self.f & FLAG_C);
        if op & 0x10 != 0 && self.b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }
}

impl<M: MemoryZ80> crate::Cpu for CpuZ80<M> {
    fn reset(&mut self) {
        self.reset();
    }

    fn step(&mut self) -> u32 {
        self.step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ArrayMemory {
        ram: Vec<u8>,
        ports: [u8; 256],
        out_log: Vec<(u8, u8)>,
    }

    impl MemoryZ80 for ArrayMemory {
        fn read(&self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }

        fn write(&mut self, addr: u16, val: u8) {
            self.ram[addr as usize] = val;
        }

        fn io_read(&mut self, port: u8) -> u8 {
            self.ports[port as usize]
        }

        fn io_write(&mut self, port: u8, val: u8) {
            self.out_log.push((port, val));
        }
    }

    fn make_cpu(program: &[u8]) -> CpuZ80<ArrayMemory> {
        let mut ram = vec![0; 0x10000];
        ram[..program.len()].copy_from_slice(program);
        CpuZ80::new(ArrayMemory {
            ram,
            ports: [0xFF; 256],
            out_log: Vec::new(),
        })
    }

    #[test]
    fn test_nop() {
        let mut cpu = make_cpu(&[0x00]);
        let cycles = cpu.step();
        assert_eq!(cycles, 4);
        assert_eq!(cpu.pc, 1);
        assert_eq!(cpu.cycles, 4);
    }

    #[test]
    fn test_ld_rr_nn_and_memory() {
        // LD HL,0x8000 ; LD A,0x5A ; LD (HL),A ; LD B,(HL)
        let mut cpu = make_cpu(&[0x21, 0x00, 0x80, 0x3E, 0x5A, 0x77, 0x46]);
        assert_eq!(cpu.step(), 10);
        assert_eq!(cpu.hl(), 0x8000);
        assert_eq!(cpu.step(), 7);
        assert_eq!(cpu.step(), 7);
        assert_eq!(cpu.memory.ram[0x8000], 0x5A);
        cpu.step();
        assert_eq!(cpu.b, 0x5A);
    }

    #[test]
    fn test_inc_dec_flags() {
        // INC A ; DEC B
        let mut cpu = make_cpu(&[0x3C, 0x05]);
        cpu.a = 0xFF;
        cpu.b = 0x01;
        cpu.step();
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag(FLAG_Z));
        assert!(cpu.flag(FLAG_H));
        cpu.step();
        assert_eq!(cpu.b, 0x00);
        assert!(cpu.flag(FLAG_Z));
        assert!(cpu.flag(FLAG_N));
    }

    #[test]
    fn test_xor_a_and_arithmetic() {
        // XOR A ; ADD A,0x80 ; ADD A,0x80 ; CP 0x00
        let mut cpu = make_cpu(&[0xAF, 0xC6, 0x80, 0xC6, 0x80, 0xFE, 0x00]);
        cpu.a = 0x33;
        cpu.step();
        assert_eq!(cpu.a, 0);
        assert!(cpu.flag(FLAG_Z));
        assert!(cpu.flag(FLAG_PV));
        cpu.step();
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.flag(FLAG_S));
        cpu.step();
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag(FLAG_C));
        assert!(cpu.flag(FLAG_PV));
        cpu.step();
        assert!(cpu.flag(FLAG_Z));
        assert_eq!(cpu.a, 0x00);
    }

    #[test]
    fn test_djnz_loop() {
        // LD B,3 ; loop: INC A ; DJNZ loop ; HALT
        let mut cpu = make_cpu(&[0x06, 0x03, 0x3C, 0x10, 0xFD, 0x76]);
        for _ in 0..16 {
            cpu.step();
        }
        assert_eq!(cpu.a, 3);
        assert_eq!(cpu.b, 0);
        assert!(cpu.halted);
    }

    #[test]
    fn test_call_ret_and_stack() {
        // LD SP,0xF000 ; CALL 0x0010 ; HALT ... 0x10: LD A,7 ; RET
        let mut cpu = make_cpu(&[0x31, 0x00, 0xF0, 0xCD, 0x10, 0x00, 0x76]);
        cpu.memory.ram[0x10] = 0x3E;
        cpu.memory.ram[0x11] = 0x07;
        cpu.memory.ram[0x12] = 0xC9;
        cpu.step();
        assert_eq!(cpu.step(), 17);
        assert_eq!(cpu.pc, 0x0010);
        assert_eq!(cpu.sp, 0xEFFE);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.pc, 0x0006);
        assert_eq!(cpu.sp, 0xF000);
        assert_eq!(cpu.a, 7);
    }

    #[test]
    fn test_port_io() {
        // LD A,0x42 ; OUT (0x98),A ; IN A,(0x99)
        let mut cpu = make_cpu(&[0x3E, 0x42, 0xD3, 0x98, 0xDB, 0x99]);
        cpu.memory.ports[0x99] = 0x9F;
        cpu.step();
        cpu.step();
        assert_eq!(cpu.memory.out_log, vec![(0x98, 0x42)]);
        cpu.step();
        assert_eq!(cpu.a, 0x9F);
    }

    #[test]
    fn test_otir_block_output() {
        // LD HL,0x100 ; LD BC,0x0398 ; OTIR
        let mut cpu = make_cpu(&[0x21, 0x00, 0x01, 0x01, 0x98, 0x03, 0xED, 0xB3]);
        cpu.memory.ram[0x100..0x103].copy_from_slice(&[1, 2, 3]);
        for _ in 0..5 {
            cpu.step();
        }
        assert_eq!(cpu.memory.out_log, vec![(0x98, 1), (0x98, 2), (0x98, 3)]);
        assert_eq!(cpu.b, 0);
        assert_eq!(cpu.pc, 8);
    }

    #[test]
    fn test_im1_interrupt_wakes_halt() {
        // IM 1 ; EI ; HALT
        let mut cpu = make_cpu(&[0xED, 0x56, 0xFB, 0x76]);
        cpu.sp = 0xF000;
        cpu.step();
        assert_eq!(cpu.im, 1);
        cpu.step();
        // EI shadow: not accepted right after EI
        assert_eq!(cpu.interrupt(), 0);
        cpu.step();
        assert!(cpu.halted);
        assert_eq!(cpu.interrupt(), 13);
        assert!(!cpu.halted);
        assert_eq!(cpu.pc, 0x0038);
        assert!(!cpu.iff1);
        assert_eq!(cpu.read_u16(cpu.sp), 0x0004);
    }

    #[test]
    fn test_im2_interrupt_vector() {
        let mut cpu = make_cpu(&[]);
        cpu.sp = 0xF000;
        cpu.im = 2;
        cpu.i = 0x80;
        cpu.iff1 = true;
        cpu.memory.ram[0x80FF] = 0x34;
        cpu.memory.ram[0x8100] = 0x12;
        assert_eq!(cpu.interrupt(), 19);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn test_interrupt_ignored_when_disabled() {
        let mut cpu = make_cpu(&[0xF3]);
        cpu.iff1 = true;
        cpu.step();
        assert_eq!(cpu.interrupt(), 0);
        assert_eq!(cpu.pc, 1);
    }

    #[test]
    fn test_cb_bit_set_res() {
        // SET 3,B ; BIT 3,B ; RES 3,B ; BIT 3,B
        let mut cpu = make_cpu(&[0xCB, 0xD8, 0xCB, 0x58, 0xCB, 0x98, 0xCB, 0x58]);
        cpu.step();
        assert_eq!(cpu.b, 0x08);
        cpu.step();
        assert!(!cpu.flag(FLAG_Z));
        cpu.step();
        assert_eq!(cpu.b, 0x00);
        cpu.step();
        assert!(cpu.flag(FLAG_Z));
    }

    #[test]
    fn test_unknown_prefix_is_noop() {
        let mut cpu = make_cpu(&[0xDD, 0x00]);
        assert_eq!(cpu.step(), 4);
        assert_eq!(cpu.pc, 1);
    }

    #[test]
    fn test_register_snapshot_roundtrip() {
        let mut cpu = make_cpu(&[]);
        cpu.set_af(0x1234);
        cpu.set_hl(0xBEEF);
        cpu.ix = 0xFFFF;
        cpu.im = 2;
        cpu.halted = true;
        let regs = cpu.registers();

        let mut other = make_cpu(&[]);
        other.set_registers(&regs);
        assert_eq!(other.registers(), regs);
        assert_eq!(other.a, 0x12);
        assert_eq!(other.l, 0xEF);

        other.reset();
        assert_eq!(other.registers(), Z80Registers::default());
    }
}
