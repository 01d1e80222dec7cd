//! MSX2 main system implementation

use emu_core::apu::{AudioChip, TimingMode};
use emu_core::cpu_z80::{CpuZ80, Z80Registers};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::System;

use crate::bus::{Msx2Bus, IO_PORTS};
use crate::disk::{DiskCommand, DiskController, DiskStatus};
use crate::error::{Msx2Error, Result, StateFormatError};
use crate::fdc::Fdc;
use crate::keyboard::MATRIX_ROWS;
use crate::mappers::{Mapper, RomKind};
use crate::pac::PacSram;
use crate::psg::Psg;
use crate::savestate::{self, CartridgeState, MachineState};
use crate::slots::PageInfo;
use crate::vdp::{Vdp, FRAMEBUFFER_LEN};

/// Where the machine is in its tick cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Running,
}

/// MSX2 emulator
pub struct Msx2System {
    // CPU (owns the bus)
    cpu: CpuZ80<Msx2Bus>,

    cartridge_crc: Option<u32>,

    // Timing
    timing: TimingMode,
    phase: Phase,
    carry_cycles: u32,
    frame: u64,
}

/// Register values the MSX BIOS expects at power-on
fn power_on_registers() -> Z80Registers {
    Z80Registers {
        af: 0xFFFF,
        bc: 0xFFFF,
        de: 0xFFFF,
        hl: 0xFFFF,
        af_prime: 0xFFFF,
        bc_prime: 0xFFFF,
        de_prime: 0xFFFF,
        hl_prime: 0xFFFF,
        ix: 0xFFFF,
        iy: 0xFFFF,
        sp: 0xF000,
        ..Z80Registers::default()
    }
}

fn check_framebuffer(out: &[u16]) -> Result<()> {
    if out.len() != FRAMEBUFFER_LEN {
        return Err(Msx2Error::BufferSize {
            expected: FRAMEBUFFER_LEN,
            actual: out.len(),
        });
    }
    Ok(())
}

fn mismatch(reason: String) -> Msx2Error {
    Msx2Error::StateFormat(StateFormatError::Mismatch(reason))
}

impl Msx2System {
    /// Create an NTSC machine with an empty slot topology
    pub fn new() -> Self {
        Self::with_timing(TimingMode::Ntsc)
    }

    /// Create a machine with an empty slot topology for a video standard
    pub fn with_timing(timing: TimingMode) -> Self {
        let bus = Msx2Bus::new(Vdp::new(timing), Psg::new(timing));
        let mut system = Self {
            cpu: CpuZ80::new(bus),
            cartridge_crc: None,
            timing,
            phase: Phase::Ready,
            carry_cycles: 0,
            frame: 0,
        };
        system.reset();
        system
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    /// CPU cycles in one frame of this machine's video standard
    pub fn cycles_per_frame(&self) -> u32 {
        self.timing.cycles_per_frame()
    }

    /// Frames emulated since the last reset
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn cpu(&self) -> &CpuZ80<Msx2Bus> {
        &self.cpu
    }

    pub fn bus(&self) -> &Msx2Bus {
        &self.cpu.memory
    }

    pub fn configure_expansion(&mut self, expanded: [bool; 4]) -> Result<()> {
        self.cpu.memory.slots.configure_expansion(expanded)
    }

    pub fn mount_ram(&mut self, primary: u8, secondary: u8) -> Result<()> {
        self.cpu.memory.slots.mount_ram(primary, secondary).map(|_| ())
    }

    pub fn mount_rom(
        &mut self,
        primary: u8,
        secondary: u8,
        page: u8,
        data: &[u8],
        label: &str,
    ) -> Result<()> {
        self.cpu
            .memory
            .slots
            .mount_rom(primary, secondary, page, data, label)
    }

    pub fn slot_layout(&self) -> Vec<PageInfo> {
        self.cpu.memory.slots.layout()
    }

    pub fn load_font(&mut self, data: &[u8]) -> Result<()> {
        self.cpu.memory.kanji.load_font(data)
    }

    pub fn set_special_keys(&mut self, select: u8, start: u8) -> Result<()> {
        self.cpu.memory.keyboard.set_special_keys(select, start)
    }

    /// Insert a cartridge and cold-reset the machine
    pub fn load_rom(&mut self, data: Vec<u8>, kind: RomKind) {
        log(LogCategory::Mapper, LogLevel::Info, || {
            format!("Loading {} byte cartridge as {:?}", data.len(), kind)
        });
        self.cartridge_crc = Some(crc32fast::hash(&data));
        self.cpu.memory.insert_cartridge(Mapper::new(data, kind));
        self.reset();
    }

    /// `load_rom` with the numeric mapper code used at the host boundary.
    /// An unknown code leaves the current cartridge in place.
    pub fn load_rom_code(&mut self, data: Vec<u8>, code: u8) -> Result<()> {
        let kind = RomKind::from_code(code)?;
        self.load_rom(data, kind);
        Ok(())
    }

    /// Remove the cartridge and cold-reset the machine
    pub fn eject_rom(&mut self) {
        if self.cpu.memory.remove_cartridge().is_some() {
            log(LogCategory::Mapper, LogLevel::Info, || "Cartridge ejected".to_string());
        }
        self.cartridge_crc = None;
        self.reset();
    }

    pub fn cartridge_kind(&self) -> Option<RomKind> {
        self.cpu.memory.cartridge.as_ref().map(Mapper::kind)
    }

    pub fn insert_disk(&mut self, drive: usize, data: Vec<u8>, hash: &str, read_only: bool) -> Result<()> {
        self.cpu.memory.disk.insert(drive, data, hash, read_only)
    }

    pub fn eject_disk(&mut self, drive: usize) -> Result<()> {
        self.cpu.memory.disk.eject(drive)
    }

    pub fn disk_command(&mut self, command: &DiskCommand) -> DiskStatus {
        self.cpu.memory.disk.execute(command)
    }

    pub fn disk(&self) -> &DiskController {
        &self.cpu.memory.disk
    }

    /// Drain buffered interleaved stereo samples
    pub fn take_audio(&mut self, out: &mut Vec<i16>) {
        self.cpu.memory.psg.drain_samples(out);
    }

    /// Feed elapsed cycles to every engine. Returns the interrupt line.
    fn advance_engines(&mut self, cycles: u32) -> bool {
        let bus = &mut self.cpu.memory;
        bus.psg.advance(cycles);
        bus.disk.advance(cycles);
        bus.rtc.advance(cycles);
        bus.vdp.advance(cycles)
    }

    /// Run one frame with the given input and render it into `out`
    pub fn tick(&mut self, pad1: u8, pad2: u8, key: u8, out: &mut [u16]) -> Result<()> {
        check_framebuffer(out)?;
        self.cpu.memory.keyboard.set_key(key);
        self.run_frame(pad1, pad2, out);
        Ok(())
    }

    /// `tick` with a full keyboard matrix instead of a single key code: one
    /// byte per row, a set bit for every held key
    pub fn tick_with_key_matrix(
        &mut self,
        pad1: u8,
        pad2: u8,
        matrix: &[u8; MATRIX_ROWS],
        out: &mut [u16],
    ) -> Result<()> {
        check_framebuffer(out)?;
        self.cpu.memory.keyboard.set_matrix(matrix);
        self.run_frame(pad1, pad2, out);
        Ok(())
    }

    fn run_frame(&mut self, pad1: u8, pad2: u8, out: &mut [u16]) {
        self.phase = Phase::Running;
        self.cpu.memory.psg.set_pads(pad1, pad2);

        let frame_cycles = self.cycles_per_frame();
        let mut elapsed = self.carry_cycles;
        while elapsed < frame_cycles {
            let cycles = self.cpu.step();
            elapsed += cycles;
            if self.advance_engines(cycles) {
                let accepted = self.cpu.interrupt();
                if accepted > 0 {
                    elapsed += accepted;
                    self.advance_engines(accepted);
                }
            }
        }
        self.carry_cycles = elapsed - frame_cycles;

        self.cpu.memory.vdp.render(out);
        self.frame += 1;
        self.phase = Phase::Ready;
    }

    /// Capture the whole mutable machine state as a blob
    pub fn quick_save(&self) -> Result<Vec<u8>> {
        let bus = &self.cpu.memory;
        let cartridge = match (&bus.cartridge, self.cartridge_crc) {
            (Some(mapper), Some(rom_crc)) => Some(CartridgeState {
                rom_len: mapper.rom().len(),
                rom_crc,
                mapper: mapper.state(),
            }),
            _ => None,
        };
        let state = MachineState {
            timing: self.timing,
            cpu: self.cpu.registers(),
            carry_cycles: self.carry_cycles,
            frame: self.frame,
            slots: bus.slots.state(),
            cartridge,
            vdp: bus.vdp.state(),
            psg: bus.psg.state(),
            kanji: bus.kanji.state(),
            keyboard: bus.keyboard.state(),
            rtc: bus.rtc.state(),
            pac: bus.pac.state(),
            io: bus.io.to_vec(),
            fdc: bus.fdc.state(),
            disk: bus.disk.state(),
        };
        let blob = savestate::encode(&state)?;
        log(LogCategory::State, LogLevel::Info, || {
            format!("Saved state at frame {} ({} bytes)", self.frame, blob.len())
        });
        Ok(blob)
    }

    /// Check a decoded state against the running topology and media
    fn validate(&self, state: &MachineState) -> Result<()> {
        let bus = &self.cpu.memory;
        if state.timing != self.timing {
            return Err(mismatch(format!(
                "state was saved on a {:?} machine, this one is {:?}",
                state.timing, self.timing
            )));
        }
        bus.slots.validate_state(&state.slots).map_err(mismatch)?;

        match (&bus.cartridge, &state.cartridge) {
            (None, None) => {}
            (Some(mapper), Some(saved)) => {
                let same_rom = saved.rom_len == mapper.rom().len()
                    && Some(saved.rom_crc) == self.cartridge_crc;
                if !same_rom {
                    return Err(mismatch("state was saved with a different cartridge".into()));
                }
                mapper.validate_state(&saved.mapper).map_err(mismatch)?;
            }
            (Some(_), None) => return Err(mismatch("state has no cartridge".into())),
            (None, Some(_)) => return Err(mismatch("state needs a cartridge".into())),
        }

        Vdp::validate_state(&state.vdp).map_err(mismatch)?;
        if state.io.len() != IO_PORTS {
            return Err(mismatch(format!("state has {} I/O ports", state.io.len())));
        }
        PacSram::validate_state(&state.pac).map_err(mismatch)?;
        Fdc::validate_state(&state.fdc).map_err(mismatch)?;
        bus.disk.validate_state(&state.disk).map_err(mismatch)?;
        Ok(())
    }

    /// Replace the machine state with a blob from `quick_save`.
    /// Nothing changes unless the whole blob checks out.
    pub fn quick_load(&mut self, blob: &[u8]) -> Result<()> {
        let state = savestate::decode(blob)?;
        if let Err(err) = self.validate(&state) {
            log(LogCategory::State, LogLevel::Warn, || {
                format!("Rejected save state: {}", err)
            });
            return Err(err);
        }

        self.cpu.set_registers(&state.cpu);
        self.carry_cycles = state.carry_cycles.min(self.cycles_per_frame() - 1);
        self.frame = state.frame;

        let bus = &mut self.cpu.memory;
        bus.slots.restore_state(state.slots);
        if let (Some(mapper), Some(saved)) = (bus.cartridge.as_mut(), &state.cartridge) {
            mapper.restore_state(&saved.mapper);
        }
        bus.vdp.restore_state(state.vdp);
        bus.psg.restore_state(&state.psg);
        bus.kanji.restore_state(&state.kanji);
        bus.keyboard.restore_state(&state.keyboard);
        bus.rtc.restore_state(&state.rtc);
        bus.pac.restore_state(&state.pac);
        bus.io.copy_from_slice(&state.io);
        bus.fdc.restore_state(state.fdc);
        bus.disk.restore_state(state.disk);

        log(LogCategory::State, LogLevel::Info, || {
            format!("Loaded state at frame {}", self.frame)
        });
        Ok(())
    }

    /// Cold reset: every engine back to power-on, mounts and media kept
    pub fn reset(&mut self) {
        self.cpu.memory.reset();
        self.cpu.reset();
        self.cpu.set_registers(&power_on_registers());
        self.carry_cycles = 0;
        self.frame = 0;
        self.phase = Phase::Ready;
    }
}

impl Default for Msx2System {
    fn default() -> Self {
        Self::new()
    }
}

impl System for Msx2System {
    type Error = Msx2Error;

    fn reset(&mut self) {
        Msx2System::reset(self);
    }

    fn step_frame(&mut self, out: &mut [u16]) -> Result<()> {
        self.tick(0, 0, 0, out)
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        self.quick_save()
    }

    fn load_state(&mut self, blob: &[u8]) -> Result<()> {
        self.quick_load(blob)
    }

    fn supports_save_states(&self) -> bool {
        true
    }
}
