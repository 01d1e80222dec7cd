//! MSX2 memory and I/O bus

use emu_core::apu::AudioChip;
use emu_core::cpu_z80::MemoryZ80;
use emu_core::logging::{log, LogCategory, LogLevel};

use crate::disk::DiskController;
use crate::fdc::Fdc;
use crate::kanji::Kanji;
use crate::keyboard::Keyboard;
use crate::mappers::Mapper;
use crate::pac::PacSram;
use crate::psg::Psg;
use crate::rtc::Rtc;
use crate::slots::{Location, SlotMap};
use crate::vdp::Vdp;

pub const IO_PORTS: usize = 256;

/// MSX2 memory bus
///
/// Memory goes through the slot table. The cartridge window of slot 1-0 is
/// handed to the mapper, the register window of `DISK` pages to the floppy
/// controller and the lower half of `FM` pages to the PAC SRAM.
///
/// I/O Ports:
/// - 0x88-0x8B: VDP mirror
/// - 0x98-0x9B: VDP data, control, palette, indirect register
/// - 0xA0-0xA2: PSG latch, write, read
/// - 0xA8: primary slot select
/// - 0xA9-0xAB: keyboard row, PPI port C, port C bit set/reset
/// - 0xB4-0xB5: real-time clock register select, data
/// - 0xD8-0xDB: Kanji ROM
/// - 0xFC-0xFF: memory mapper segments
///
/// Anything else is latched on write and read back.
pub struct Msx2Bus {
    pub slots: SlotMap,
    pub cartridge: Option<Mapper>,
    pub vdp: Vdp,
    pub psg: Psg,
    pub kanji: Kanji,
    pub keyboard: Keyboard,
    pub rtc: Rtc,
    pub pac: PacSram,
    pub fdc: Fdc,
    pub disk: DiskController,
    pub io: [u8; IO_PORTS],
}

impl Msx2Bus {
    pub fn new(vdp: Vdp, psg: Psg) -> Self {
        Self {
            slots: SlotMap::new(),
            cartridge: None,
            vdp,
            psg,
            kanji: Kanji::new(),
            keyboard: Keyboard::new(),
            rtc: Rtc::new(),
            pac: PacSram::new(),
            fdc: Fdc::new(),
            disk: DiskController::new(),
            io: [0; IO_PORTS],
        }
    }

    /// Plug a cartridge into slot 1-0, replacing any previous one
    pub fn insert_cartridge(&mut self, mapper: Mapper) {
        self.cartridge = Some(mapper);
        self.slots.set_cartridge_present(true);
    }

    pub fn remove_cartridge(&mut self) -> Option<Mapper> {
        self.slots.set_cartridge_present(false);
        self.cartridge.take()
    }

    /// Power-on state for everything on the bus. Mounts, media, the clock
    /// and battery-backed SRAM stay.
    pub fn reset(&mut self) {
        self.slots.reset();
        if let Some(cartridge) = self.cartridge.as_mut() {
            cartridge.reset();
        }
        self.vdp.reset();
        self.psg.reset();
        self.kanji.reset();
        self.keyboard.reset();
        self.rtc.reset();
        self.fdc.reset();
        self.disk.reset();
        self.io = [0; IO_PORTS];
    }
}

impl MemoryZ80 for Msx2Bus {
    fn read(&self, addr: u16) -> u8 {
        if self.slots.is_secondary_select(addr) {
            return self.slots.read(addr);
        }
        match self.slots.resolve(addr) {
            Location::Cartridge { addr } => match &self.cartridge {
                Some(cartridge) => cartridge.read(addr),
                None => 0xFF,
            },
            Location::DiskRegister { register } => self.fdc.read(register),
            Location::FmBios { window, .. } => match self.pac.read(window) {
                Some(val) => val,
                None => self.slots.read(addr),
            },
            _ => self.slots.read(addr),
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        if self.slots.write(addr, val) {
            return;
        }
        match self.slots.resolve(addr) {
            Location::Cartridge { addr } => {
                if let Some(cartridge) = self.cartridge.as_mut() {
                    cartridge.write(addr, val);
                }
            }
            Location::DiskRegister { register } => self.fdc.write(register, val, &mut self.disk),
            Location::FmBios { window, .. } => self.pac.write(window, val),
            _ => {}
        }
    }

    fn io_read(&mut self, port: u8) -> u8 {
        match port {
            0x81 => 0xFF, // 8251 status
            0x88 | 0x98 => self.vdp.read_data(),
            0x89 | 0x99 => self.vdp.read_status(),
            0x90 => 0x00, // printer
            0xA2 => {
                let val = self.psg.read();
                if matches!(self.psg.latched(), 14 | 15) {
                    val | 0xC0
                } else {
                    val
                }
            }
            0xA8 => self.slots.primary_register(),
            0xA9 => self.keyboard.read_row(self.psg.pads()[0]),
            0xAA => self.keyboard.port_c(),
            0xB5 => self.rtc.read(),
            0xB8..=0xBA => 0x00, // light pen
            0xBB => 0xFF,
            0xD9 => self.kanji.read(0),
            0xDB => self.kanji.read(1),
            0xF7 => 0xFF, // AV control
            0xFC..=0xFF => self.slots.segment_register((port - 0xFC) as usize),
            _ => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("IN {:02X}: unmapped, latched value {:02X}", port, self.io[port as usize])
                });
                self.io[port as usize]
            }
        }
    }

    fn io_write(&mut self, port: u8, val: u8) {
        self.io[port as usize] = val;
        match port {
            0x88 | 0x98 => self.vdp.write_data(val),
            0x89 | 0x99 => self.vdp.write_control(val),
            0x8A | 0x9A => self.vdp.write_palette(val),
            0x8B | 0x9B => self.vdp.write_indirect(val),
            0xA0 => self.psg.select(val),
            0xA1 => self.psg.write(val),
            0xA8 => self.slots.write_primary_register(val),
            0xAA => self.keyboard.write_port_c(val),
            0xAB => self.keyboard.write_control(val),
            0xB4 => self.rtc.select(val),
            0xB5 => self.rtc.write(val),
            0xD8 => self.kanji.write_low(0, val),
            0xD9 => self.kanji.write_high(0, val),
            0xDA => self.kanji.write_low(1, val),
            0xDB => self.kanji.write_high(1, val),
            0xFC..=0xFF => self.slots.write_segment_register((port - 0xFC) as usize, val),
            _ => log(LogCategory::Bus, LogLevel::Trace, || {
                format!("OUT {:02X}, {:02X}: unmapped", port, val)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::SECTOR_SIZE;
    use crate::mappers::RomKind;
    use crate::slots::PAGE_SIZE;
    use emu_core::apu::TimingMode;

    fn bus() -> Msx2Bus {
        Msx2Bus::new(Vdp::new(TimingMode::Ntsc), Psg::new(TimingMode::Ntsc))
    }

    #[test]
    fn test_ram_behind_slot_select() {
        let mut bus = bus();
        bus.slots.mount_ram(3, 0).unwrap();
        assert_eq!(bus.read(0xC000), 0xFF);
        bus.io_write(0xA8, 0xFF);
        bus.write(0xC000, 0x42);
        assert_eq!(bus.read(0xC000), 0x42);
        assert_eq!(bus.io_read(0xA8), 0xFF);
    }

    #[test]
    fn test_memory_mapper_ports() {
        let mut bus = bus();
        bus.slots.mount_ram(3, 0).unwrap();
        bus.io_write(0xA8, 0xFF);
        assert_eq!(bus.io_read(0xFC), 0xFF);
        assert_eq!(bus.io_read(0xFF), 0xFC);
        bus.write(0x0000, 0x11);
        // segment 3 is now visible in quadrant 3 as well
        bus.io_write(0xFF, 3);
        assert_eq!(bus.read(0xC000), 0x11);
        assert_eq!(bus.io_read(0xFF), 0xFF);
    }

    #[test]
    fn test_cartridge_window() {
        let mut bus = bus();
        let rom: Vec<u8> = (0..4)
            .flat_map(|bank| std::iter::repeat(bank as u8).take(PAGE_SIZE))
            .collect();
        bus.insert_cartridge(Mapper::new(rom, RomKind::Ascii8));
        // quadrants 1 and 2 on primary slot 1
        bus.io_write(0xA8, 0x14);
        assert_eq!(bus.read(0x4000), 0);
        bus.write(0x6000, 3);
        assert_eq!(bus.read(0x4000), 3);
        bus.remove_cartridge();
        assert_eq!(bus.read(0x4000), 0xFF);
    }

    #[test]
    fn test_unknown_ports_latch() {
        let mut bus = bus();
        assert_eq!(bus.io_read(0x40), 0);
        bus.io_write(0x40, 0x5A);
        assert_eq!(bus.io_read(0x40), 0x5A);
        assert_eq!(bus.io_read(0xBB), 0xFF);
    }

    #[test]
    fn test_psg_joystick_register_bits() {
        let mut bus = bus();
        bus.io_write(0xA0, 15);
        bus.io_write(0xA1, 0x0F);
        assert_eq!(bus.io_read(0xA2), 0xCF);
        bus.io_write(0xA0, 7);
        bus.io_write(0xA1, 0x38);
        assert_eq!(bus.io_read(0xA2), 0x38);
    }

    #[test]
    fn test_keyboard_row_through_ports() {
        let mut bus = bus();
        bus.keyboard.set_key(b' ');
        bus.io_write(0xAA, 0x58);
        assert_eq!(bus.io_read(0xA9), 0xFE);
        bus.io_write(0xAB, 0x06); // clear bit 3: row 0
        assert_eq!(bus.io_read(0xAA), 0x50);
        assert_eq!(bus.io_read(0xA9), 0xFF);
    }

    #[test]
    fn test_disk_bios_window_drives_controller() {
        let mut bus = bus();
        let mut disk_rom = vec![0xC9; 2 * PAGE_SIZE];
        disk_rom[0x3FF9] = 0x00;
        bus.slots.mount_rom(0, 0, 2, &disk_rom, "DISK").unwrap();
        let image: Vec<u8> = (0..1440 * SECTOR_SIZE)
            .map(|i| (i / SECTOR_SIZE) as u8)
            .collect();
        bus.disk.insert(0, image, "boot", false).unwrap();

        assert_eq!(bus.read(0x4000), 0xC9);
        assert_eq!(bus.read(0x7FFA), 0x80);
        assert_eq!(bus.read(0x7FF9), 0xFF);
        bus.write(0x7FF8, 0x10);
        assert!(bus.disk.motor_on());

        // READ DATA cylinder 0 head 0 record 7
        for byte in [0x46, 0x00, 0, 0, 7, 2, 7, 0x1B, 0xFF] {
            bus.write(0x7FFB, byte);
        }
        assert_eq!(bus.read(0x7FFA), 0xF0);
        assert_eq!(bus.read(0x7FFB), 6);
    }

    #[test]
    fn test_disk_window_only_on_disk_pages() {
        let mut bus = bus();
        bus.slots.mount_rom(0, 0, 2, &vec![0x3E; 2 * PAGE_SIZE], "MAIN").unwrap();
        bus.write(0x7FFB, 0x03);
        assert_eq!(bus.read(0x7FFA), 0x3E);
        assert_eq!(bus.fdc.state().command, Vec::<u8>::new());
    }

    #[test]
    fn test_fm_page_pac_sram() {
        let mut bus = bus();
        bus.slots.mount_rom(0, 0, 2, &vec![0x77; 2 * PAGE_SIZE], "FM").unwrap();
        bus.write(0x4010, 0x12);
        assert_eq!(bus.read(0x4010), 0x77);

        bus.write(0x5FFE, 0x4D);
        bus.write(0x5FFF, 0x69);
        bus.write(0x4010, 0x12);
        assert_eq!(bus.read(0x4010), 0x12);
        assert_eq!(bus.read(0x5FFE), 0x77);
        assert_eq!(bus.read(0x6010), 0x77);

        // battery backed
        bus.reset();
        assert_eq!(bus.read(0x4010), 0x12);
    }

    #[test]
    fn test_rtc_ports() {
        let mut bus = bus();
        bus.io_write(0xB4, 13);
        bus.io_write(0xB5, 0x0A);
        bus.io_write(0xB4, 3);
        bus.io_write(0xB5, 0x05);
        assert_eq!(bus.io_read(0xB5), 0xF5);
        bus.io_write(0xB4, 13);
        assert_eq!(bus.io_read(0xB5), 0xFA);
    }

    #[test]
    fn test_vdp_mirror_ports() {
        let mut bus = bus();
        bus.io_write(0x89, 0x00);
        bus.io_write(0x89, 0x40);
        bus.io_write(0x88, 0x77);
        assert_eq!(bus.vdp.vram()[0], 0x77);
        bus.io_write(0x99, 0x00);
        bus.io_write(0x99, 0x00);
        assert_eq!(bus.io_read(0x88), 0x77);
    }
}
