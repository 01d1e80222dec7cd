//! Slot topology and page resolution
//!
//! The 64KB CPU address space is four 16KB quadrants. Each quadrant is routed
//! to one of four primary slots by the PPI port A register (I/O 0xA8), and,
//! when that primary slot is expanded, to one of its four secondary slots by
//! the register at 0xFFFF. Every slot is eight 8KB pages.
//!
//! RAM follows the MSX2 memory mapper: a 64KB block is four 16KB segments and
//! ports 0xFC-0xFF choose the segment seen in quadrants 0-3.
//!
//! Two ROM labels give pages a device role. Pages labelled `DISK` expose the
//! floppy controller registers at the top of their 16KB quadrant
//! (0x3FF0-0x3FFF), and pages labelled `FM` overlay the FM-PAC SRAM.

use serde::{Deserialize, Serialize};

use crate::error::{Msx2Error, Result};
use crate::savestate::b64;
use emu_core::logging::{log, LogCategory, LogLevel};

pub const PAGE_SIZE: usize = 0x2000;
pub const PAGES_PER_SLOT: usize = 8;
pub const RAM_BLOCK_SIZE: usize = 0x10000;
const SEGMENT_SIZE: usize = 0x4000;

/// Memory-mapper segment registers at power-on (ports 0xFC..0xFF)
pub const MAPPER_POWER_ON: [u8; 4] = [3, 2, 1, 0];

/// Cartridge slot and the pages its mapper owns
pub const CARTRIDGE_PRIMARY: u8 = 1;
pub const CARTRIDGE_SECONDARY: u8 = 0;
pub const CARTRIDGE_PAGES: std::ops::RangeInclusive<usize> = 2..=5;

pub const DISK_LABEL: &str = "DISK";
pub const FM_LABEL: &str = "FM";
/// First quadrant offset of the floppy controller register window
pub const DISK_REGISTER_BASE: u16 = 0x3FF0;

/// What one 8KB page of one slot is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageBacking {
    #[default]
    Unmapped,
    /// A 64KB RAM block; the segment registers pick the offset
    Ram { block: usize },
    /// A fixed ROM image page
    Rom { image: usize, offset: usize },
    /// Disk BIOS page; the top of its quadrant is the controller registers
    DiskBios { image: usize, offset: usize },
    /// FM BIOS page with the PAC SRAM overlay
    FmBios { image: usize, offset: usize },
}

/// Result of resolving a CPU address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Unmapped,
    Ram { block: usize, offset: usize },
    Rom { image: usize, offset: usize },
    /// The cartridge window; the mapper resolves the bank itself
    Cartridge { addr: u16 },
    /// Floppy controller register, as an offset inside the 16KB quadrant
    DiskRegister { register: u16 },
    /// FM BIOS byte; `window` is the offset inside the 16KB quadrant
    FmBios {
        image: usize,
        offset: usize,
        window: u16,
    },
}

/// Slot select registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotSelect {
    /// Port 0xA8: two bits per quadrant
    pub primary: u8,
    /// 0xFFFF register of each expanded primary slot
    pub secondary: [u8; 4],
}

impl SlotSelect {
    pub fn primary_for(&self, quadrant: usize) -> usize {
        ((self.primary >> (quadrant * 2)) & 3) as usize
    }
}

/// A mounted immutable image (BIOS, sub-ROM, disk ROM...)
#[derive(Debug, Clone)]
struct RomImage {
    label: String,
    data: Vec<u8>,
}

/// One row of the slot layout listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub primary: u8,
    pub secondary: u8,
    pub page: u8,
    pub description: String,
}

/// Saved slot state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    /// Checksum of the expansion flags and mounted pages
    pub topology: u32,
    pub select: SlotSelect,
    pub segments: [u8; 4],
    #[serde(with = "b64::vec")]
    pub ram: Vec<Vec<u8>>,
}

/// Primary/secondary slot table with its RAM and ROM arenas
#[derive(Debug, Clone, Default)]
pub struct SlotMap {
    pages: [[[PageBacking; PAGES_PER_SLOT]; 4]; 4],
    expanded: [bool; 4],
    expansion_configured: bool,
    mounted: bool,
    cartridge_present: bool,
    select: SlotSelect,
    segments: [u8; 4],
    ram: Vec<Vec<u8>>,
    roms: Vec<RomImage>,
}

fn check_slot(primary: u8, secondary: u8, page: u8) -> Result<()> {
    if primary > 3 || secondary > 3 || page as usize >= PAGES_PER_SLOT {
        return Err(Msx2Error::InvalidSlot {
            primary,
            secondary,
            page,
        });
    }
    Ok(())
}

impl SlotMap {
    pub fn new() -> Self {
        Self {
            segments: MAPPER_POWER_ON,
            ..Self::default()
        }
    }

    /// Declare which primary slots are expanded. Only legal before any mount.
    pub fn configure_expansion(&mut self, expanded: [bool; 4]) -> Result<()> {
        if self.mounted {
            return Err(Msx2Error::ConfigurationOrder(
                "slot expansion must be configured before mounting".into(),
            ));
        }
        if self.expansion_configured {
            return Err(Msx2Error::ConfigurationOrder(
                "slot expansion is already configured".into(),
            ));
        }
        self.expanded = expanded;
        self.expansion_configured = true;
        log(LogCategory::Slots, LogLevel::Info, || {
            format!("expanded primary slots: {:?}", expanded)
        });
        Ok(())
    }

    fn check_mount(&self, primary: u8, secondary: u8, page: u8) -> Result<()> {
        check_slot(primary, secondary, page)?;
        if secondary != 0 && !self.expanded[primary as usize] {
            return Err(Msx2Error::ConfigurationOrder(format!(
                "primary slot {} is not expanded",
                primary
            )));
        }
        Ok(())
    }

    /// Install a zeroed 64KB RAM block over all pages of a slot and return
    /// its index. Mounting RAM on a slot that already has RAM clears and
    /// reuses that block.
    pub fn mount_ram(&mut self, primary: u8, secondary: u8) -> Result<usize> {
        self.check_mount(primary, secondary, 0)?;
        let existing = self.pages[primary as usize][secondary as usize]
            .iter()
            .find_map(|backing| match *backing {
                PageBacking::Ram { block } => Some(block),
                _ => None,
            });
        let block = match existing {
            Some(block) => {
                self.ram[block].fill(0);
                block
            }
            None => {
                self.ram.push(vec![0; RAM_BLOCK_SIZE]);
                self.ram.len() - 1
            }
        };
        self.pages[primary as usize][secondary as usize] = [PageBacking::Ram { block }; 8];
        self.mounted = true;
        log(LogCategory::Slots, LogLevel::Info, || {
            format!("RAM block {} mounted at slot {}-{}", block, primary, secondary)
        });
        Ok(block)
    }

    /// Install an image of N x 8KB over N consecutive pages starting at `page`.
    pub fn mount_rom(
        &mut self,
        primary: u8,
        secondary: u8,
        page: u8,
        data: &[u8],
        label: &str,
    ) -> Result<()> {
        self.check_mount(primary, secondary, page)?;
        if data.is_empty() || data.len() % PAGE_SIZE != 0 {
            return Err(Msx2Error::BufferSize {
                expected: data.len().div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE,
                actual: data.len(),
            });
        }
        let count = data.len() / PAGE_SIZE;
        let last = page as usize + count - 1;
        if last >= PAGES_PER_SLOT {
            return Err(Msx2Error::InvalidSlot {
                primary,
                secondary,
                page: last.min(u8::MAX as usize) as u8,
            });
        }

        let image = self.roms.len();
        self.roms.push(RomImage {
            label: label.to_string(),
            data: data.to_vec(),
        });
        for i in 0..count {
            let offset = i * PAGE_SIZE;
            self.pages[primary as usize][secondary as usize][page as usize + i] = match label {
                DISK_LABEL => PageBacking::DiskBios { image, offset },
                FM_LABEL => PageBacking::FmBios { image, offset },
                _ => PageBacking::Rom { image, offset },
            };
        }
        self.mounted = true;
        log(LogCategory::Slots, LogLevel::Info, || {
            format!(
                "{} ({} bytes) mounted at slot {}-{} page {}",
                label,
                data.len(),
                primary,
                secondary,
                page
            )
        });
        Ok(())
    }

    pub fn set_cartridge_present(&mut self, present: bool) {
        self.cartridge_present = present;
    }

    pub fn is_expanded(&self, primary: usize) -> bool {
        self.expanded[primary & 3]
    }

    pub fn backing(&self, primary: u8, secondary: u8, page: u8) -> Result<PageBacking> {
        check_slot(primary, secondary, page)?;
        Ok(self.pages[primary as usize][secondary as usize][page as usize])
    }

    /// Resolve a CPU address with the current select registers.
    pub fn resolve(&self, addr: u16) -> Location {
        let quadrant = (addr >> 14) as usize;
        let primary = self.select.primary_for(quadrant);
        let secondary = if self.expanded[primary] {
            ((self.select.secondary[primary] >> (quadrant * 2)) & 3) as usize
        } else {
            0
        };
        let page = (addr >> 13) as usize;

        if self.cartridge_present
            && primary == CARTRIDGE_PRIMARY as usize
            && secondary == CARTRIDGE_SECONDARY as usize
            && CARTRIDGE_PAGES.contains(&page)
        {
            return Location::Cartridge { addr };
        }

        match self.pages[primary][secondary][page] {
            PageBacking::Unmapped => Location::Unmapped,
            PageBacking::Ram { block } => {
                let segment = (self.segments[quadrant] & 3) as usize;
                Location::Ram {
                    block,
                    offset: segment * SEGMENT_SIZE + (addr as usize & (SEGMENT_SIZE - 1)),
                }
            }
            PageBacking::Rom { image, offset } => Location::Rom {
                image,
                offset: offset + (addr as usize & (PAGE_SIZE - 1)),
            },
            PageBacking::DiskBios { image, offset } => {
                let window = addr & (SEGMENT_SIZE as u16 - 1);
                if window >= DISK_REGISTER_BASE {
                    Location::DiskRegister { register: window }
                } else {
                    Location::Rom {
                        image,
                        offset: offset + (addr as usize & (PAGE_SIZE - 1)),
                    }
                }
            }
            PageBacking::FmBios { image, offset } => Location::FmBios {
                image,
                offset: offset + (addr as usize & (PAGE_SIZE - 1)),
                window: addr & (SEGMENT_SIZE as u16 - 1),
            },
        }
    }

    /// Primary slot seen by quadrant 3, when it is expanded
    fn expanded_top_slot(&self) -> Option<usize> {
        let primary = self.select.primary_for(3);
        self.expanded[primary].then_some(primary)
    }

    /// True when `addr` is the secondary select register of the slot in
    /// quadrant 3 rather than memory.
    pub fn is_secondary_select(&self, addr: u16) -> bool {
        addr == 0xFFFF && self.expanded_top_slot().is_some()
    }

    /// Read a byte from slot memory. Device locations (cartridge, disk
    /// registers) read 0xFF; FM BIOS pages read the ROM underneath the PAC.
    pub fn read(&self, addr: u16) -> u8 {
        if addr == 0xFFFF {
            if let Some(primary) = self.expanded_top_slot() {
                return !self.select.secondary[primary];
            }
        }
        match self.resolve(addr) {
            Location::Ram { block, offset } => self.ram[block][offset],
            Location::Rom { image, offset } | Location::FmBios { image, offset, .. } => {
                self.roms[image].data[offset]
            }
            Location::Unmapped | Location::Cartridge { .. } | Location::DiskRegister { .. } => {
                0xFF
            }
        }
    }

    /// Write a byte. Returns `false` when the address belongs to a device
    /// (cartridge, disk registers, FM BIOS page) and the caller must forward
    /// it.
    pub fn write(&mut self, addr: u16, val: u8) -> bool {
        if addr == 0xFFFF {
            if let Some(primary) = self.expanded_top_slot() {
                self.select.secondary[primary] = val;
                log(LogCategory::Slots, LogLevel::Debug, || {
                    format!("secondary select of slot {} <- {:02X}", primary, val)
                });
                return true;
            }
        }
        match self.resolve(addr) {
            Location::Ram { block, offset } => {
                self.ram[block][offset] = val;
                true
            }
            Location::Cartridge { .. } | Location::DiskRegister { .. } | Location::FmBios { .. } => {
                false
            }
            Location::Rom { .. } | Location::Unmapped => true,
        }
    }

    pub fn primary_register(&self) -> u8 {
        self.select.primary
    }

    pub fn write_primary_register(&mut self, val: u8) {
        self.select.primary = val;
        log(LogCategory::Slots, LogLevel::Debug, || {
            format!("primary select <- {:02X}", val)
        });
    }

    pub fn select(&self) -> SlotSelect {
        self.select
    }

    /// Port 0xFC + quadrant read
    pub fn segment_register(&self, quadrant: usize) -> u8 {
        self.segments[quadrant & 3] | 0xFC
    }

    pub fn write_segment_register(&mut self, quadrant: usize, val: u8) {
        self.segments[quadrant & 3] = val & 0x03;
    }

    pub fn ram_block_count(&self) -> usize {
        self.ram.len()
    }

    pub fn ram_block(&self, block: usize) -> Option<&[u8]> {
        self.ram.get(block).map(Vec::as_slice)
    }

    /// Power-on state: RAM cleared, selects and segments back to defaults
    pub fn reset(&mut self) {
        for block in &mut self.ram {
            block.fill(0);
        }
        self.select = SlotSelect::default();
        self.segments = MAPPER_POWER_ON;
    }

    /// Every mounted page with its backing description
    pub fn layout(&self) -> Vec<PageInfo> {
        let mut rows = Vec::new();
        for primary in 0..4 {
            for secondary in 0..4 {
                for page in 0..PAGES_PER_SLOT {
                    let description = match self.pages[primary][secondary][page] {
                        PageBacking::Unmapped => continue,
                        PageBacking::Ram { block } => format!("RAM block {}", block),
                        PageBacking::Rom { image, offset }
                        | PageBacking::DiskBios { image, offset }
                        | PageBacking::FmBios { image, offset } => {
                            format!("{} +{:05X}", self.roms[image].label, offset)
                        }
                    };
                    rows.push(PageInfo {
                        primary: primary as u8,
                        secondary: secondary as u8,
                        page: page as u8,
                        description,
                    });
                }
            }
        }
        rows
    }

    /// Checksum over the expansion flags and every mounted page, so a state
    /// is only restored into a machine wired the same way
    pub fn topology(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.expanded.map(u8::from));
        for row in self.layout() {
            hasher.update(&[row.primary, row.secondary, row.page]);
            hasher.update(row.description.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }

    pub fn state(&self) -> SlotState {
        SlotState {
            topology: self.topology(),
            select: self.select,
            segments: self.segments,
            ram: self.ram.clone(),
        }
    }

    /// Check a saved state fits this topology without applying it.
    pub fn validate_state(&self, state: &SlotState) -> std::result::Result<(), String> {
        if state.topology != self.topology() {
            return Err(format!(
                "state was saved on slot topology {:08X}, machine has {:08X}",
                state.topology,
                self.topology()
            ));
        }
        if state.ram.len() != self.ram.len() {
            return Err(format!(
                "state has {} RAM blocks, machine has {}",
                state.ram.len(),
                self.ram.len()
            ));
        }
        if state.ram.iter().any(|block| block.len() != RAM_BLOCK_SIZE) {
            return Err("RAM block with wrong size".into());
        }
        Ok(())
    }

    pub fn restore_state(&mut self, state: SlotState) {
        self.select = state.select;
        self.segments = state.segments.map(|s| s & 3);
        self.ram = state.ram;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(pages: usize, fill: u8) -> Vec<u8> {
        vec![fill; pages * PAGE_SIZE]
    }

    #[test]
    fn test_unmapped_reads_ff() {
        let slots = SlotMap::new();
        assert_eq!(slots.resolve(0x1234), Location::Unmapped);
        assert_eq!(slots.read(0x1234), 0xFF);
    }

    #[test]
    fn test_mount_rom_resolves_all_pages() {
        let mut slots = SlotMap::new();
        let mut bios = rom(4, 0);
        bios[0x2000] = 0xAA;
        bios[0x7FFF] = 0xBB;
        slots.mount_rom(0, 0, 0, &bios, "MAIN").unwrap();

        assert_eq!(
            slots.resolve(0x2000),
            Location::Rom {
                image: 0,
                offset: 0x2000
            }
        );
        assert_eq!(slots.read(0x2000), 0xAA);
        assert_eq!(slots.read(0x7FFF), 0xBB);
        // Resolution is stable
        assert_eq!(slots.resolve(0x2000), slots.resolve(0x2000));
        // ROM ignores writes
        assert!(slots.write(0x2000, 0x00));
        assert_eq!(slots.read(0x2000), 0xAA);
    }

    #[test]
    fn test_mount_rom_validates_size_and_fit() {
        let mut slots = SlotMap::new();
        assert!(matches!(
            slots.mount_rom(0, 0, 0, &[0; 100], "bad"),
            Err(Msx2Error::BufferSize { .. })
        ));
        assert!(matches!(
            slots.mount_rom(0, 0, 0, &[], "empty"),
            Err(Msx2Error::BufferSize { .. })
        ));
        assert!(matches!(
            slots.mount_rom(0, 0, 6, &rom(3, 0), "overflow"),
            Err(Msx2Error::InvalidSlot { page: 8, .. })
        ));
        assert!(matches!(
            slots.mount_rom(4, 0, 0, &rom(1, 0), "slot"),
            Err(Msx2Error::InvalidSlot { primary: 4, .. })
        ));
        assert!(slots.mount_rom(0, 0, 7, &rom(1, 0), "last page").is_ok());
    }

    #[test]
    fn test_ram_through_mapper_segments() {
        let mut slots = SlotMap::new();
        let block = slots.mount_ram(0, 0).unwrap();
        slots.write(0x0000, 0x11);
        // Quadrant 0 sees segment 3 at power-on
        assert_eq!(
            slots.resolve(0x0000),
            Location::Ram {
                block,
                offset: 0xC000
            }
        );
        slots.write_segment_register(0, 0);
        assert_eq!(slots.read(0x0000), 0x00);
        slots.write_segment_register(0, 3);
        assert_eq!(slots.read(0x0000), 0x11);
        assert_eq!(slots.segment_register(0), 0xFF);
        assert_eq!(slots.segment_register(3), 0xFC);
    }

    #[test]
    fn test_primary_select_routes_quadrants() {
        let mut slots = SlotMap::new();
        slots.mount_rom(0, 0, 0, &rom(2, 0x00), "BIOS").unwrap();
        slots.mount_ram(3, 0).unwrap();
        assert_eq!(slots.read(0x0000), 0x00);
        // Quadrant 0 -> slot 3
        slots.write_primary_register(0x03);
        assert!(matches!(slots.resolve(0x0000), Location::Ram { .. }));
        assert_eq!(slots.primary_register(), 0x03);
    }

    #[test]
    fn test_secondary_register_on_expanded_slot() {
        let mut slots = SlotMap::new();
        slots.configure_expansion([false, false, false, true]).unwrap();
        slots.mount_ram(3, 0).unwrap();
        slots.mount_rom(3, 1, 6, &rom(2, 0x5A), "EXT").unwrap();
        slots.write_primary_register(0xC0);

        // 0xFFFF is the select register, reads complement
        assert_eq!(slots.read(0xFFFF), 0xFF);
        slots.write(0xFFFF, 0x40);
        assert_eq!(slots.read(0xFFFF), 0xBF);
        assert_eq!(slots.select().secondary[3], 0x40);
        // Quadrant 3 now sees secondary 1
        assert_eq!(slots.read(0xC000), 0x5A);
        assert_eq!(
            slots.resolve(0xE000),
            Location::Rom {
                image: 0,
                offset: 0x2000
            }
        );
    }

    #[test]
    fn test_ffff_is_memory_when_not_expanded() {
        let mut slots = SlotMap::new();
        slots.mount_ram(3, 0).unwrap();
        slots.write_primary_register(0xC0);
        slots.write(0xFFFF, 0x12);
        assert_eq!(slots.read(0xFFFF), 0x12);
        assert_eq!(slots.select().secondary, [0; 4]);
    }

    #[test]
    fn test_configuration_order() {
        let mut slots = SlotMap::new();
        assert!(matches!(
            slots.mount_ram(2, 1),
            Err(Msx2Error::ConfigurationOrder(_))
        ));
        slots.mount_ram(3, 0).unwrap();
        assert!(matches!(
            slots.configure_expansion([true; 4]),
            Err(Msx2Error::ConfigurationOrder(_))
        ));

        let mut fresh = SlotMap::new();
        fresh.configure_expansion([true, false, false, false]).unwrap();
        assert!(matches!(
            fresh.configure_expansion([true, false, false, false]),
            Err(Msx2Error::ConfigurationOrder(_))
        ));
        assert!(fresh.mount_ram(0, 3).is_ok());
    }

    #[test]
    fn test_cartridge_window() {
        let mut slots = SlotMap::new();
        slots.write_primary_register(0b0001_0100);
        assert_eq!(slots.resolve(0x4000), Location::Unmapped);
        slots.set_cartridge_present(true);
        assert_eq!(slots.resolve(0x4000), Location::Cartridge { addr: 0x4000 });
        assert_eq!(slots.resolve(0xBFFF), Location::Cartridge { addr: 0xBFFF });
        assert_eq!(slots.resolve(0x0000), Location::Unmapped);
        assert!(!slots.write(0x6000, 1));
    }

    #[test]
    fn test_reset_and_state() {
        let mut slots = SlotMap::new();
        slots.mount_ram(3, 0).unwrap();
        slots.write_primary_register(0xC0);
        slots.write(0xC000, 0x77);
        let state = slots.state();

        slots.reset();
        assert_eq!(slots.primary_register(), 0);
        assert_eq!(slots.ram_block(0).unwrap()[0], 0);

        assert!(slots.validate_state(&state).is_ok());
        slots.restore_state(state);
        assert_eq!(slots.read(0xC000), 0x77);

        let other = SlotMap::new();
        assert!(other.validate_state(&slots.state()).is_err());
    }

    #[test]
    fn test_mount_ram_twice_reuses_block() {
        let mut slots = SlotMap::new();
        assert_eq!(slots.mount_ram(3, 0).unwrap(), 0);
        slots.write_primary_register(0xC0);
        slots.write(0xC000, 0x99);
        assert_eq!(slots.mount_ram(3, 0).unwrap(), 0);
        assert_eq!(slots.ram_block_count(), 1);
        assert_eq!(slots.read(0xC000), 0x00);
        assert_eq!(slots.mount_ram(2, 0).unwrap(), 1);
        assert_eq!(slots.ram_block_count(), 2);
    }

    #[test]
    fn test_disk_pages_expose_controller_registers() {
        let mut slots = SlotMap::new();
        let mut disk_rom = rom(2, 0xC9);
        disk_rom[0x3FEF] = 0x11;
        disk_rom[0x3FF8] = 0x22;
        slots.mount_rom(0, 0, 2, &disk_rom, DISK_LABEL).unwrap();
        assert_eq!(
            slots.backing(0, 0, 3).unwrap(),
            PageBacking::DiskBios {
                image: 0,
                offset: PAGE_SIZE
            }
        );
        assert_eq!(slots.read(0x7FEF), 0x11);
        assert_eq!(
            slots.resolve(0x7FF0),
            Location::DiskRegister { register: 0x3FF0 }
        );
        assert_eq!(
            slots.resolve(0x7FFB),
            Location::DiskRegister { register: 0x3FFB }
        );
        // registers are not ROM
        assert_eq!(slots.read(0x7FF8), 0xFF);
        assert!(!slots.write(0x7FF8, 0x00));
        assert!(slots.write(0x4000, 0x00));
    }

    #[test]
    fn test_fm_pages_are_forwarded() {
        let mut slots = SlotMap::new();
        slots.mount_rom(0, 0, 2, &rom(2, 0x3C), FM_LABEL).unwrap();
        assert_eq!(
            slots.resolve(0x5FFE),
            Location::FmBios {
                image: 0,
                offset: 0x1FFE,
                window: 0x1FFE
            }
        );
        assert_eq!(slots.read(0x5FFE), 0x3C);
        assert!(!slots.write(0x5FFE, 0x4D));
    }

    #[test]
    fn test_topology_guards_state() {
        let mut expanded = SlotMap::new();
        expanded.configure_expansion([false, false, false, true]).unwrap();
        expanded.mount_ram(3, 0).unwrap();
        let state = expanded.state();

        let mut flat = SlotMap::new();
        flat.mount_ram(3, 0).unwrap();
        assert!(flat.validate_state(&state).is_err());

        let mut relabelled = SlotMap::new();
        relabelled.configure_expansion([false, false, false, true]).unwrap();
        relabelled.mount_ram(3, 0).unwrap();
        assert!(relabelled.validate_state(&state).is_ok());
        relabelled.mount_rom(0, 0, 0, &rom(1, 0), "BIOS").unwrap();
        assert!(relabelled.validate_state(&state).is_err());
    }

    #[test]
    fn test_layout_lists_labels() {
        let mut slots = SlotMap::new();
        slots.mount_rom(0, 0, 0, &rom(4, 0), "MSX2.ROM").unwrap();
        let layout = slots.layout();
        assert_eq!(layout.len(), 4);
        assert_eq!(layout[1].page, 1);
        assert_eq!(layout[1].description, "MSX2.ROM +02000");
    }
}
