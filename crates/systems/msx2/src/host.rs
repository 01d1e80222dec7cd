//! Handle-based boundary for embedding hosts
//!
//! A `Host` owns any number of machines. `init` hands out a `Handle` that
//! every later call names; `term` drops the machine and the handle is never
//! issued again.

use std::collections::BTreeMap;

use emu_core::apu::TimingMode;

use crate::disk::{DiskCommand, DiskStatus};
use crate::error::{Msx2Error, Result};
use crate::keyboard::MATRIX_ROWS;
use crate::mappers::RomKind;
use crate::slots::PageInfo;
use crate::system::Msx2System;

/// Opaque machine identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
pub struct Host {
    machines: BTreeMap<u64, Msx2System>,
    next_id: u64,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    fn machine(&mut self, handle: Handle) -> Result<&mut Msx2System> {
        self.machines
            .get_mut(&handle.0)
            .ok_or(Msx2Error::InvalidHandle(handle.0))
    }

    /// Machines currently alive
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn system(&self, handle: Handle) -> Result<&Msx2System> {
        self.machines
            .get(&handle.0)
            .ok_or(Msx2Error::InvalidHandle(handle.0))
    }

    /// New NTSC machine
    pub fn init(&mut self) -> Handle {
        self.init_with_timing(TimingMode::Ntsc)
    }

    pub fn init_with_timing(&mut self, timing: TimingMode) -> Handle {
        self.next_id += 1;
        let handle = Handle(self.next_id);
        self.machines
            .insert(handle.0, Msx2System::with_timing(timing));
        handle
    }

    pub fn term(&mut self, handle: Handle) -> Result<()> {
        self.machines
            .remove(&handle.0)
            .map(drop)
            .ok_or(Msx2Error::InvalidHandle(handle.0))
    }

    pub fn configure_expansion(&mut self, handle: Handle, expanded: [bool; 4]) -> Result<()> {
        self.machine(handle)?.configure_expansion(expanded)
    }

    pub fn mount_ram(&mut self, handle: Handle, primary: u8, secondary: u8) -> Result<()> {
        self.machine(handle)?.mount_ram(primary, secondary)
    }

    pub fn mount_rom(
        &mut self,
        handle: Handle,
        primary: u8,
        secondary: u8,
        page: u8,
        data: &[u8],
        label: &str,
    ) -> Result<()> {
        self.machine(handle)?
            .mount_rom(primary, secondary, page, data, label)
    }

    pub fn slot_layout(&self, handle: Handle) -> Result<Vec<PageInfo>> {
        Ok(self.system(handle)?.slot_layout())
    }

    pub fn load_font(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        self.machine(handle)?.load_font(data)
    }

    pub fn set_special_keys(&mut self, handle: Handle, select: u8, start: u8) -> Result<()> {
        self.machine(handle)?.set_special_keys(select, start)
    }

    pub fn tick(
        &mut self,
        handle: Handle,
        pad1: u8,
        pad2: u8,
        key: u8,
        out: &mut [u16],
    ) -> Result<()> {
        self.machine(handle)?.tick(pad1, pad2, key, out)
    }

    pub fn tick_with_key_matrix(
        &mut self,
        handle: Handle,
        pad1: u8,
        pad2: u8,
        matrix: &[u8; MATRIX_ROWS],
        out: &mut [u16],
    ) -> Result<()> {
        self.machine(handle)?
            .tick_with_key_matrix(pad1, pad2, matrix, out)
    }

    pub fn load_rom(&mut self, handle: Handle, data: Vec<u8>, kind: RomKind) -> Result<()> {
        self.machine(handle)?.load_rom(data, kind);
        Ok(())
    }

    pub fn load_rom_code(&mut self, handle: Handle, data: Vec<u8>, code: u8) -> Result<()> {
        self.machine(handle)?.load_rom_code(data, code)
    }

    pub fn eject_rom(&mut self, handle: Handle) -> Result<()> {
        self.machine(handle)?.eject_rom();
        Ok(())
    }

    pub fn insert_disk(
        &mut self,
        handle: Handle,
        drive: usize,
        data: Vec<u8>,
        hash: &str,
        read_only: bool,
    ) -> Result<()> {
        self.machine(handle)?.insert_disk(drive, data, hash, read_only)
    }

    pub fn eject_disk(&mut self, handle: Handle, drive: usize) -> Result<()> {
        self.machine(handle)?.eject_disk(drive)
    }

    pub fn disk_command(&mut self, handle: Handle, command: &DiskCommand) -> Result<DiskStatus> {
        Ok(self.machine(handle)?.disk_command(command))
    }

    pub fn quick_save(&self, handle: Handle) -> Result<Vec<u8>> {
        self.system(handle)?.quick_save()
    }

    pub fn quick_load(&mut self, handle: Handle, blob: &[u8]) -> Result<()> {
        self.machine(handle)?.quick_load(blob)
    }

    pub fn reset(&mut self, handle: Handle) -> Result<()> {
        self.machine(handle)?.reset();
        Ok(())
    }

    pub fn take_audio(&mut self, handle: Handle, out: &mut Vec<i16>) -> Result<()> {
        self.machine(handle)?.take_audio(out);
        Ok(())
    }
}
