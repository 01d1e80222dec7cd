//! Floppy drives and a command-level disk controller
//!
//! Two drives (A and B) hold caller-supplied images. Writes never touch the
//! inserted image; written sectors land in a per-drive overlay so a save
//! state can reproduce the disk contents without carrying the whole image.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use emu_core::apu::timing::CPU_CLOCK_HZ;
use emu_core::logging::{log, LogCategory, LogLevel};

use crate::error::{Msx2Error, Result};
use crate::savestate::b64;

pub const DRIVE_COUNT: usize = 2;
pub const SECTOR_SIZE: usize = 512;
pub const TRACK_COUNT: u8 = 80;

/// Motor spins down two seconds after the last command
const MOTOR_TIMEOUT_CYCLES: u32 = CPU_CLOCK_HZ * 2;

/// Commands understood by the disk engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskCommand {
    ReadSector { drive: usize, sector: u32 },
    WriteSector { drive: usize, sector: u32, data: Vec<u8> },
    Seek { drive: usize, track: u8 },
}

/// Result of a disk command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskStatus {
    Ok,
    NoDisk,
    WriteProtected,
    SectorNotFound,
    BadLength,
}

#[derive(Debug, Clone)]
struct DiskImage {
    data: Vec<u8>,
    hash: String,
    read_only: bool,
    overlay: BTreeMap<u32, Vec<u8>>,
}

impl DiskImage {
    fn sector_count(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }

    fn sector(&self, sector: u32) -> &[u8] {
        match self.overlay.get(&sector) {
            Some(written) => written,
            None => {
                let start = sector as usize * SECTOR_SIZE;
                &self.data[start..start + SECTOR_SIZE]
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveState {
    /// Identity of the inserted image, `None` when empty
    pub hash: Option<String>,
    pub track: u8,
    #[serde(with = "b64::map")]
    pub overlay: BTreeMap<u32, Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskState {
    pub drives: Vec<DriveState>,
    pub motor_on: bool,
    pub motor_cycles: u32,
    #[serde(with = "b64")]
    pub buffer: Vec<u8>,
}

/// Drives plus the controller state shared between them
#[derive(Debug, Clone, Default)]
pub struct DiskController {
    drives: [Option<DiskImage>; DRIVE_COUNT],
    tracks: [u8; DRIVE_COUNT],
    motor_on: bool,
    motor_cycles: u32,
    buffer: Vec<u8>,
}

fn check_drive(drive: usize) -> Result<()> {
    if drive >= DRIVE_COUNT {
        return Err(Msx2Error::InvalidDriveId(drive));
    }
    Ok(())
}

impl DiskController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an image in a drive, replacing whatever was there. The image must
    /// be a whole, non-zero number of sectors.
    pub fn insert(&mut self, drive: usize, data: Vec<u8>, hash: &str, read_only: bool) -> Result<()> {
        check_drive(drive)?;
        if data.is_empty() || data.len() % SECTOR_SIZE != 0 {
            return Err(Msx2Error::BufferSize {
                expected: data.len().div_ceil(SECTOR_SIZE).max(1) * SECTOR_SIZE,
                actual: data.len(),
            });
        }
        log(LogCategory::Disk, LogLevel::Info, || {
            format!(
                "Insert disk in drive {}: {} bytes, hash {}{}",
                drive,
                data.len(),
                hash,
                if read_only { " (read-only)" } else { "" }
            )
        });
        self.drives[drive] = Some(DiskImage {
            data,
            hash: hash.to_string(),
            read_only,
            overlay: BTreeMap::new(),
        });
        self.tracks[drive] = 0;
        Ok(())
    }

    /// Empty a drive; ejecting an empty drive is fine
    pub fn eject(&mut self, drive: usize) -> Result<()> {
        check_drive(drive)?;
        if self.drives[drive].take().is_some() {
            log(LogCategory::Disk, LogLevel::Info, || {
                format!("Eject disk from drive {}", drive)
            });
        }
        Ok(())
    }

    pub fn is_inserted(&self, drive: usize) -> bool {
        self.drives.get(drive).is_some_and(|d| d.is_some())
    }

    pub fn hash(&self, drive: usize) -> Option<&str> {
        self.drives.get(drive)?.as_ref().map(|d| d.hash.as_str())
    }

    pub fn is_read_only(&self, drive: usize) -> bool {
        self.drives
            .get(drive)
            .and_then(|d| d.as_ref())
            .is_some_and(|d| d.read_only)
    }

    /// Number of sectors of the inserted image
    pub fn sector_count(&self, drive: usize) -> Option<u32> {
        self.drives.get(drive)?.as_ref().map(DiskImage::sector_count)
    }

    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    /// Motor line driven by the controller's drive control register
    pub fn set_motor(&mut self, on: bool) {
        self.motor_on = on;
        self.motor_cycles = 0;
    }

    /// Data of the last successful sector read
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn track(&self, drive: usize) -> Option<u8> {
        self.tracks.get(drive).copied()
    }

    /// Run one command against a drive
    pub fn execute(&mut self, command: &DiskCommand) -> DiskStatus {
        let drive = match *command {
            DiskCommand::ReadSector { drive, .. }
            | DiskCommand::WriteSector { drive, .. }
            | DiskCommand::Seek { drive, .. } => drive,
        };
        self.motor_on = true;
        self.motor_cycles = 0;

        let Some(image) = self.drives.get_mut(drive).and_then(|d| d.as_mut()) else {
            log(LogCategory::Disk, LogLevel::Debug, || {
                format!("{:?}: no disk", command)
            });
            return DiskStatus::NoDisk;
        };

        let status = match command {
            DiskCommand::ReadSector { sector, .. } => {
                if *sector >= image.sector_count() {
                    DiskStatus::SectorNotFound
                } else {
                    self.buffer.clear();
                    self.buffer.extend_from_slice(image.sector(*sector));
                    DiskStatus::Ok
                }
            }
            DiskCommand::WriteSector { sector, data, .. } => {
                if image.read_only {
                    DiskStatus::WriteProtected
                } else if *sector >= image.sector_count() {
                    DiskStatus::SectorNotFound
                } else if data.len() != SECTOR_SIZE {
                    DiskStatus::BadLength
                } else {
                    image.overlay.insert(*sector, data.clone());
                    DiskStatus::Ok
                }
            }
            DiskCommand::Seek { track, .. } => {
                if *track >= TRACK_COUNT {
                    DiskStatus::SectorNotFound
                } else {
                    self.tracks[drive] = *track;
                    DiskStatus::Ok
                }
            }
        };

        log(LogCategory::Disk, LogLevel::Trace, || {
            format!("drive {} -> {:?}", drive, status)
        });
        status
    }

    /// Motor timer
    pub fn advance(&mut self, cycles: u32) {
        if !self.motor_on {
            return;
        }
        self.motor_cycles = self.motor_cycles.saturating_add(cycles);
        if self.motor_cycles >= MOTOR_TIMEOUT_CYCLES {
            self.motor_on = false;
            self.motor_cycles = 0;
        }
    }

    /// Heads and motor back to power-on; images and written sectors stay
    pub fn reset(&mut self) {
        self.tracks = [0; DRIVE_COUNT];
        self.motor_on = false;
        self.motor_cycles = 0;
        self.buffer.clear();
    }

    pub fn state(&self) -> DiskState {
        DiskState {
            drives: (0..DRIVE_COUNT)
                .map(|drive| DriveState {
                    hash: self.hash(drive).map(str::to_string),
                    track: self.tracks[drive],
                    overlay: self.drives[drive]
                        .as_ref()
                        .map(|d| d.overlay.clone())
                        .unwrap_or_default(),
                })
                .collect(),
            motor_on: self.motor_on,
            motor_cycles: self.motor_cycles,
            buffer: self.buffer.clone(),
        }
    }

    /// The saved drives must hold the same images as the running ones
    pub fn validate_state(&self, state: &DiskState) -> std::result::Result<(), String> {
        if state.drives.len() != DRIVE_COUNT {
            return Err(format!("state has {} drives", state.drives.len()));
        }
        for (drive, saved) in state.drives.iter().enumerate() {
            if saved.hash.as_deref() != self.hash(drive) {
                return Err(format!(
                    "drive {} holds {:?}, state expects {:?}",
                    drive,
                    self.hash(drive),
                    saved.hash
                ));
            }
            let sectors = self.drives[drive]
                .as_ref()
                .map_or(0, |d| d.sector_count());
            let bad_sector = saved
                .overlay
                .iter()
                .any(|(&sector, data)| sector >= sectors || data.len() != SECTOR_SIZE);
            if bad_sector {
                return Err(format!("drive {} has malformed written sectors", drive));
            }
        }
        Ok(())
    }

    /// Apply a state already checked by `validate_state`
    pub fn restore_state(&mut self, state: DiskState) {
        for (drive, saved) in state.drives.into_iter().enumerate().take(DRIVE_COUNT) {
            self.tracks[drive] = saved.track.min(TRACK_COUNT - 1);
            if let Some(image) = self.drives[drive].as_mut() {
                image.overlay = saved.overlay;
            }
        }
        self.motor_on = state.motor_on;
        self.motor_cycles = state.motor_cycles;
        self.buffer = state.buffer;
    }
}
