//! TC8566AF floppy controller behind the disk BIOS window
//!
//! The disk ROM drives a uPD765-compatible controller through registers at
//! the top of its 16KB quadrant:
//!
//! - 0x3FF8 (write): drive control; bits 0-1 select the drive, 4-5 the motors
//! - 0x3FF9 (write): card control
//! - 0x3FFA (read): main status
//! - 0x3FFB (read/write): data
//!
//! A command is a run of bytes written to the data register, followed by an
//! execution phase moving whole sectors and a result phase read back through
//! the same register. Sectors go through `DiskController`, so the disk BIOS
//! and host disk commands share the drives.
//!
//! Disks are 80 tracks of 9 sectors, one or two sides depending on the
//! image size.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use emu_core::logging::{log, LogCategory, LogLevel};

use crate::disk::{DiskCommand, DiskController, DiskStatus, DRIVE_COUNT, SECTOR_SIZE, TRACK_COUNT};
use crate::savestate::b64;

pub const REG_DRIVE_CONTROL: u16 = 0x3FF8;
pub const REG_CARD_CONTROL: u16 = 0x3FF9;
pub const REG_STATUS: u16 = 0x3FFA;
pub const REG_DATA: u16 = 0x3FFB;

// Main status register
const MSR_RQM: u8 = 0x80;
const MSR_DIO: u8 = 0x40;
const MSR_EXM: u8 = 0x20;
const MSR_BUSY: u8 = 0x10;

const ST0_INVALID: u8 = 0x80;
const ST0_ABNORMAL: u8 = 0x40;
const ST0_SEEK_END: u8 = 0x20;
const ST0_NOT_READY: u8 = 0x08;
const ST1_NOT_WRITABLE: u8 = 0x02;
const ST1_NO_DATA: u8 = 0x04;
const ST3_WRITE_PROTECT: u8 = 0x40;
const ST3_READY: u8 = 0x20;
const ST3_TRACK0: u8 = 0x10;
const ST3_TWO_SIDE: u8 = 0x08;

const SPECIFY: u8 = 0x03;
const SENSE_DRIVE_STATUS: u8 = 0x04;
const WRITE_DATA: u8 = 0x05;
const READ_DATA: u8 = 0x06;
const RECALIBRATE: u8 = 0x07;
const SENSE_INTERRUPT: u8 = 0x08;
const READ_ID: u8 = 0x0A;
const SEEK: u8 = 0x0F;

pub const SECTORS_PER_TRACK: u32 = 9;

/// Command bytes including the opcode; unknown opcodes are one byte
fn command_length(opcode: u8) -> usize {
    match opcode {
        SPECIFY | SEEK => 3,
        SENSE_DRIVE_STATUS | RECALIBRATE | READ_ID => 2,
        WRITE_DATA | READ_DATA => 9,
        _ => 1,
    }
}

fn sides(disk: &DiskController, drive: usize) -> u32 {
    match disk.sector_count(drive) {
        Some(sectors) if sectors > TRACK_COUNT as u32 * SECTORS_PER_TRACK => 2,
        _ => 1,
    }
}

/// Linear sector of a cylinder/head/record triple, `None` for a record
/// outside the track
fn linear_sector(cylinder: u8, head: u8, record: u8, sides: u32) -> Option<u32> {
    if record == 0 || record as u32 > SECTORS_PER_TRACK {
        return None;
    }
    Some((cylinder as u32 * sides + head as u32) * SECTORS_PER_TRACK + record as u32 - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FdcPhase {
    #[default]
    Idle,
    Command,
    /// Sector bytes waiting to be read by the CPU
    ReadData,
    /// Sector bytes expected from the CPU
    WriteData,
    Result,
}

/// Target of a write command while its data is being transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub drive: usize,
    pub head: u8,
    pub sector: u32,
    /// Cylinder, head, record and size code reported in the result
    pub chrn: [u8; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdcState {
    pub phase: FdcPhase,
    pub cursor: usize,
    #[serde(with = "b64")]
    pub command: Vec<u8>,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    #[serde(with = "b64")]
    pub result: Vec<u8>,
    pub drive_control: u8,
    pub card_control: u8,
    pub interrupt: Option<[u8; 2]>,
    pub write: Option<PendingWrite>,
}

/// Controller registers and the command in flight. Data register reads
/// consume bytes, so the phase and cursor live in cells.
#[derive(Debug, Clone, Default)]
pub struct Fdc {
    phase: Cell<FdcPhase>,
    cursor: Cell<usize>,
    command: Vec<u8>,
    data: Vec<u8>,
    result: Vec<u8>,
    drive_control: u8,
    card_control: u8,
    /// ST0 and cylinder of the last seek, for SENSE INTERRUPT STATUS
    interrupt: Option<[u8; 2]>,
    write: Option<PendingWrite>,
}

fn error_result(status: DiskStatus, drive: usize, head: u8, chrn: [u8; 4]) -> [u8; 7] {
    let (st0, st1) = match status {
        DiskStatus::NoDisk => (ST0_ABNORMAL | ST0_NOT_READY, 0),
        DiskStatus::WriteProtected => (ST0_ABNORMAL, ST1_NOT_WRITABLE),
        _ => (ST0_ABNORMAL, ST1_NO_DATA),
    };
    let [c, h, r, n] = chrn;
    [st0 | head << 2 | drive as u8, st1, 0, c, h, r, n]
}

impl Fdc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FdcPhase {
        self.phase.get()
    }

    pub fn drive_control(&self) -> u8 {
        self.drive_control
    }

    /// Register read; anything but status and data reads 0xFF
    pub fn read(&self, register: u16) -> u8 {
        match register {
            REG_STATUS => self.main_status(),
            REG_DATA => self.read_data(),
            _ => 0xFF,
        }
    }

    fn main_status(&self) -> u8 {
        match self.phase.get() {
            FdcPhase::Idle => MSR_RQM,
            FdcPhase::Command => MSR_RQM | MSR_BUSY,
            FdcPhase::ReadData => MSR_RQM | MSR_DIO | MSR_EXM | MSR_BUSY,
            FdcPhase::WriteData => MSR_RQM | MSR_EXM | MSR_BUSY,
            FdcPhase::Result => MSR_RQM | MSR_DIO | MSR_BUSY,
        }
    }

    fn read_data(&self) -> u8 {
        let (bytes, next) = match self.phase.get() {
            FdcPhase::ReadData => (&self.data, FdcPhase::Result),
            FdcPhase::Result => (&self.result, FdcPhase::Idle),
            _ => return 0xFF,
        };
        let cursor = self.cursor.get();
        let val = bytes.get(cursor).copied().unwrap_or(0xFF);
        if cursor + 1 >= bytes.len() {
            self.phase.set(next);
            self.cursor.set(0);
        } else {
            self.cursor.set(cursor + 1);
        }
        val
    }

    pub fn write(&mut self, register: u16, val: u8, disk: &mut DiskController) {
        match register {
            REG_DRIVE_CONTROL => {
                self.drive_control = val;
                disk.set_motor(val & 0x30 != 0);
            }
            REG_CARD_CONTROL => self.card_control = val,
            REG_DATA => self.write_data(val, disk),
            _ => {}
        }
    }

    fn write_data(&mut self, val: u8, disk: &mut DiskController) {
        match self.phase.get() {
            FdcPhase::Idle | FdcPhase::Command => {
                if self.phase.get() == FdcPhase::Idle {
                    self.command.clear();
                    self.phase.set(FdcPhase::Command);
                }
                self.command.push(val);
                if self.command.len() >= command_length(self.command[0] & 0x1F) {
                    self.execute(disk);
                }
            }
            FdcPhase::WriteData => {
                let cursor = self.cursor.get();
                if let Some(byte) = self.data.get_mut(cursor) {
                    *byte = val;
                }
                if cursor + 1 >= self.data.len() {
                    self.commit_write(disk);
                } else {
                    self.cursor.set(cursor + 1);
                }
            }
            FdcPhase::ReadData | FdcPhase::Result => {
                log(LogCategory::Disk, LogLevel::Debug, || {
                    format!("FDC data write {:02X} while the CPU should read", val)
                });
            }
        }
    }

    /// Enter the result phase, or go idle for commands without one
    fn finish(&mut self, result: &[u8]) {
        self.result = result.to_vec();
        self.cursor.set(0);
        self.phase.set(if result.is_empty() {
            FdcPhase::Idle
        } else {
            FdcPhase::Result
        });
    }

    /// Drive and head from the unit byte of the current command
    fn unit(&self) -> (usize, u8) {
        let unit = self.command.get(1).copied().unwrap_or(0);
        ((unit & 0x03) as usize, (unit >> 2) & 0x01)
    }

    /// Cylinder, head, record and size code of a read/write command
    fn chrn(&self) -> [u8; 4] {
        [self.command[2], self.command[3], self.command[4], self.command[5]]
    }

    fn execute(&mut self, disk: &mut DiskController) {
        let opcode = self.command[0] & 0x1F;
        log(LogCategory::Disk, LogLevel::Trace, || {
            format!("FDC command {:02X?}", self.command)
        });
        match opcode {
            SPECIFY => self.finish(&[]),
            SENSE_DRIVE_STATUS => {
                let st3 = self.drive_status(disk);
                self.finish(&[st3]);
            }
            RECALIBRATE => self.seek(disk, 0),
            SEEK => self.seek(disk, self.command[2]),
            SENSE_INTERRUPT => match self.interrupt.take() {
                Some(status) => self.finish(&status),
                None => self.finish(&[ST0_INVALID]),
            },
            READ_ID => self.read_id(disk),
            READ_DATA => self.read_sectors(disk),
            WRITE_DATA => self.start_write(disk),
            _ => {
                log(LogCategory::Disk, LogLevel::Debug, || {
                    format!("FDC: unsupported command {:02X}", self.command[0])
                });
                self.finish(&[ST0_INVALID]);
            }
        }
    }

    fn drive_status(&self, disk: &DiskController) -> u8 {
        let (drive, head) = self.unit();
        let mut st3 = head << 2 | drive as u8;
        if disk.is_inserted(drive) {
            st3 |= ST3_READY;
            if sides(disk, drive) == 2 {
                st3 |= ST3_TWO_SIDE;
            }
        }
        if disk.is_read_only(drive) {
            st3 |= ST3_WRITE_PROTECT;
        }
        if disk.track(drive) == Some(0) {
            st3 |= ST3_TRACK0;
        }
        st3
    }

    fn seek(&mut self, disk: &mut DiskController, track: u8) {
        let (drive, head) = self.unit();
        let flags = match disk.execute(&DiskCommand::Seek { drive, track }) {
            DiskStatus::Ok => ST0_SEEK_END,
            DiskStatus::NoDisk => ST0_SEEK_END | ST0_ABNORMAL | ST0_NOT_READY,
            _ => ST0_SEEK_END | ST0_ABNORMAL,
        };
        let cylinder = disk.track(drive).unwrap_or(0);
        self.interrupt = Some([flags | head << 2 | drive as u8, cylinder]);
        self.finish(&[]);
    }

    fn read_id(&mut self, disk: &DiskController) {
        let (drive, head) = self.unit();
        let track = disk.track(drive).unwrap_or(0);
        let chrn = [track, head, 1, 2];
        if !disk.is_inserted(drive) {
            self.finish(&error_result(DiskStatus::NoDisk, drive, head, chrn));
            return;
        }
        self.finish(&[head << 2 | drive as u8, 0, 0, track, head, 1, 2]);
    }

    /// READ DATA: records R through EOT of one track. The result reports the
    /// last record transferred.
    fn read_sectors(&mut self, disk: &mut DiskController) {
        let (drive, head) = self.unit();
        let [c, h, r, n] = self.chrn();
        let last = self.command[6].max(r);
        let sides = sides(disk, drive);

        self.data.clear();
        for record in r..=last {
            let status = match linear_sector(c, h, record, sides) {
                Some(sector) => disk.execute(&DiskCommand::ReadSector { drive, sector }),
                None => DiskStatus::SectorNotFound,
            };
            if status != DiskStatus::Ok {
                self.data.clear();
                self.finish(&error_result(status, drive, head, [c, h, record, n]));
                return;
            }
            self.data.extend_from_slice(disk.buffer());
        }

        self.result = vec![head << 2 | drive as u8, 0, 0, c, h, last, n];
        self.cursor.set(0);
        self.phase.set(FdcPhase::ReadData);
    }

    /// WRITE DATA: checks the target up front, then collects the sector bytes
    fn start_write(&mut self, disk: &DiskController) {
        let (drive, head) = self.unit();
        let [c, h, r, n] = self.chrn();
        let last = self.command[6].max(r);
        let sides = sides(disk, drive);

        let fail = |status| error_result(status, drive, head, [c, h, r, n]);
        if !disk.is_inserted(drive) {
            self.finish(&fail(DiskStatus::NoDisk));
            return;
        }
        if disk.is_read_only(drive) {
            self.finish(&fail(DiskStatus::WriteProtected));
            return;
        }
        let sectors = disk.sector_count(drive).unwrap_or(0);
        let (Some(first), Some(end)) = (
            linear_sector(c, h, r, sides),
            linear_sector(c, h, last, sides),
        ) else {
            self.finish(&fail(DiskStatus::SectorNotFound));
            return;
        };
        if end >= sectors {
            self.finish(&fail(DiskStatus::SectorNotFound));
            return;
        }

        self.data = vec![0; (end - first + 1) as usize * SECTOR_SIZE];
        self.write = Some(PendingWrite {
            drive,
            head,
            sector: first,
            chrn: [c, h, last, n],
        });
        self.cursor.set(0);
        self.phase.set(FdcPhase::WriteData);
    }

    fn commit_write(&mut self, disk: &mut DiskController) {
        let Some(write) = self.write.take() else {
            self.finish(&[ST0_INVALID]);
            return;
        };
        let data = std::mem::take(&mut self.data);
        let failed = data
            .chunks(SECTOR_SIZE)
            .zip(write.sector..)
            .map(|(chunk, sector)| {
                disk.execute(&DiskCommand::WriteSector {
                    drive: write.drive,
                    sector,
                    data: chunk.to_vec(),
                })
            })
            .find(|status| *status != DiskStatus::Ok);

        let [c, h, r, n] = write.chrn;
        match failed {
            Some(status) => self.finish(&error_result(status, write.drive, write.head, write.chrn)),
            None => self.finish(&[write.head << 2 | write.drive as u8, 0, 0, c, h, r, n]),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> FdcState {
        FdcState {
            phase: self.phase.get(),
            cursor: self.cursor.get(),
            command: self.command.clone(),
            data: self.data.clone(),
            result: self.result.clone(),
            drive_control: self.drive_control,
            card_control: self.card_control,
            interrupt: self.interrupt,
            write: self.write,
        }
    }

    /// The cursor must point into the buffer of the saved phase
    pub fn validate_state(state: &FdcState) -> std::result::Result<(), String> {
        let active = match state.phase {
            FdcPhase::ReadData | FdcPhase::WriteData => state.data.len(),
            FdcPhase::Result => state.result.len(),
            FdcPhase::Idle | FdcPhase::Command => usize::MAX,
        };
        if state.cursor >= active {
            return Err(format!(
                "controller cursor {} outside its {} byte buffer",
                state.cursor, active
            ));
        }
        if state.data.len() % SECTOR_SIZE != 0 || state.command.len() > 9 {
            return Err("controller buffers are malformed".into());
        }
        match (&state.write, state.phase) {
            (Some(write), FdcPhase::WriteData) if write.drive < DRIVE_COUNT => Ok(()),
            (None, phase) if phase != FdcPhase::WriteData => Ok(()),
            _ => Err("controller write target does not match its phase".into()),
        }
    }

    pub fn restore_state(&mut self, state: FdcState) {
        self.phase.set(state.phase);
        self.cursor.set(state.cursor);
        self.command = state.command;
        self.data = state.data;
        self.result = state.result;
        self.drive_control = state.drive_control;
        self.card_control = state.card_control;
        self.interrupt = state.interrupt;
        self.write = state.write;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOUBLE_SIDED: usize = 1440;

    /// Every sector filled with the low byte of its linear number
    fn disk_with(sectors: usize, read_only: bool) -> DiskController {
        let mut disk = DiskController::new();
        let image = (0..sectors * SECTOR_SIZE)
            .map(|i| (i / SECTOR_SIZE) as u8)
            .collect();
        disk.insert(0, image, "image", read_only).unwrap();
        disk
    }

    fn send(fdc: &mut Fdc, disk: &mut DiskController, bytes: &[u8]) {
        for &byte in bytes {
            fdc.write(REG_DATA, byte, disk);
        }
    }

    fn result(fdc: &Fdc) -> Vec<u8> {
        let mut out = Vec::new();
        while fdc.phase() == FdcPhase::Result {
            out.push(fdc.read(REG_DATA));
        }
        out
    }

    #[test]
    fn test_read_data_transfers_sectors() {
        let mut disk = disk_with(DOUBLE_SIDED, false);
        let mut fdc = Fdc::new();
        assert_eq!(fdc.read(REG_STATUS), MSR_RQM);

        // cylinder 1, head 1, records 2-3: linear sectors 28 and 29
        send(&mut fdc, &mut disk, &[0x46, 0x04, 1, 1, 2, 2, 3, 0x1B]);
        assert_eq!(fdc.read(REG_STATUS), MSR_RQM | MSR_BUSY);
        send(&mut fdc, &mut disk, &[0xFF]);
        assert_eq!(fdc.read(REG_STATUS), 0xF0);

        let bytes: Vec<u8> = (0..2 * SECTOR_SIZE).map(|_| fdc.read(REG_DATA)).collect();
        assert!(bytes[..SECTOR_SIZE].iter().all(|&b| b == 28));
        assert!(bytes[SECTOR_SIZE..].iter().all(|&b| b == 29));
        assert_eq!(fdc.read(REG_STATUS), MSR_RQM | MSR_DIO | MSR_BUSY);
        assert_eq!(result(&fdc), vec![0x04, 0, 0, 1, 1, 3, 2]);
        assert_eq!(fdc.read(REG_STATUS), MSR_RQM);
    }

    #[test]
    fn test_write_data_lands_in_overlay() {
        let mut disk = disk_with(DOUBLE_SIDED, false);
        let mut fdc = Fdc::new();
        send(&mut fdc, &mut disk, &[0x45, 0x00, 0, 0, 5, 2, 5, 0x1B, 0xFF]);
        assert_eq!(fdc.phase(), FdcPhase::WriteData);
        assert_eq!(fdc.read(REG_STATUS), MSR_RQM | MSR_EXM | MSR_BUSY);
        send(&mut fdc, &mut disk, &[0xA5; SECTOR_SIZE]);
        assert_eq!(result(&fdc), vec![0x00, 0, 0, 0, 0, 5, 2]);

        disk.execute(&DiskCommand::ReadSector { drive: 0, sector: 4 });
        assert!(disk.buffer().iter().all(|&b| b == 0xA5));
    }

    #[test]
    fn test_write_protected_disk_fails_before_transfer() {
        let mut disk = disk_with(DOUBLE_SIDED, true);
        let mut fdc = Fdc::new();
        send(&mut fdc, &mut disk, &[0x45, 0x00, 0, 0, 1, 2, 1, 0x1B, 0xFF]);
        let status = result(&fdc);
        assert_eq!(status[0] & ST0_ABNORMAL, ST0_ABNORMAL);
        assert_eq!(status[1], ST1_NOT_WRITABLE);
        assert_eq!(fdc.phase(), FdcPhase::Idle);
    }

    #[test]
    fn test_missing_disk_and_bad_record() {
        let mut disk = disk_with(DOUBLE_SIDED, false);
        let mut fdc = Fdc::new();
        send(&mut fdc, &mut disk, &[0x46, 0x01, 0, 0, 1, 2, 1, 0x1B, 0xFF]);
        assert_eq!(result(&fdc)[0], ST0_ABNORMAL | ST0_NOT_READY | 0x01);

        send(&mut fdc, &mut disk, &[0x46, 0x00, 0, 0, 10, 2, 10, 0x1B, 0xFF]);
        let status = result(&fdc);
        assert_eq!(status[1], ST1_NO_DATA);
        assert_eq!(status[5], 10);
    }

    #[test]
    fn test_seek_then_sense_interrupt() {
        let mut disk = disk_with(DOUBLE_SIDED, false);
        let mut fdc = Fdc::new();
        send(&mut fdc, &mut disk, &[SEEK, 0x00, 12]);
        assert_eq!(fdc.phase(), FdcPhase::Idle);
        assert_eq!(disk.track(0), Some(12));
        send(&mut fdc, &mut disk, &[SENSE_INTERRUPT]);
        assert_eq!(result(&fdc), vec![ST0_SEEK_END, 12]);
        // nothing pending any more
        send(&mut fdc, &mut disk, &[SENSE_INTERRUPT]);
        assert_eq!(result(&fdc), vec![ST0_INVALID]);

        send(&mut fdc, &mut disk, &[RECALIBRATE, 0x00]);
        send(&mut fdc, &mut disk, &[SENSE_DRIVE_STATUS, 0x00]);
        assert_eq!(
            result(&fdc),
            vec![ST3_READY | ST3_TRACK0 | ST3_TWO_SIDE]
        );
    }

    #[test]
    fn test_single_sided_geometry() {
        let mut disk = disk_with(720, false);
        let mut fdc = Fdc::new();
        send(&mut fdc, &mut disk, &[SENSE_DRIVE_STATUS, 0x00]);
        assert_eq!(result(&fdc)[0] & ST3_TWO_SIDE, 0);
        // cylinder 1 record 1 is sector 9 on one side
        send(&mut fdc, &mut disk, &[0x46, 0x00, 1, 0, 1, 2, 1, 0x1B, 0xFF]);
        assert_eq!(fdc.read(REG_DATA), 9);
    }

    #[test]
    fn test_drive_control_runs_motor() {
        let mut disk = disk_with(DOUBLE_SIDED, false);
        let mut fdc = Fdc::new();
        fdc.write(REG_DRIVE_CONTROL, 0x10, &mut disk);
        assert!(disk.motor_on());
        assert_eq!(fdc.drive_control(), 0x10);
        fdc.write(REG_DRIVE_CONTROL, 0x00, &mut disk);
        assert!(!disk.motor_on());
        assert_eq!(fdc.read(REG_CARD_CONTROL), 0xFF);
    }

    #[test]
    fn test_state_mid_transfer() {
        let mut disk = disk_with(DOUBLE_SIDED, false);
        let mut fdc = Fdc::new();
        send(&mut fdc, &mut disk, &[0x46, 0x00, 0, 0, 3, 2, 3, 0x1B, 0xFF]);
        for _ in 0..100 {
            fdc.read(REG_DATA);
        }
        let state = fdc.state();
        assert!(Fdc::validate_state(&state).is_ok());

        let mut other = Fdc::new();
        other.restore_state(state.clone());
        assert_eq!(other.state(), state);
        let rest: Vec<u8> = (100..SECTOR_SIZE).map(|_| other.read(REG_DATA)).collect();
        assert!(rest.iter().all(|&b| b == 2));
        assert_eq!(other.phase(), FdcPhase::Result);

        let mut broken = state;
        broken.cursor = SECTOR_SIZE;
        assert!(Fdc::validate_state(&broken).is_err());
    }
}
