//! MSX2 emulator core
//!
//! Slot-addressed memory, cartridge mappers, a frame orchestrator and save
//! states for the MSX2 home computer.
//!
//! # Architecture
//!
//! - **CPU**: Zilog Z80A @ 3.58 MHz
//! - **Slots**: 4 primary slots, each optionally expanded to 4 secondary
//!   slots of eight 8KB pages; RAM behind the MSX2 memory mapper (0xFC-0xFF)
//! - **Cartridge**: slot 1-0, pages 2-5, with ASCII8/ASCII16/Konami/SCC
//!   bank switching
//! - **VDP**: Yamaha V9938 register file and 128 KB VRAM
//! - **PSG**: General Instrument AY-3-8910, joysticks on register 14
//! - **PPI**: slot select and keyboard matrix
//! - **Disk**: two drives, reached by host commands or by the disk BIOS
//!   through a TC8566AF register window
//! - **RTC**: Ricoh RP5C01 clock counting emulated time
//! - **FM-PAC**: 8KB battery-backed SRAM on `FM` pages
//!
//! Hosts either drive an `Msx2System` directly or go through the
//! handle-based `Host`.

mod bus;
pub mod disk;
mod error;
pub mod fdc;
pub mod host;
pub mod kanji;
pub mod keyboard;
pub mod mappers;
pub mod pac;
pub mod psg;
pub mod rtc;
pub mod savestate;
pub mod slots;
mod system;
pub mod vdp;

pub use bus::Msx2Bus;
pub use disk::{DiskCommand, DiskStatus, DRIVE_COUNT, SECTOR_SIZE};
pub use error::{Msx2Error, Result, StateFormatError};
pub use host::{Handle, Host};
pub use emu_core::apu::TimingMode;
pub use mappers::RomKind;
pub use slots::{Location, PageBacking, PageInfo};
pub use keyboard::MATRIX_ROWS;
pub use system::{Msx2System, Phase};
pub use vdp::{FRAMEBUFFER_LEN, SCREEN_HEIGHT, SCREEN_WIDTH};
