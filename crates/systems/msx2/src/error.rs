//! Error types for the MSX2 core

use thiserror::Error;

/// Reasons a save-state blob is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateFormatError {
    #[error("Not an MSX2 save state (bad magic)")]
    BadMagic,
    #[error("Save state version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },
    #[error("Save state truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Save state checksum mismatch")]
    Checksum,
    #[error("Save state payload is undecodable: {0}")]
    Payload(String),
    #[error("Save state does not match this machine: {0}")]
    Mismatch(String),
}

/// MSX2 emulator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Msx2Error {
    #[error("Configuration order error: {0}")]
    ConfigurationOrder(String),
    #[error("Invalid slot: primary {primary}, secondary {secondary}, page {page}")]
    InvalidSlot { primary: u8, secondary: u8, page: u8 },
    #[error("Unsupported mapper code: {0}")]
    UnsupportedMapper(u8),
    #[error("Invalid drive id: {0}")]
    InvalidDriveId(usize),
    #[error("Invalid handle: {0}")]
    InvalidHandle(u64),
    #[error("Invalid save state: {0}")]
    StateFormat(#[from] StateFormatError),
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    #[error("Unknown key code: {0:#04X}")]
    UnknownKeyCode(u8),
}

pub type Result<T> = std::result::Result<T, Msx2Error>;
