//! Core audio components shared by the emulated systems.
//!
//! ## Components
//!
//! - **AudioChip trait**: Common interface for pluggable sound chips
//! - **TimingMode**: Video-standard timing (NTSC 60 Hz / PAL 50 Hz) the
//!   frame loop and sound chips derive their clocks from

pub mod audio_chip;
pub mod timing;

pub use audio_chip::AudioChip;
pub use timing::TimingMode;
