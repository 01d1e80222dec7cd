//! Core emulator primitives and traits.

pub mod apu;
pub mod cpu_z80;
pub mod logging;
pub mod types {
    use serde::{Deserialize, Serialize};

    /// A host-side RGB565 surface.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u16>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }

        /// Expand one RGB565 pixel to 0xAARRGGBB.
        pub fn rgb565_to_argb(pixel: u16) -> u32 {
            let r = ((pixel >> 11) & 0x1F) as u32;
            let g = ((pixel >> 5) & 0x3F) as u32;
            let b = (pixel & 0x1F) as u32;
            0xFF00_0000 | ((r << 3 | r >> 2) << 16) | ((g << 2 | g >> 4) << 8) | (b << 3 | b >> 2)
        }
    }

    pub type AudioSample = i16;
}

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self) -> u32;
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Emulate exactly one frame and render it into the caller's surface.
    ///
    /// The surface is borrowed for the duration of the call only.
    fn step_frame(&mut self, out: &mut [u16]) -> Result<(), Self::Error>;

    /// Serialize the complete mutable machine state.
    /// Note: Save states should NOT include ROM/cartridge data.
    fn save_state(&self) -> Result<Vec<u8>, Self::Error>;

    /// Replace the machine state with a previously saved one.
    /// Returns error if the state is incompatible or requires different mounted media;
    /// the running state is left untouched in that case.
    fn load_state(&mut self, blob: &[u8]) -> Result<(), Self::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false // Default: no save state support
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 100);
        assert_eq!(f.width, 10);
        assert_eq!(f.height, 10);
    }

    #[test]
    fn rgb565_expansion() {
        assert_eq!(types::Frame::rgb565_to_argb(0x0000), 0xFF00_0000);
        assert_eq!(types::Frame::rgb565_to_argb(0xFFFF), 0xFFFF_FFFF);
        assert_eq!(types::Frame::rgb565_to_argb(0xF800), 0xFFFF_0000);
    }

    struct MockSystem {
        counter: u8,
    }

    #[derive(Debug)]
    struct MockError;

    impl std::fmt::Display for MockError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "mock error")
        }
    }

    impl std::error::Error for MockError {}

    impl System for MockSystem {
        type Error = MockError;

        fn reset(&mut self) {
            self.counter = 0;
        }

        fn step_frame(&mut self, out: &mut [u16]) -> Result<(), Self::Error> {
            self.counter = self.counter.wrapping_add(1);
            out.fill(self.counter as u16);
            Ok(())
        }

        fn save_state(&self) -> Result<Vec<u8>, Self::Error> {
            Ok(vec![1, self.counter])
        }

        fn load_state(&mut self, blob: &[u8]) -> Result<(), Self::Error> {
            match blob {
                [1, counter] => {
                    self.counter = *counter;
                    Ok(())
                }
                _ => Err(MockError),
            }
        }
    }

    #[test]
    fn mock_system_save_load_roundtrip() {
        let mut sys = MockSystem { counter: 0 };
        let mut out = [0u16; 4];
        sys.step_frame(&mut out).unwrap();
        let blob = sys.save_state().unwrap();

        let mut sys2 = MockSystem { counter: 9 };
        assert!(sys2.load_state(&blob).is_ok());
        assert_eq!(sys2.counter, 1);
        assert!(sys2.load_state(&[2]).is_err());
    }

    #[test]
    fn test_system_supports_save_states() {
        let sys = MockSystem { counter: 0 };
        // Default implementation returns false
        assert!(!sys.supports_save_states());
    }
}
