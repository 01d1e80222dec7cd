use emu_core::System;
use emu_msx2::{Msx2System, FRAMEBUFFER_LEN};

fn main() {
    let mut sys = Msx2System::default();
    sys.mount_ram(3, 0).unwrap();
    let mut fb = vec![0u16; FRAMEBUFFER_LEN];
    sys.step_frame(&mut fb).unwrap();
    println!("Headless MSX2 frame: {} pixels", fb.len());
    let state = sys.save_state().unwrap();
    println!("Save-state: {} bytes", state.len());
}
