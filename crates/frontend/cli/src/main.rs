mod config;

use anyhow::{bail, Context, Result};
use clap::Parser;
use emu_core::logging::{LogConfig, LogLevel};
use emu_core::types::Frame;
use emu_msx2::{Msx2System, RomKind, TimingMode, FRAMEBUFFER_LEN, SCREEN_HEIGHT, SCREEN_WIDTH};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::config::MachineProfile;

#[derive(Parser)]
#[command(about = "Headless MSX2 runner")]
struct Args {
    /// Machine profile (JSON); defaults to 64KB RAM in slot 3
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Cartridge image for slot 1
    #[arg(long)]
    rom: Option<PathBuf>,

    /// Cartridge mapper: normal, ascii8, ascii8-sram, ascii16, ascii16-sram, konami-scc, konami
    #[arg(long, default_value = "normal")]
    mapper: String,

    /// Disk image for drive A
    #[arg(long)]
    disk_a: Option<PathBuf>,

    /// Disk image for drive B
    #[arg(long)]
    disk_b: Option<PathBuf>,

    /// Insert disks write-protected
    #[arg(long, default_value_t = false)]
    read_only: bool,

    /// Run a 50 Hz PAL machine instead of NTSC
    #[arg(long, default_value_t = false)]
    pal: bool,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Joypad 1 bits held for the whole run
    #[arg(long, default_value_t = 0)]
    pad1: u8,

    /// Text typed one key every other frame
    #[arg(long)]
    type_text: Option<String>,

    /// Restore this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state after the last frame
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Write the last frame as PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "off")]
    log_level: String,

    /// Send core logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// SHA-256 hex digest, used as disk identity
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn insert_disk(system: &mut Msx2System, drive: usize, path: &Path, read_only: bool) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let hash = sha256_hex(&data);
    log::info!("drive {}: {} ({})", drive, path.display(), hash);
    system.insert_disk(drive, data, &hash, read_only)?;
    Ok(())
}

fn write_png(path: &Path, pixels: &[u16]) -> Result<()> {
    let mut rgb = Vec::with_capacity(pixels.len() * 3);
    for &pixel in pixels {
        let argb = Frame::rgb565_to_argb(pixel);
        rgb.extend_from_slice(&[(argb >> 16) as u8, (argb >> 8) as u8, argb as u8]);
    }
    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(writer, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&rgb)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let Some(level) = LogLevel::from_str(&args.log_level) else {
        bail!("Unknown log level: {}", args.log_level);
    };
    let log_config = LogConfig::global();
    log_config.set_global_level(level);
    if let Some(path) = &args.log_file {
        log_config.set_log_file(path.clone())?;
    }

    let profile = match &args.profile {
        Some(path) => MachineProfile::load(path)?,
        None => MachineProfile::default(),
    };

    let timing = if args.pal {
        TimingMode::Pal
    } else {
        TimingMode::Ntsc
    };
    let mut system = Msx2System::with_timing(timing);
    profile.apply(&mut system)?;
    for row in system.slot_layout() {
        log::debug!(
            "slot {}-{} page {}: {}",
            row.primary,
            row.secondary,
            row.page,
            row.description
        );
    }

    if let Some(path) = &args.rom {
        let Some(kind) = RomKind::from_name(&args.mapper) else {
            bail!("Unknown mapper: {}", args.mapper);
        };
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        log::info!("cartridge: {} as {:?}", path.display(), kind);
        system.load_rom(data, kind);
    }
    if let Some(path) = &args.disk_a {
        insert_disk(&mut system, 0, path, args.read_only)?;
    }
    if let Some(path) = &args.disk_b {
        insert_disk(&mut system, 1, path, args.read_only)?;
    }

    if let Some(path) = &args.load_state {
        let blob = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        system.quick_load(&blob)?;
        log::info!("restored state from {}", path.display());
    }

    let typed: Vec<u8> = args
        .type_text
        .as_deref()
        .map(|text| text.bytes().collect())
        .unwrap_or_default();
    let mut framebuffer = vec![0u16; FRAMEBUFFER_LEN];
    let mut audio = Vec::new();
    for frame in 0..args.frames as usize {
        // Key down on even frames, released on odd ones so repeats register
        let key = if frame % 2 == 0 {
            typed.get(frame / 2).copied().unwrap_or(0)
        } else {
            0
        };
        system.tick(args.pad1, 0, key, &mut framebuffer)?;
        system.take_audio(&mut audio);
    }

    let pixels: Vec<u8> = framebuffer.iter().flat_map(|p| p.to_le_bytes()).collect();
    println!(
        "{} frames, {} audio samples, framebuffer {}",
        args.frames,
        audio.len(),
        sha256_hex(&pixels)
    );

    if let Some(path) = &args.screenshot {
        write_png(path, &framebuffer)?;
        log::info!("screenshot written to {}", path.display());
    }
    if let Some(path) = &args.save_state {
        fs::write(path, system.quick_save()?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("state saved to {}", path.display());
    }

    Ok(())
}
