//! Machine profiles
//!
//! A profile is a JSON file describing the slot topology and the images to
//! mount before the first frame. Relative file names are resolved against
//! the directory holding the profile.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use emu_msx2::Msx2System;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub primary: u8,
    #[serde(default)]
    pub secondary: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomMount {
    pub file: PathBuf,
    pub primary: u8,
    #[serde(default)]
    pub secondary: u8,
    pub page: u8,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialKeys {
    #[serde(default)]
    pub select: u8,
    #[serde(default)]
    pub start: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineProfile {
    #[serde(default)]
    pub expanded: [bool; 4],
    #[serde(default)]
    pub ram: Vec<SlotRef>,
    #[serde(default)]
    pub roms: Vec<RomMount>,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default)]
    pub special_keys: SpecialKeys,
}

impl Default for MachineProfile {
    /// 64KB of RAM in slot 3, nothing else
    fn default() -> Self {
        Self {
            expanded: [false; 4],
            ram: vec![SlotRef {
                primary: 3,
                secondary: 0,
            }],
            roms: Vec::new(),
            font: None,
            special_keys: SpecialKeys::default(),
        }
    }
}

impl MachineProfile {
    /// Load a profile and make its file names absolute
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let mut profile: MachineProfile = serde_json::from_str(&contents)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        if let Some(base) = path.parent() {
            profile.resolve_paths(base);
        }
        Ok(profile)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for rom in &mut self.roms {
            if rom.file.is_relative() {
                rom.file = base.join(&rom.file);
            }
        }
        if let Some(font) = self.font.as_mut() {
            if font.is_relative() {
                *font = base.join(&*font);
            }
        }
    }

    /// Build the slot topology and mount every image
    pub fn apply(&self, system: &mut Msx2System) -> Result<()> {
        system.configure_expansion(self.expanded)?;
        for slot in &self.ram {
            system.mount_ram(slot.primary, slot.secondary)?;
        }
        for rom in &self.roms {
            let data =
                fs::read(&rom.file).with_context(|| format!("reading {}", rom.file.display()))?;
            let label = if rom.label.is_empty() {
                rom.file.display().to_string()
            } else {
                rom.label.clone()
            };
            system
                .mount_rom(rom.primary, rom.secondary, rom.page, &data, &label)
                .with_context(|| format!("mounting {}", label))?;
        }
        if let Some(font) = &self.font {
            let data = fs::read(font).with_context(|| format!("reading {}", font.display()))?;
            system.load_font(&data)?;
        }
        system.set_special_keys(self.special_keys.select, self.special_keys.start)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile: MachineProfile = serde_json::from_str(
            r#"{
                "expanded": [false, false, false, true],
                "ram": [{"primary": 3, "secondary": 2}],
                "roms": [{"file": "bios.rom", "primary": 0, "page": 0, "label": "MAIN"}]
            }"#,
        )
        .unwrap();
        assert_eq!(profile.roms[0].secondary, 0);
        assert_eq!(profile.font, None);
        assert_eq!(profile.special_keys, SpecialKeys::default());
    }

    #[test]
    fn test_relative_paths_follow_profile() {
        let mut profile = MachineProfile {
            roms: vec![RomMount {
                file: PathBuf::from("bios.rom"),
                primary: 0,
                secondary: 0,
                page: 0,
                label: String::new(),
            }],
            font: Some(PathBuf::from("kanji.rom")),
            ..MachineProfile::default()
        };
        profile.resolve_paths(Path::new("/machines/msx2"));
        assert_eq!(profile.roms[0].file, PathBuf::from("/machines/msx2/bios.rom"));
        assert_eq!(profile.font, Some(PathBuf::from("/machines/msx2/kanji.rom")));
    }

    #[test]
    fn test_default_profile_applies() {
        let mut system = Msx2System::new();
        MachineProfile::default().apply(&mut system).unwrap();
        assert_eq!(system.slot_layout().len(), 8);
    }
}
