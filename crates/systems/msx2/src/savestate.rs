//! Save-state blob format
//!
//! ```text
//! 0..4    magic "MSX2"
//! 4..6    format version, u16 LE
//! 6..10   payload length, u32 LE
//! 10..14  CRC-32 of the payload, u32 LE
//! 14..    payload: JSON encoded `MachineState`
//! ```
//!
//! Byte arrays inside the payload are base64 strings. Every map in the state
//! is ordered, so two saves of the same machine are byte-identical.

use serde::{Deserialize, Serialize};

use emu_core::apu::TimingMode;
use emu_core::cpu_z80::Z80Registers;

use crate::disk::DiskState;
use crate::error::StateFormatError;
use crate::fdc::FdcState;
use crate::kanji::KanjiState;
use crate::keyboard::KeyboardState;
use crate::mappers::MapperState;
use crate::pac::PacState;
use crate::psg::PsgState;
use crate::rtc::RtcState;
use crate::slots::SlotState;
use crate::vdp::VdpState;

pub const MAGIC: &[u8; 4] = b"MSX2";
pub const FORMAT_VERSION: u16 = 2;
pub const HEADER_LEN: usize = 14;

/// Cartridge identity plus its mutable mapper state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeState {
    pub rom_len: usize,
    pub rom_crc: u32,
    pub mapper: MapperState,
}

/// Everything mutable in a running machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub timing: TimingMode,
    pub cpu: Z80Registers,
    pub carry_cycles: u32,
    pub frame: u64,
    pub slots: SlotState,
    pub cartridge: Option<CartridgeState>,
    pub vdp: VdpState,
    pub psg: PsgState,
    pub kanji: KanjiState,
    pub keyboard: KeyboardState,
    pub rtc: RtcState,
    pub pac: PacState,
    #[serde(with = "b64")]
    pub io: Vec<u8>,
    pub fdc: FdcState,
    pub disk: DiskState,
}

/// Wrap a machine state into a blob
pub fn encode(state: &MachineState) -> Result<Vec<u8>, StateFormatError> {
    let payload =
        serde_json::to_vec(state).map_err(|e| StateFormatError::Payload(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        StateFormatError::Payload(format!("payload of {} bytes is too large", payload.len()))
    })?;

    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&len.to_le_bytes());
    blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Check the header and checksum of a blob and decode its payload
pub fn decode(blob: &[u8]) -> Result<MachineState, StateFormatError> {
    if blob.len() < MAGIC.len() || &blob[..MAGIC.len()] != MAGIC {
        return Err(StateFormatError::BadMagic);
    }
    if blob.len() < HEADER_LEN {
        return Err(StateFormatError::Truncated {
            expected: HEADER_LEN,
            actual: blob.len(),
        });
    }

    let version = u16::from_le_bytes([blob[4], blob[5]]);
    if version != FORMAT_VERSION {
        return Err(StateFormatError::VersionMismatch {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let expected = HEADER_LEN + le_u32(&blob[6..10]) as usize;
    if blob.len() != expected {
        return Err(StateFormatError::Truncated {
            expected,
            actual: blob.len(),
        });
    }

    let payload = &blob[HEADER_LEN..];
    if crc32fast::hash(payload) != le_u32(&blob[10..14]) {
        return Err(StateFormatError::Checksum);
    }

    serde_json::from_slice(payload).map_err(|e| StateFormatError::Payload(e.to_string()))
}

/// Serde adapters storing byte buffers as base64 strings
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    fn decode<E: Error>(text: &str) -> Result<Vec<u8>, E> {
        BASE64.decode(text.as_bytes()).map_err(E::custom)
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text)
    }

    /// `Vec<Vec<u8>>` as a list of strings
    pub mod vec {
        use super::*;

        pub fn serialize<S: Serializer>(
            blocks: &[Vec<u8>],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(blocks.iter().map(|block| BASE64.encode(block)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<u8>>, D::Error> {
            Vec::<String>::deserialize(deserializer)?
                .iter()
                .map(|text| decode(text))
                .collect()
        }
    }

    /// `Option<Vec<u8>>` as an optional string
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| decode(&text))
                .transpose()
        }
    }

    /// Sector overlays: `BTreeMap<u32, Vec<u8>>` as an ordered map of strings
    pub mod map {
        use super::*;
        use std::collections::BTreeMap;

        pub fn serialize<S: Serializer>(
            map: &BTreeMap<u32, Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_map(map.iter().map(|(key, bytes)| (key, BASE64.encode(bytes))))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<BTreeMap<u32, Vec<u8>>, D::Error> {
            BTreeMap::<u32, String>::deserialize(deserializer)?
                .into_iter()
                .map(|(key, text)| decode(&text).map(|bytes| (key, bytes)))
                .collect()
        }
    }
}
