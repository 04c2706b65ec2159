//! Persisted binary formats: the sub-chunk envelope and world metadata.
//!
//! The envelope is a versioned little-endian frame around the raw block and
//! packed-light arrays. The actual storage backend is external; see
//! [`crate::store`] for the interface and the bundled implementations.

use crate::coords::SUB_VOLUME;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slopworld_core::BlockId;
use thiserror::Error;

/// Envelope magic: "SLOP".
pub const SUB_CHUNK_MAGIC: u32 = 0x534C_4F50;

/// Current envelope version.
pub const SUB_CHUNK_VERSION: u16 = 1;

/// Flags bit 0: light data present.
pub const FLAG_HAS_LIGHT: u32 = 1;

/// Envelope header size in bytes.
const HEADER_LEN: usize = 4 + 2 + 4 + 4 + 4;

/// Decoding failures for the sub-chunk envelope.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("bad sub-chunk magic 0x{0:08X}")]
    BadMagic(u32),
    #[error("unsupported sub-chunk version {0}")]
    UnsupportedVersion(u16),
    #[error("envelope truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },
    #[error("{field} length {value} does not match the sub-chunk volume")]
    LengthMismatch { field: &'static str, value: u32 },
}

/// Decoded envelope contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubChunkPayload {
    pub blocks: Vec<BlockId>,
    /// Packed nibbles, high = sky, low = block; absent when the envelope
    /// was saved without light.
    pub light: Option<Vec<u8>>,
}

/// Encode block (and optionally light) arrays into the envelope.
pub fn encode_sub_chunk(blocks: &[BlockId], light: Option<&[u8]>) -> Vec<u8> {
    debug_assert_eq!(blocks.len(), SUB_VOLUME);
    let block_len = (blocks.len() * 2) as u32;
    let light_len = light.map_or(0, |l| l.len() as u32);
    let flags = if light.is_some() { FLAG_HAS_LIGHT } else { 0 };

    let mut bytes = Vec::with_capacity(HEADER_LEN + block_len as usize + light_len as usize);
    bytes.extend_from_slice(&SUB_CHUNK_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&SUB_CHUNK_VERSION.to_le_bytes());
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&block_len.to_le_bytes());
    bytes.extend_from_slice(&light_len.to_le_bytes());
    for &block in blocks {
        bytes.extend_from_slice(&block.to_le_bytes());
    }
    if let Some(light) = light {
        debug_assert_eq!(light.len(), SUB_VOLUME);
        bytes.extend_from_slice(light);
    }
    bytes
}

/// Decode an envelope back into its arrays.
pub fn decode_sub_chunk(bytes: &[u8]) -> Result<SubChunkPayload, PersistError> {
    if bytes.len() < HEADER_LEN {
        return Err(PersistError::Truncated {
            needed: HEADER_LEN,
            have: bytes.len(),
        });
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != SUB_CHUNK_MAGIC {
        return Err(PersistError::BadMagic(magic));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SUB_CHUNK_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }
    let flags = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let block_len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
    let light_len = u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]);

    if block_len as usize != SUB_VOLUME * 2 {
        return Err(PersistError::LengthMismatch {
            field: "block data",
            value: block_len,
        });
    }
    let has_light = flags & FLAG_HAS_LIGHT != 0;
    if has_light && light_len as usize != SUB_VOLUME {
        return Err(PersistError::LengthMismatch {
            field: "light data",
            value: light_len,
        });
    }

    let needed = HEADER_LEN + block_len as usize + if has_light { light_len as usize } else { 0 };
    if bytes.len() < needed {
        return Err(PersistError::Truncated {
            needed,
            have: bytes.len(),
        });
    }

    let mut blocks = Vec::with_capacity(SUB_VOLUME);
    let block_bytes = &bytes[HEADER_LEN..HEADER_LEN + block_len as usize];
    for pair in block_bytes.chunks_exact(2) {
        blocks.push(u16::from_le_bytes([pair[0], pair[1]]));
    }
    let light = has_light.then(|| {
        let start = HEADER_LEN + block_len as usize;
        bytes[start..start + light_len as usize].to_vec()
    });

    Ok(SubChunkPayload { blocks, light })
}

/// Current world metadata schema version.
pub const WORLD_META_VERSION: u16 = 1;

/// Small structured record persisted in the metadata namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMeta {
    pub version: u16,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
    pub last_saved_at: DateTime<Utc>,
    pub player_position: Option<[f64; 3]>,
}

impl WorldMeta {
    /// Fresh metadata for a newly created world.
    pub fn new(seed: u64) -> Self {
        let now = Utc::now();
        Self {
            version: WORLD_META_VERSION,
            seed,
            created_at: now,
            last_saved_at: now,
            player_position: None,
        }
    }

    pub fn touch_saved(&mut self) {
        self.last_saved_at = Utc::now();
    }
}

/// Serialize world metadata.
pub fn encode_world_meta(meta: &WorldMeta) -> Result<Vec<u8>> {
    bincode::serialize(meta).context("encoding world metadata")
}

/// Deserialize world metadata.
pub fn decode_world_meta(bytes: &[u8]) -> Result<WorldMeta> {
    bincode::deserialize(bytes).context("decoding world metadata")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_arrays() -> (Vec<BlockId>, Vec<u8>) {
        let mut blocks = vec![0u16; SUB_VOLUME];
        let mut light = vec![0u8; SUB_VOLUME];
        for (i, block) in blocks.iter_mut().enumerate() {
            *block = (i % 19) as u16;
        }
        for (i, cell) in light.iter_mut().enumerate() {
            *cell = (i % 251) as u8;
        }
        (blocks, light)
    }

    #[test]
    fn envelope_round_trips_byte_equal() {
        let (blocks, light) = sample_arrays();
        let bytes = encode_sub_chunk(&blocks, Some(&light));
        let payload = decode_sub_chunk(&bytes).unwrap();
        assert_eq!(payload.blocks, blocks);
        assert_eq!(payload.light.as_deref(), Some(light.as_slice()));
        // Re-encoding reproduces the exact bytes.
        let bytes_again = encode_sub_chunk(&payload.blocks, payload.light.as_deref());
        assert_eq!(bytes, bytes_again);
    }

    #[test]
    fn envelope_without_light_round_trips() {
        let (blocks, _) = sample_arrays();
        let bytes = encode_sub_chunk(&blocks, None);
        let payload = decode_sub_chunk(&bytes).unwrap();
        assert_eq!(payload.blocks, blocks);
        assert!(payload.light.is_none());
    }

    #[test]
    fn header_fields_are_little_endian_and_exact() {
        let (blocks, light) = sample_arrays();
        let bytes = encode_sub_chunk(&blocks, Some(&light));
        assert_eq!(&bytes[0..4], &0x534C_4F50u32.to_le_bytes());
        assert_eq!(&bytes[4..6], &1u16.to_le_bytes());
        assert_eq!(&bytes[6..10], &1u32.to_le_bytes()); // has-light flag
        assert_eq!(
            &bytes[10..14],
            &((SUB_VOLUME * 2) as u32).to_le_bytes()
        );
        assert_eq!(&bytes[14..18], &(SUB_VOLUME as u32).to_le_bytes());
        assert_eq!(bytes.len(), 18 + SUB_VOLUME * 2 + SUB_VOLUME);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let (blocks, _) = sample_arrays();
        let mut bytes = encode_sub_chunk(&blocks, None);
        bytes[0] = 0x00;
        assert!(matches!(
            decode_sub_chunk(&bytes),
            Err(PersistError::BadMagic(_))
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let (blocks, _) = sample_arrays();
        let mut bytes = encode_sub_chunk(&blocks, None);
        bytes[4] = 9;
        assert!(matches!(
            decode_sub_chunk(&bytes),
            Err(PersistError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn truncation_is_rejected() {
        let (blocks, light) = sample_arrays();
        let bytes = encode_sub_chunk(&blocks, Some(&light));
        assert!(matches!(
            decode_sub_chunk(&bytes[..bytes.len() - 1]),
            Err(PersistError::Truncated { .. })
        ));
        assert!(matches!(
            decode_sub_chunk(&bytes[..10]),
            Err(PersistError::Truncated { .. })
        ));
    }

    #[test]
    fn world_meta_round_trips() {
        let mut meta = WorldMeta::new(0xDEAD_BEEF);
        meta.player_position = Some([1.5, 320.0, -7.25]);
        let bytes = encode_world_meta(&meta).unwrap();
        let decoded = decode_world_meta(&bytes).unwrap();
        assert_eq!(decoded, meta);
    }
}
