//! Chunk storage backends.
//!
//! The world manager talks to a key-value store with three logical
//! namespaces (chunks, player, metadata) at sub-chunk granularity. The
//! production backend is external; `MemoryStore` serves tests and
//! `FileStore` gives a directory-backed store whose records are
//! zstd-compressed and CRC-validated.

use crate::coords::SubChunkPos;
use crate::persist::{decode_world_meta, encode_world_meta, WorldMeta};
use anyhow::{bail, Context, Result};
use crc32fast::Hasher;
use lru::LruCache;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage interface consumed by the world manager.
///
/// Implementations are keyed by sub-chunk for the chunks namespace; the
/// player and metadata namespaces hold single records.
pub trait ChunkStore: Send {
    fn load_sub_chunk(&mut self, pos: SubChunkPos) -> Result<Option<Vec<u8>>>;
    fn save_sub_chunk(&mut self, pos: SubChunkPos, bytes: &[u8]) -> Result<()>;
    fn sub_chunk_exists(&mut self, pos: SubChunkPos) -> Result<bool>;
    fn clear_sub_chunk(&mut self, pos: SubChunkPos) -> Result<()>;

    fn load_meta(&mut self) -> Result<Option<WorldMeta>>;
    fn save_meta(&mut self, meta: &WorldMeta) -> Result<()>;

    fn load_player(&mut self) -> Result<Option<Vec<u8>>>;
    fn save_player(&mut self, bytes: &[u8]) -> Result<()>;

    /// Wipe every namespace.
    fn clear_all(&mut self) -> Result<()>;
}

/// In-memory store for tests and ephemeral worlds.
#[derive(Default)]
pub struct MemoryStore {
    chunks: HashMap<SubChunkPos, Vec<u8>>,
    player: Option<Vec<u8>>,
    meta: Option<WorldMeta>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl ChunkStore for MemoryStore {
    fn load_sub_chunk(&mut self, pos: SubChunkPos) -> Result<Option<Vec<u8>>> {
        Ok(self.chunks.get(&pos).cloned())
    }

    fn save_sub_chunk(&mut self, pos: SubChunkPos, bytes: &[u8]) -> Result<()> {
        self.chunks.insert(pos, bytes.to_vec());
        Ok(())
    }

    fn sub_chunk_exists(&mut self, pos: SubChunkPos) -> Result<bool> {
        Ok(self.chunks.contains_key(&pos))
    }

    fn clear_sub_chunk(&mut self, pos: SubChunkPos) -> Result<()> {
        self.chunks.remove(&pos);
        Ok(())
    }

    fn load_meta(&mut self) -> Result<Option<WorldMeta>> {
        Ok(self.meta.clone())
    }

    fn save_meta(&mut self, meta: &WorldMeta) -> Result<()> {
        self.meta = Some(meta.clone());
        Ok(())
    }

    fn load_player(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.player.clone())
    }

    fn save_player(&mut self, bytes: &[u8]) -> Result<()> {
        self.player = Some(bytes.to_vec());
        Ok(())
    }

    fn clear_all(&mut self) -> Result<()> {
        self.chunks.clear();
        self.player = None;
        self.meta = None;
        Ok(())
    }
}

/// Record frame magic for the file store ("SLFS").
const STORE_MAGIC: u32 = 0x534C_4653;
const STORE_VERSION: u16 = 1;
const STORE_HEADER_LEN: usize = 4 + 2 + 4 + 4;
const ZSTD_LEVEL: i32 = 3;

/// Directory-backed store. Each record is one file:
/// `chunks/<x>.<z>.<sub>.sub`, `player/player.dat`, `metadata/world.meta`,
/// framed as magic + version + crc32 + length + zstd payload.
pub struct FileStore {
    root: PathBuf,
    /// Recently loaded envelopes, so re-entering an area skips the disk.
    cache: LruCache<SubChunkPos, Vec<u8>>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for namespace in ["chunks", "player", "metadata"] {
            fs::create_dir_all(root.join(namespace))
                .with_context(|| format!("creating store namespace {namespace}"))?;
        }
        Ok(Self {
            root,
            cache: LruCache::new(NonZeroUsize::new(256).expect("nonzero cache size")),
        })
    }

    fn sub_chunk_path(&self, pos: SubChunkPos) -> PathBuf {
        self.root
            .join("chunks")
            .join(format!("{}.{}.{}.sub", pos.chunk.x, pos.chunk.z, pos.sub_y))
    }

    fn player_path(&self) -> PathBuf {
        self.root.join("player").join("player.dat")
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("metadata").join("world.meta")
    }

    fn write_record(path: &Path, payload: &[u8]) -> Result<()> {
        let compressed = zstd::encode_all(payload, ZSTD_LEVEL).context("compressing record")?;
        let mut hasher = Hasher::new();
        hasher.update(&compressed);
        let crc = hasher.finalize();

        let mut bytes = Vec::with_capacity(STORE_HEADER_LEN + compressed.len());
        bytes.extend_from_slice(&STORE_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&STORE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn read_record(path: &Path) -> Result<Option<Vec<u8>>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("opening {}", path.display()))
            }
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .with_context(|| format!("reading {}", path.display()))?;
        if bytes.len() < STORE_HEADER_LEN {
            bail!("store record {} is truncated", path.display());
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != STORE_MAGIC {
            bail!("store record {} has bad magic 0x{magic:08X}", path.display());
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != STORE_VERSION {
            bail!("store record {} has unsupported version {version}", path.display());
        }
        let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
        let payload = &bytes[STORE_HEADER_LEN..];
        if payload.len() != len {
            bail!("store record {} length mismatch", path.display());
        }
        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != crc {
            bail!("store record {} failed CRC validation", path.display());
        }
        let decompressed = zstd::decode_all(payload).context("decompressing record")?;
        Ok(Some(decompressed))
    }
}

impl ChunkStore for FileStore {
    fn load_sub_chunk(&mut self, pos: SubChunkPos) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.cache.get(&pos) {
            return Ok(Some(bytes.clone()));
        }
        let loaded = Self::read_record(&self.sub_chunk_path(pos))?;
        if let Some(bytes) = &loaded {
            self.cache.put(pos, bytes.clone());
        }
        Ok(loaded)
    }

    fn save_sub_chunk(&mut self, pos: SubChunkPos, bytes: &[u8]) -> Result<()> {
        Self::write_record(&self.sub_chunk_path(pos), bytes)?;
        self.cache.put(pos, bytes.to_vec());
        debug!(pos = %pos, "saved sub-chunk");
        Ok(())
    }

    fn sub_chunk_exists(&mut self, pos: SubChunkPos) -> Result<bool> {
        Ok(self.cache.contains(&pos) || self.sub_chunk_path(pos).exists())
    }

    fn clear_sub_chunk(&mut self, pos: SubChunkPos) -> Result<()> {
        self.cache.pop(&pos);
        let path = self.sub_chunk_path(pos);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }

    fn load_meta(&mut self) -> Result<Option<WorldMeta>> {
        match Self::read_record(&self.meta_path())? {
            Some(bytes) => Ok(Some(decode_world_meta(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_meta(&mut self, meta: &WorldMeta) -> Result<()> {
        Self::write_record(&self.meta_path(), &encode_world_meta(meta)?)
    }

    fn load_player(&mut self) -> Result<Option<Vec<u8>>> {
        Self::read_record(&self.player_path())
    }

    fn save_player(&mut self, bytes: &[u8]) -> Result<()> {
        Self::write_record(&self.player_path(), bytes)
    }

    fn clear_all(&mut self) -> Result<()> {
        self.cache.clear();
        for namespace in ["chunks", "player", "metadata"] {
            let dir = self.root.join(namespace);
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("clearing {}", dir.display()))?;
            }
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ChunkPos;
    use crate::persist::{decode_sub_chunk, encode_sub_chunk};
    use crate::coords::SUB_VOLUME;

    fn pos(x: i64, z: i64, sub_y: u8) -> SubChunkPos {
        SubChunkPos::new(ChunkPos::new(x, z), sub_y)
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        let key = pos(1, -2, 5);
        assert!(store.load_sub_chunk(key).unwrap().is_none());
        store.save_sub_chunk(key, b"payload").unwrap();
        assert!(store.sub_chunk_exists(key).unwrap());
        assert_eq!(store.load_sub_chunk(key).unwrap().unwrap(), b"payload");
        store.clear_sub_chunk(key).unwrap();
        assert!(!store.sub_chunk_exists(key).unwrap());
    }

    #[test]
    fn file_store_round_trips_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        let key = pos(-3, 7, 2);

        let blocks: Vec<u16> = (0..SUB_VOLUME).map(|i| (i % 11) as u16).collect();
        let light: Vec<u8> = (0..SUB_VOLUME).map(|i| (i % 200) as u8).collect();
        let envelope = encode_sub_chunk(&blocks, Some(&light));

        store.save_sub_chunk(key, &envelope).unwrap();
        let loaded = store.load_sub_chunk(key).unwrap().unwrap();
        assert_eq!(loaded, envelope);

        let payload = decode_sub_chunk(&loaded).unwrap();
        assert_eq!(payload.blocks, blocks);
        assert_eq!(payload.light.as_deref(), Some(light.as_slice()));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = pos(0, 0, 0);
        {
            let mut store = FileStore::open(dir.path()).unwrap();
            store.save_sub_chunk(key, b"persisted").unwrap();
        }
        let mut store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.load_sub_chunk(key).unwrap().unwrap(), b"persisted");
    }

    #[test]
    fn corrupted_record_is_an_error_not_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let key = pos(0, 0, 1);
        let mut store = FileStore::open(dir.path()).unwrap();
        store.save_sub_chunk(key, b"fragile").unwrap();

        // Flip a payload byte on disk and drop the cache.
        let path = dir.path().join("chunks").join("0.0.1.sub");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
        store.cache.clear();

        assert!(store.load_sub_chunk(key).is_err());
    }

    #[test]
    fn meta_round_trips_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        assert!(store.load_meta().unwrap().is_none());
        let meta = WorldMeta::new(42);
        store.save_meta(&meta).unwrap();
        assert_eq!(store.load_meta().unwrap().unwrap(), meta);
    }

    #[test]
    fn clear_all_wipes_every_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        store.save_sub_chunk(pos(0, 0, 0), b"a").unwrap();
        store.save_player(b"player").unwrap();
        store.save_meta(&WorldMeta::new(1)).unwrap();
        store.clear_all().unwrap();
        assert!(store.load_sub_chunk(pos(0, 0, 0)).unwrap().is_none());
        assert!(store.load_player().unwrap().is_none());
        assert!(store.load_meta().unwrap().is_none());
    }
}
