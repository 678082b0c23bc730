//! Durable storage for stack records.
//!
//! Records are grouped into region files of 32x32 chunks. Each region file
//! carries a little-endian header (magic, version, CRC32, payload length)
//! over a zstd-compressed bincode payload. A corrupt region degrades to
//! empty with a warning; it never aborts a load.

use stackforge_core::{AuxState, ChunkKey, SpatialKey, StackError, StackKind, WorldId};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Magic number for stack region files ("SFRG" = stackforge region).
const REGION_MAGIC: u32 = 0x53465247;

/// Current region file format version.
const REGION_VERSION: u16 = 1;

/// Region size in chunks (32x32 chunks per region).
const REGION_SIZE: i32 = 32;

/// Persisted state of one stacked object, keyed by spatial coordinate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StackRecord {
    /// Canonical identity; also the storage key.
    pub key: SpatialKey,
    /// Chunk the object was bucketed under when saved. Determines the
    /// region file and drives chunk-granular loads.
    pub chunk: ChunkKey,
    /// Kind discriminator.
    pub kind: StackKind,
    /// Stack amount at save time.
    pub amount: u32,
    /// Kind-specific auxiliary blob.
    pub aux: AuxState,
}

/// A coalesced write for one spatial key.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    /// Write or overwrite the record.
    Upsert(StackRecord),
    /// Delete whatever is stored under the key.
    Delete,
}

/// Durable backend applied to by the persistence queue.
pub trait StackStore: Send + Sync {
    /// Apply a batch of coalesced operations. At most one op per key.
    fn apply(&self, batch: &[(SpatialKey, PersistOp)]) -> Result<(), StackError>;

    /// Load every record saved under one chunk.
    fn load_chunk(&self, chunk: ChunkKey) -> Result<Vec<StackRecord>, StackError>;

    /// Load every record in the store.
    fn load_all(&self) -> Result<Vec<StackRecord>, StackError>;
}

/// In-memory store for tests and the demo driver.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<SpatialKey, StackRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a single record by key.
    pub fn get(&self, key: SpatialKey) -> Option<StackRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }
}

impl StackStore for MemoryStore {
    fn apply(&self, batch: &[(SpatialKey, PersistOp)]) -> Result<(), StackError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for (key, op) in batch {
            match op {
                PersistOp::Upsert(record) => {
                    records.insert(*key, record.clone());
                }
                PersistOp::Delete => {
                    records.remove(key);
                }
            }
        }
        Ok(())
    }

    fn load_chunk(&self, chunk: ChunkKey) -> Result<Vec<StackRecord>, StackError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|record| record.chunk == chunk)
            .cloned()
            .collect())
    }

    fn load_all(&self) -> Result<Vec<StackRecord>, StackError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }
}

/// Region file header.
#[derive(Debug, Clone)]
struct RegionHeader {
    magic: u32,
    version: u16,
    crc32: u32,
    payload_len: u32,
}

impl RegionHeader {
    fn new(crc32: u32, payload_len: u32) -> Self {
        Self {
            magic: REGION_MAGIC,
            version: REGION_VERSION,
            crc32,
            payload_len,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(14);
        bytes.extend_from_slice(&self.magic.to_le_bytes());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.crc32.to_le_bytes());
        bytes.extend_from_slice(&self.payload_len.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, StackError> {
        if bytes.len() < 14 {
            return Err(StackError::Codec("region header too short".into()));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != REGION_MAGIC {
            return Err(StackError::Codec(format!(
                "invalid region magic: expected 0x{REGION_MAGIC:08X}, got 0x{magic:08X}"
            )));
        }
        Ok(Self {
            magic,
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            crc32: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            payload_len: u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
        })
    }
}

/// Region coordinate a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RegionPos {
    world: WorldId,
    x: i32,
    z: i32,
}

fn chunk_to_region(chunk: ChunkKey) -> RegionPos {
    RegionPos {
        world: chunk.world,
        x: chunk.pos.x.div_euclid(REGION_SIZE),
        z: chunk.pos.z.div_euclid(REGION_SIZE),
    }
}

/// File-backed store writing one region file per 32x32 chunk area.
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, StackError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn region_path(&self, region: RegionPos) -> PathBuf {
        self.data_dir
            .join(format!("s.{}.{}.{}.sr", region.world.0, region.x, region.z))
    }

    fn load_region(&self, region: RegionPos) -> BTreeMap<SpatialKey, StackRecord> {
        match self.try_load_region(region) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    "region file {} unreadable ({err}); treating as empty",
                    self.region_path(region).display()
                );
                BTreeMap::new()
            }
        }
    }

    fn try_load_region(
        &self,
        region: RegionPos,
    ) -> Result<BTreeMap<SpatialKey, StackRecord>, StackError> {
        let path = self.region_path(region);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let mut file = File::open(&path)?;
        let mut header_bytes = [0u8; 14];
        file.read_exact(&mut header_bytes)?;
        let header = RegionHeader::from_bytes(&header_bytes)?;
        if header.version != REGION_VERSION {
            return Err(StackError::Codec(format!(
                "unsupported region version {}",
                header.version
            )));
        }

        let mut compressed = vec![0u8; header.payload_len as usize];
        file.read_exact(&mut compressed)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&compressed);
        let computed = hasher.finalize();
        if computed != header.crc32 {
            return Err(StackError::Codec(format!(
                "crc32 mismatch: expected {:08X}, got {computed:08X}",
                header.crc32
            )));
        }

        let decompressed = zstd::decode_all(&compressed[..])
            .map_err(|e| StackError::Codec(format!("zstd decode: {e}")))?;
        bincode::deserialize(&decompressed).map_err(|e| StackError::Codec(e.to_string()))
    }

    fn write_region(
        &self,
        region: RegionPos,
        records: &BTreeMap<SpatialKey, StackRecord>,
    ) -> Result<(), StackError> {
        let path = self.region_path(region);
        if records.is_empty() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            return Ok(());
        }

        let serialized =
            bincode::serialize(records).map_err(|e| StackError::Codec(e.to_string()))?;
        // Level 3 balances speed and compression for frequent rewrites.
        let compressed = zstd::encode_all(&serialized[..], 3)
            .map_err(|e| StackError::Codec(format!("zstd encode: {e}")))?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&compressed);
        let header = RegionHeader::new(hasher.finalize(), compressed.len() as u32);

        let mut file = File::create(&path)?;
        file.write_all(&header.to_bytes())?;
        file.write_all(&compressed)?;
        Ok(())
    }

    fn region_files(&self) -> Result<Vec<RegionPos>, StackError> {
        let mut regions = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(region) = parse_region_name(name) else {
                continue;
            };
            regions.push(region);
        }
        regions.sort();
        Ok(regions)
    }
}

fn parse_region_name(name: &str) -> Option<RegionPos> {
    let rest = name.strip_prefix("s.")?.strip_suffix(".sr")?;
    let mut parts = rest.splitn(3, '.');
    let world = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    Some(RegionPos {
        world: WorldId(world),
        x,
        z,
    })
}

impl StackStore for FileStore {
    fn apply(&self, batch: &[(SpatialKey, PersistOp)]) -> Result<(), StackError> {
        // Group by region so each file is rewritten at most once per batch.
        let mut by_region: BTreeMap<RegionPos, Vec<&(SpatialKey, PersistOp)>> = BTreeMap::new();
        for entry in batch {
            let region = match &entry.1 {
                PersistOp::Upsert(record) => chunk_to_region(record.chunk),
                // Deletes for keys we never saw still need a region; block
                // keys derive it from their position, entity deletes are
                // resolved by scanning (rare: only delete-before-upsert).
                PersistOp::Delete => match entry.0.fixed_chunk() {
                    Some(chunk) => chunk_to_region(chunk),
                    None => {
                        self.delete_by_scan(entry.0)?;
                        continue;
                    }
                },
            };
            by_region.entry(region).or_default().push(entry);
        }

        for (region, ops) in by_region {
            let mut records = self.load_region(region);
            for (key, op) in ops {
                match op {
                    PersistOp::Upsert(record) => {
                        records.insert(*key, record.clone());
                    }
                    PersistOp::Delete => {
                        records.remove(key);
                    }
                }
            }
            self.write_region(region, &records)?;
        }
        Ok(())
    }

    fn load_chunk(&self, chunk: ChunkKey) -> Result<Vec<StackRecord>, StackError> {
        let records = self.load_region(chunk_to_region(chunk));
        Ok(records
            .into_values()
            .filter(|record| record.chunk == chunk)
            .collect())
    }

    fn load_all(&self) -> Result<Vec<StackRecord>, StackError> {
        let mut all = Vec::new();
        for region in self.region_files()? {
            all.extend(self.load_region(region).into_values());
        }
        Ok(all)
    }
}

impl FileStore {
    fn delete_by_scan(&self, key: SpatialKey) -> Result<(), StackError> {
        for region in self.region_files()? {
            let mut records = self.load_region(region);
            if records.remove(&key).is_some() {
                self.write_region(region, &records)?;
                return Ok(());
            }
        }
        Ok(())
    }
}
