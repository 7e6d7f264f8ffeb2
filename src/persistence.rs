//! Saving and restoring the shallow levels of an [`EndingCache`]
//!
//! The file is big-endian throughout:
//!
//! ```text
//! magic "C4EC" | version u32 | width u8 | height u8 | depth count u32
//! per depth:   depth u32 | entry count u64 | (fingerprint u64, winner u8) * count
//! trailer:     xxh64 of every byte before it, u64
//! ```

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use xxhash_rust::xxh64::xxh64;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::ending_cache::EndingCache;
use crate::player::Winner;

pub const DEFAULT_CACHE_DIR: &str = "cache";

const MAGIC: &[u8; 4] = b"C4EC";
const FORMAT_VERSION: u32 = 1;
const CHECKSUM_SEED: u64 = 0;

/// A directory holding one cache file per board shape
#[derive(Clone, Debug)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn cache_path(&self, width: usize, height: usize) -> PathBuf {
        self.dir.join(format!("cache_{}x{}.bin", width, height))
    }

    pub fn exists(&self, width: usize, height: usize) -> bool {
        self.cache_path(width, height).exists()
    }

    /// Writes the levels up to half the deepest cached depth, replacing any previous file
    ///
    /// Only the shallow levels are kept: they are the most expensive to
    /// recompute and the smallest to store.
    pub fn save(&self, cache: &EndingCache) -> Result<PathBuf> {
        let persisted = persisted_depths(cache);

        let mut bytes = Vec::new();
        bytes.write_all(MAGIC)?;
        bytes.write_u32::<BigEndian>(FORMAT_VERSION)?;
        bytes.write_u8(cache.width() as u8)?;
        bytes.write_u8(cache.height() as u8)?;
        bytes.write_u32::<BigEndian>(persisted as u32)?;

        let mut total = 0;
        for depth in 0..persisted {
            bytes.write_u32::<BigEndian>(depth as u32)?;
            bytes.write_u64::<BigEndian>(cache.depth_size(depth) as u64)?;
            for (key, ending) in cache.entries(depth) {
                bytes.write_u64::<BigEndian>(key)?;
                bytes.write_u8(ending.code())?;
            }
            total += cache.depth_size(depth);
        }
        let checksum = xxh64(&bytes, CHECKSUM_SEED);
        bytes.write_u64::<BigEndian>(checksum)?;

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache directory {}", self.dir.display()))?;
        let path = self.cache_path(cache.width(), cache.height());
        let temp_path = path.with_extension("bin.tmp");
        {
            let mut file = BufWriter::new(
                File::create(&temp_path)
                    .with_context(|| format!("failed to create {}", temp_path.display()))?,
            );
            file.write_all(&bytes)?;
            file.flush()?;
        }
        fs::rename(&temp_path, &path)
            .with_context(|| format!("failed to move cache into {}", path.display()))?;

        info!(
            "saved {} cache entries over {} depths to {}",
            total,
            persisted,
            path.display()
        );
        Ok(path)
    }

    /// Reads the cache file of a board shape into a fresh cache holding at most `limit` entries
    ///
    /// Any mismatch, truncation or checksum failure rejects the whole file.
    pub fn load(&self, width: usize, height: usize, limit: usize) -> Result<EndingCache> {
        let path = self.cache_path(width, height);
        let mut bytes = Vec::new();
        BufReader::new(
            File::open(&path).with_context(|| format!("failed to open {}", path.display()))?,
        )
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {}", path.display()))?;

        let cache = decode(&bytes, width, height, limit)
            .with_context(|| format!("invalid cache file {}", path.display()))?;
        info!("loaded {} cache entries from {}", cache.size(), path.display());
        Ok(cache)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

/// Number of depth levels written to disk, starting from the empty board
pub fn persisted_depths(cache: &EndingCache) -> usize {
    (cache.max_cached_depth() / 2 + 1).min(cache.depths())
}

fn decode(bytes: &[u8], width: usize, height: usize, limit: usize) -> Result<EndingCache> {
    if bytes.len() < MAGIC.len() + 8 {
        bail!("file is truncated ({} bytes)", bytes.len());
    }
    let (body, mut trailer) = bytes.split_at(bytes.len() - 8);
    let expected = trailer.read_u64::<BigEndian>()?;
    let actual = xxh64(body, CHECKSUM_SEED);
    if expected != actual {
        bail!("checksum mismatch, expected {:016x} got {:016x}", expected, actual);
    }

    let mut reader = Cursor::new(body);
    let mut magic = [0; 4];
    reader.read_exact(&mut magic).context("missing header")?;
    if &magic != MAGIC {
        bail!("bad magic {:?}", magic);
    }
    let version = reader.read_u32::<BigEndian>()?;
    if version != FORMAT_VERSION {
        bail!("unsupported format version {}", version);
    }
    let (file_width, file_height) = (reader.read_u8()? as usize, reader.read_u8()? as usize);
    if (file_width, file_height) != (width, height) {
        bail!(
            "board shape {}x{} does not match {}x{}",
            file_width,
            file_height,
            width,
            height
        );
    }

    let mut cache = EndingCache::with_limit(width, height, limit);
    let depth_count = reader.read_u32::<BigEndian>()? as usize;
    if depth_count > cache.depths() {
        bail!("{} depth levels for a board of {} cells", depth_count, cache.depths());
    }

    for expected_depth in 0..depth_count {
        let depth = reader.read_u32::<BigEndian>()? as usize;
        if depth != expected_depth {
            bail!("depth {} found where {} was expected", depth, expected_depth);
        }
        let count = reader.read_u64::<BigEndian>()?;
        debug!("loading {} entries at depth {}", count, depth);
        for _ in 0..count {
            let key = reader.read_u64::<BigEndian>()?;
            let code = reader.read_u8()?;
            let ending = match Winner::from_code(code) {
                Some(ending) => ending,
                None => bail!("unknown winner code {} at depth {}", code, depth),
            };
            cache.set_entry(depth, key, ending);
        }
    }

    if reader.position() as usize != body.len() {
        bail!("{} trailing bytes", body.len() - reader.position() as usize);
    }
    Ok(cache)
}
