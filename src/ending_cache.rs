//! Memoization of solved positions, partitioned by search depth

use log::debug;
use xxhash_rust::xxh64::xxh64;

use std::collections::HashMap;

use crate::board::Board;
use crate::player::Winner;

/// Total number of entries the cache may hold across all depths
pub const CACHE_SIZE_LIMIT: usize = 1_500_000_000;

/// Positions deeper than `cells - CACHED_DEPTH_MARGIN` are never cached
const CACHED_DEPTH_MARGIN: usize = 4;

/// Levels up to this depth are never flushed by a solver's cache
///
/// Shallow levels are few in number and costly to rebuild.
pub const UNFLUSHED_DEPTH: usize = 16;

/// Key of a board position, identical for a board and its mirror image
///
/// When every column fits in `height + 1` bits of a 64 bit word the key is
/// the smaller of the packed board and the packed mirror and is exact.
/// Larger boards pick the canonical side the same way and hash it down.
pub fn fingerprint(board: &Board) -> u64 {
    let state = board.state();
    let stride = board.height() + 1;

    if board.width() * stride <= 64 {
        let mut raw = 0u64;
        let mut mirror = 0u64;
        for (i, (&left, &right)) in state.iter().zip(state.iter().rev()).enumerate() {
            raw |= left << (i * stride);
            mirror |= right << (i * stride);
        }
        return raw.min(mirror);
    }

    let mut bytes = Vec::with_capacity(state.len() * 8);
    if state.iter().le(state.iter().rev()) {
        state.iter().for_each(|c| bytes.extend_from_slice(&c.to_le_bytes()));
    } else {
        state.iter().rev().for_each(|c| bytes.extend_from_slice(&c.to_le_bytes()));
    }
    xxh64(&bytes, 0)
}

/// Depth-indexed maps from board fingerprint to the raw winner
///
/// Every depth level has an equal share of the total budget; a level that
/// runs out of room is flushed entirely before the next insert. Levels up to
/// [`EndingCache::unflushed_depth`] are exempt and keep growing instead.
#[derive(Clone, Debug)]
pub struct EndingCache {
    depth_caches: Vec<HashMap<u64, Winner>>,
    max_depth_size: usize,
    max_cached_depth: usize,
    unflushed_depth: Option<usize>,

    hits: u64,
    clears: u64,
    depth_clears: Vec<u64>,

    width: usize,
    height: usize,
}

impl EndingCache {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_limit(width, height, CACHE_SIZE_LIMIT)
    }

    /// Creates a cache holding at most `limit` entries in total
    pub fn with_limit(width: usize, height: usize, limit: usize) -> Self {
        let depths = width * height;
        Self {
            depth_caches: vec![HashMap::new(); depths],
            max_depth_size: limit / depths.max(1),
            max_cached_depth: depths.saturating_sub(CACHED_DEPTH_MARGIN),
            unflushed_depth: None,
            hits: 0,
            clears: 0,
            depth_clears: vec![0; depths],
            width,
            height,
        }
    }

    /// Exempts the levels up to `depth` from flushing, `None` lets every level flush
    pub fn set_unflushed_depth(&mut self, depth: Option<usize>) {
        self.unflushed_depth = depth;
    }

    pub fn unflushed_depth(&self) -> Option<usize> {
        self.unflushed_depth
    }

    #[inline]
    fn may_flush(&self, depth: usize) -> bool {
        self.unflushed_depth.map_or(true, |unflushed| depth > unflushed)
    }

    /// A new cache with its own budget, holding a copy of the levels up to `max_depth`
    pub fn shallow_copy(&self, max_depth: usize, limit: usize) -> EndingCache {
        let mut copy = EndingCache::with_limit(self.width, self.height, limit);
        copy.unflushed_depth = self.unflushed_depth;
        let levels = (max_depth + 1).min(self.depths());
        copy.depth_caches[..levels].clone_from_slice(&self.depth_caches[..levels]);
        copy
    }

    /// Looks up the winner of a position reached at the given depth
    #[inline]
    pub fn get(&mut self, board: &Board, depth: usize) -> Option<Winner> {
        let ending = self
            .depth_caches
            .get(depth)
            .and_then(|cache| cache.get(&fingerprint(board)))
            .copied();
        if ending.is_some() {
            self.hits += 1;
        }
        ending
    }

    /// Stores the winner of a position and hands it back
    ///
    /// Depths beyond [`EndingCache::max_cached_depth`] are passed through untouched.
    #[inline]
    pub fn put(&mut self, board: &Board, depth: usize, ending: Winner) -> Winner {
        if depth > self.max_cached_depth {
            return ending;
        }
        if self.depth_size(depth) >= self.max_depth_size && self.may_flush(depth) {
            self.clear_cache(depth);
        }
        self.depth_caches[depth].insert(fingerprint(board), ending);
        ending
    }

    /// Drops every entry of one depth level
    pub fn clear_cache(&mut self, depth: usize) {
        debug!("clearing cache at depth {}", depth);
        self.depth_caches[depth] = HashMap::new();
        self.depth_clears[depth] += 1;
        self.clears += 1;
    }

    /// Total number of entries across all depths
    pub fn size(&self) -> usize {
        self.depth_caches.iter().map(HashMap::len).sum()
    }

    pub fn depth_size(&self, depth: usize) -> usize {
        self.depth_caches.get(depth).map_or(0, HashMap::len)
    }

    pub fn depths(&self) -> usize {
        self.depth_caches.len()
    }

    pub fn max_cached_depth(&self) -> usize {
        self.max_cached_depth
    }

    pub fn max_depth_size(&self) -> usize {
        self.max_depth_size
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn clears(&self) -> u64 {
        self.clears
    }

    pub fn depth_clears(&self, depth: usize) -> u64 {
        self.depth_clears[depth]
    }

    /// The deepest level such that no level up to it has ever been flushed
    pub fn max_uncleared_depth(&self) -> Option<usize> {
        self.depth_clears.iter().take_while(|&&c| c == 0).count().checked_sub(1)
    }

    pub fn entries(&self, depth: usize) -> impl Iterator<Item = (u64, Winner)> + '_ {
        self.depth_caches[depth].iter().map(|(&key, &ending)| (key, ending))
    }

    /// Inserts an entry by its fingerprint, bypassing the depth limit
    pub fn set_entry(&mut self, depth: usize, key: u64, ending: Winner) {
        self.depth_caches[depth].insert(key, ending);
    }

    /// Copies every entry of another cache of the same shape into this one
    pub fn merge(&mut self, other: EndingCache) {
        for (depth, cache) in other.depth_caches.into_iter().enumerate() {
            if depth > self.max_cached_depth || cache.is_empty() {
                continue;
            }
            // entries copied from this cache earlier do not count twice
            let fresh = cache
                .keys()
                .filter(|key| !self.depth_caches[depth].contains_key(key))
                .count();
            if self.depth_size(depth) + fresh > self.max_depth_size && self.may_flush(depth) {
                self.clear_cache(depth);
            }
            self.depth_caches[depth].extend(cache);
        }
        self.hits += other.hits;
    }

    pub fn show_statistics(&self) {
        for (depth, cache) in self.depth_caches.iter().enumerate() {
            debug!(
                "depth cache {}: {} entries, {} clears",
                depth,
                cache.len(),
                self.depth_clears[depth]
            );
        }
    }
}
