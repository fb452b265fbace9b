//! Optimizer and Compiler Configuration
//!
//! Tunables for [`Program::optimize_with`] and
//! [`CompressedProgram::compile_with`]. The defaults reproduce the behaviour
//! of the classic wordwise classifier, so most callers never touch them.
//!
//! | Knob | Default | Effect |
//! |------|---------|--------|
//! | `max_dominator_lists` | 4 | Lists kept per state before intersecting |
//! | `offset_order` | identity | Canonical ordering of AND-chain offsets |
//! | `last_offset` | [`OFFSET_MAX`] | Offsets at or past this are not reordered |
//! | `binary_search` | `true` | Sort value sets so they can be bisected |
//! | `min_binary_search` | 7 | Smallest value set that is bisected |
//!
//! [`Program::optimize_with`]: crate::bytecode::program::Program::optimize_with
//! [`CompressedProgram::compile_with`]: crate::bytecode::compressed::CompressedProgram::compile_with

extern crate alloc;

use alloc::vec::Vec;

/// Default bound on the number of dominator lists tracked per state.
pub const DEFAULT_MAX_DOMINATOR_LISTS: usize = 4;

/// Default value count from which compressed value sets are binary searched.
pub const DEFAULT_MIN_BINARY_SEARCH: usize = 7;

/// Largest packet offset an instruction may test.
pub const OFFSET_MAX: u32 = 0x7FFF_FFFF;

/// Canonical rank of packet offsets used when sorting AND chains.
///
/// Offsets without an explicit rank sort by their own value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetOrder {
    /// `(offset, rank)` pairs sorted by offset.
    ranks: Vec<(u32, u32)>,
}

impl OffsetOrder {
    /// The identity order: every offset ranks as itself.
    pub const fn identity() -> Self {
        Self { ranks: Vec::new() }
    }

    /// Build an order from `(offset, rank)` pairs.
    ///
    /// If an offset is listed more than once, the first rank wins.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let mut ranks: Vec<(u32, u32)> = pairs.into_iter().collect();
        ranks.sort_by_key(|&(offset, _)| offset);
        ranks.dedup_by_key(|&mut (offset, _)| offset);
        Self { ranks }
    }

    /// Rank of `offset`.
    pub fn rank(&self, offset: u32) -> u32 {
        if self.is_identity() {
            return offset;
        }
        match self.ranks.binary_search_by_key(&offset, |&(o, _)| o) {
            Ok(idx) => self.ranks[idx].1,
            Err(_) => offset,
        }
    }

    /// Whether no offset is remapped.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Configuration for the program optimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeConfig {
    /// Number of dominator lists kept per state before they are collapsed
    /// into their intersection.
    pub max_dominator_lists: usize,
    /// Ordering applied to offsets when sorting AND chains.
    pub offset_order: OffsetOrder,
    /// Instructions testing offsets at or past this value keep their place.
    pub last_offset: u32,
}

impl OptimizeConfig {
    /// Create a configuration with the default tunables.
    pub const fn new() -> Self {
        Self {
            max_dominator_lists: DEFAULT_MAX_DOMINATOR_LISTS,
            offset_order: OffsetOrder::identity(),
            last_offset: OFFSET_MAX,
        }
    }

    /// Set the dominator list bound.
    pub fn with_max_dominator_lists(mut self, max: usize) -> Self {
        self.max_dominator_lists = max;
        self
    }

    /// Set the offset ordering used by the AND-chain sort.
    pub fn with_offset_order(mut self, order: OffsetOrder) -> Self {
        self.offset_order = order;
        self
    }

    /// Set the offset past which instructions are not reordered.
    pub fn with_last_offset(mut self, last_offset: u32) -> Self {
        self.last_offset = last_offset;
        self
    }
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for program compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileConfig {
    /// Sort large value sets so matching can bisect them.
    pub binary_search: bool,
    /// Smallest value set that is sorted and bisected.
    pub min_binary_search: usize,
}

impl CompileConfig {
    /// Create a configuration with the default tunables.
    pub const fn new() -> Self {
        Self {
            binary_search: true,
            min_binary_search: DEFAULT_MIN_BINARY_SEARCH,
        }
    }

    /// A configuration that always scans value sets linearly.
    pub const fn linear() -> Self {
        Self {
            binary_search: false,
            min_binary_search: DEFAULT_MIN_BINARY_SEARCH,
        }
    }

    /// Enable or disable binary search.
    pub const fn with_binary_search(mut self, enabled: bool) -> Self {
        self.binary_search = enabled;
        self
    }

    /// Set the smallest value set that is bisected.
    pub const fn with_min_binary_search(mut self, min: usize) -> Self {
        self.min_binary_search = min;
        self
    }

    /// Whether a value set of `nval` entries is sorted and bisected.
    #[inline]
    pub const fn bisects(&self, nval: usize) -> bool {
        self.binary_search && nval >= self.min_binary_search
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self::new()
    }
}
