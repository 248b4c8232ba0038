//! Group control metadata and the bit-parallel matching routines over it.
//!
//! A group's eight control bytes are packed into one `u64` (big-endian, so
//! slot 0 is the most significant byte) and compared against a target byte in
//! every lane at once using plain integer arithmetic.

/// Number of slots per group.
pub(crate) const GROUP_SIZE: usize = 8;

/// Maximum average number of live slots per group before a rehash. One lane
/// per group is left as probe-termination slack.
pub(crate) const MAX_AVG_GROUP_LOAD: usize = 7;

/// Control byte for a slot that has never held an entry since the last
/// rehash. A probe may stop at a group containing one.
pub(crate) const EMPTY: u8 = 0x80;

/// Control byte for a vacated slot in a group that had no `EMPTY` lane when
/// it was vacated. Probes must continue past it.
pub(crate) const TOMBSTONE: u8 = 0xFE;

const LO_BITS: u64 = 0x0101_0101_0101_0101;
const HI_BITS: u64 = 0x8080_8080_8080_8080;

const H2_MASK: u64 = 0x7F;

const DE_BRUIJN: u64 = 0x03f7_9d71_b4ca_8b09;

#[rustfmt::skip]
const DE_BRUIJN_TABLE: [u8; 64] = [
     0,  1, 56,  2, 57, 49, 28,  3, 61, 58, 42, 50, 38, 29, 17,  4,
    62, 47, 59, 36, 45, 43, 51, 22, 53, 39, 33, 30, 24, 18, 12,  5,
    63, 55, 48, 27, 60, 41, 37, 16, 46, 35, 44, 21, 52, 32, 23, 11,
    54, 26, 40, 15, 34, 20, 31, 10, 25, 14, 19,  9, 13,  8,  7,  6,
];

/// Returns `true` if `ctrl` marks an occupied slot.
#[inline(always)]
pub(crate) fn is_full(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

/// Splits a hash into the probe selector (upper 57 bits) and the 7-bit tag
/// stored in the control byte.
#[inline(always)]
pub(crate) fn split_hash(hash: u64) -> (u64, u8) {
    (hash >> 7, (hash & H2_MASK) as u8)
}

/// Maps `h1` into `[0, groups)` by fixed-point multiplication of its low 32
/// bits.
#[inline(always)]
pub(crate) fn probe_start(h1: u64, groups: usize) -> usize {
    (((h1 & 0xFFFF_FFFF) as u128 * groups as u128) >> 32) as usize
}

/// Number of groups needed to hold `capacity` entries at the maximum load.
#[inline]
pub(crate) fn num_groups(capacity: usize) -> usize {
    capacity.div_ceil(MAX_AVG_GROUP_LOAD).max(1)
}

/// Sets the high bit of every byte lane of `x` that is zero.
///
/// Lanes more significant than a genuine zero lane may also be flagged when
/// they hold `0x01` (the borrow propagates into them). The least significant
/// flagged lane is always genuine.
#[inline(always)]
pub(crate) fn has_zero_byte(x: u64) -> u64 {
    x.wrapping_sub(LO_BITS) & !x & HI_BITS
}

/// Flags every lane of `ctrl` equal to `tag`.
#[inline(always)]
pub(crate) fn match_tag(ctrl: u64, tag: u8) -> BitMask {
    BitMask(has_zero_byte(ctrl ^ LO_BITS.wrapping_mul(tag as u64)))
}

/// Flags every lane of `ctrl` equal to [`EMPTY`].
#[inline(always)]
pub(crate) fn match_empty(ctrl: u64) -> BitMask {
    BitMask(has_zero_byte(ctrl ^ HI_BITS))
}

/// Counts trailing zero bits using a De Bruijn multiply-and-lookup on the
/// isolated lowest set bit.
#[inline(always)]
pub(crate) fn trailing_zeros(x: u64) -> u32 {
    if x == 0 {
        return 64;
    }

    let lowest = x & x.wrapping_neg();
    DE_BRUIJN_TABLE[(lowest.wrapping_mul(DE_BRUIJN) >> 58) as usize] as u32
}

/// Lane flags produced by [`match_tag`] and [`match_empty`].
///
/// Iterating yields slot indices, least significant lane first, clearing each
/// lane as it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BitMask(u64);

impl BitMask {
    #[inline(always)]
    pub(crate) fn any(self) -> bool {
        self.0 != 0
    }

    /// Returns the slot of the lowest flagged lane and the mask with that lane
    /// cleared, or `None` if no lane is flagged.
    #[inline(always)]
    pub(crate) fn next_match(self) -> Option<(usize, BitMask)> {
        if self.0 == 0 {
            return None;
        }

        let bit = trailing_zeros(self.0);
        let lane = (bit >> 3) as usize;
        Some((GROUP_SIZE - 1 - lane, BitMask(self.0 & !(1u64 << bit))))
    }

    /// Returns the slot of the lowest flagged lane, if any.
    #[inline(always)]
    pub(crate) fn lowest(self) -> Option<usize> {
        self.next_match().map(|(slot, _)| slot)
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let (slot, rest) = BitMask::next_match(*self)?;
        *self = rest;
        Some(slot)
    }
}

/// The eight control bytes of one group, `bytes[s]` describing slot `s`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Metadata {
    bytes: [u8; GROUP_SIZE],
}

impl Metadata {
    pub(crate) const fn new() -> Self {
        Self {
            bytes: [EMPTY; GROUP_SIZE],
        }
    }

    /// Packs the control bytes into one word, slot 0 most significant.
    #[inline(always)]
    pub(crate) fn word(&self) -> u64 {
        u64::from_be_bytes(self.bytes)
    }

    #[inline(always)]
    pub(crate) fn get(&self, slot: usize) -> u8 {
        self.bytes[slot]
    }

    #[inline(always)]
    pub(crate) fn set(&mut self, slot: usize, ctrl: u8) {
        debug_assert!(
            ctrl == EMPTY || ctrl == TOMBSTONE || is_full(ctrl),
            "invalid control byte {ctrl:#04x}"
        );
        self.bytes[slot] = ctrl;
    }

    #[inline(always)]
    pub(crate) fn match_tag(&self, tag: u8) -> BitMask {
        match_tag(self.word(), tag)
    }

    #[inline(always)]
    pub(crate) fn match_empty(&self) -> BitMask {
        match_empty(self.word())
    }

    #[cfg(test)]
    pub(crate) fn bytes(&self) -> &[u8; GROUP_SIZE] {
        &self.bytes
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            match *b {
                EMPTY => f.write_str("..")?,
                TOMBSTONE => f.write_str("xx")?,
                tag => write!(f, "{tag:02x}")?,
            }
        }
        Ok(())
    }
}
