//! Rings and reach sets
//!
//! A ring is a cohort of participants. Ring 0 is the innermost; messages
//! spread outward toward `total_rings - 1`. The set of rings a message has
//! reached is a 64-bit bitset, so membership checks and snapshots are a
//! single word.

use std::fmt;

/// Ring number within a session
pub type Ring = u16;

/// Maximum number of rings a session may have (width of [`RingSet`])
pub const MAX_RINGS: u16 = 64;

/// Set of ring numbers, one bit per ring
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RingSet(u64);

impl RingSet {
    pub const EMPTY: RingSet = RingSet(0);

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        RingSet(bits)
    }

    #[inline]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Set containing only `ring`
    #[inline]
    pub fn single(ring: Ring) -> Self {
        debug_assert!(ring < MAX_RINGS);
        RingSet(1u64 << ring)
    }

    /// Rings `0..=upto`
    #[inline]
    pub fn prefix(upto: Ring) -> Self {
        debug_assert!(upto < MAX_RINGS);
        if upto + 1 >= MAX_RINGS {
            RingSet(u64::MAX)
        } else {
            RingSet((1u64 << (upto + 1)) - 1)
        }
    }

    /// All rings of a session with `total_rings` rings
    #[inline]
    pub fn full(total_rings: u16) -> Self {
        if total_rings == 0 {
            RingSet::EMPTY
        } else {
            RingSet::prefix(total_rings - 1)
        }
    }

    #[inline]
    pub fn contains(self, ring: Ring) -> bool {
        ring < MAX_RINGS && self.0 & (1u64 << ring) != 0
    }

    #[inline]
    pub fn insert(&mut self, ring: Ring) -> bool {
        let had = self.contains(ring);
        self.0 |= 1u64 << ring;
        !had
    }

    #[inline]
    pub fn union(self, other: RingSet) -> RingSet {
        RingSet(self.0 | other.0)
    }

    #[inline]
    pub fn intersection(self, other: RingSet) -> RingSet {
        RingSet(self.0 & other.0)
    }

    /// Rings in `self` that are not in `other`
    #[inline]
    pub fn difference(self, other: RingSet) -> RingSet {
        RingSet(self.0 & !other.0)
    }

    #[inline]
    pub fn is_superset(self, other: RingSet) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Highest ring in the set
    #[inline]
    pub fn max(self) -> Option<Ring> {
        if self.0 == 0 {
            None
        } else {
            Some((63 - self.0.leading_zeros()) as Ring)
        }
    }

    /// Iterate rings in ascending order
    pub fn iter(self) -> impl Iterator<Item = Ring> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let ring = bits.trailing_zeros() as Ring;
            bits &= bits - 1;
            Some(ring)
        })
    }
}

impl FromIterator<Ring> for RingSet {
    fn from_iter<I: IntoIterator<Item = Ring>>(iter: I) -> Self {
        let mut set = RingSet::EMPTY;
        for ring in iter {
            set.insert(ring);
        }
        set
    }
}

impl fmt::Debug for RingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
