use std::collections::TryReserveError;
use std::num::NonZero;

/// Number of slots tracked by one bitfield word.
pub const BITS_PER_WORD: usize = u64::BITS as usize;

/// How far the rotating scan offset lags behind the live count. The scan for a vacant slot
/// starts at index `live_count >> ROTATION_SHIFT` instead of zero.
const ROTATION_SHIFT: u32 = 1;

/// Maps a slot index to the bitfield word holding its bit and the bit position in that word.
///
/// This is the inverse of [`map_field_to_index()`].
///
/// # Examples
///
/// ```
/// use slot_pool::{map_field_to_index, map_index_to_field};
///
/// assert_eq!(map_index_to_field(0), (0, 0));
/// assert_eq!(map_index_to_field(63), (0, 63));
/// assert_eq!(map_index_to_field(64), (1, 0));
/// assert_eq!(map_field_to_index(2, 5), 133);
/// ```
#[must_use]
#[inline]
pub fn map_index_to_field(index: usize) -> (usize, usize) {
    (index >> 6, index & 0b11_1111)
}

/// Maps a bitfield word and bit position back to the slot index it tracks.
///
/// This is the inverse of [`map_index_to_field()`].
#[must_use]
#[inline]
pub fn map_field_to_index(word: usize, bit: usize) -> usize {
    debug_assert!(bit < BITS_PER_WORD, "bit position {bit} does not fit in a word");

    (word << 6) | bit
}

/// Occupancy bitfield over a fixed index space.
///
/// Bit `i` of word `i >> 6` is set if and only if slot `i` is occupied. The number of set bits
/// is tracked alongside so the live count never needs to be recomputed, and the two are only
/// ever changed together.
#[derive(Debug)]
pub(crate) struct SlotBits {
    words: Box<[u64]>,

    /// Number of addressable slots. Bits at or beyond this index in the last word are never set.
    capacity: NonZero<usize>,

    /// Number of set bits.
    len: usize,
}

impl SlotBits {
    /// Creates an all-vacant bitfield for `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory for the bitfield words cannot be reserved.
    pub(crate) fn new(capacity: NonZero<usize>) -> Result<Self, TryReserveError> {
        let word_count = capacity.get().div_ceil(BITS_PER_WORD);

        let mut words = Vec::new();
        words.try_reserve_exact(word_count)?;
        words.resize(word_count, 0_u64);

        Ok(Self {
            words: words.into_boxed_slice(),
            capacity,
            len: 0,
        })
    }

    /// Size of the bitfield storage in bytes.
    #[must_use]
    pub(crate) fn size_bytes(capacity: NonZero<usize>) -> usize {
        capacity
            .get()
            .div_ceil(BITS_PER_WORD)
            .saturating_mul(size_of::<u64>())
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity.get()
    }

    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.len >= self.capacity.get()
    }

    /// Finds a vacant slot, marks it occupied and returns its index.
    ///
    /// The scan starts at a rotating offset derived from the current live count and wraps
    /// around the end of the index space, so there is no guarantee which vacant slot is chosen.
    /// Returns `None` if every slot is occupied.
    pub(crate) fn acquire(&mut self) -> Option<usize> {
        if self.is_full() {
            return None;
        }

        let start = (self.len >> ROTATION_SHIFT) % self.capacity.get();
        let (start_word, start_bit) = map_index_to_field(start);
        let word_count = self.words.len();

        // The start word is visited twice: first for the bits at or after the start position,
        // and once more at the end of the wrap-around for the bits before it.
        for step in 0..=word_count {
            // Cannot overflow, both operands are bounded by the word count.
            let word_index = start_word.wrapping_add(step) % word_count;

            let mut candidates = !self.word(word_index) & self.valid_mask(word_index);

            if step == 0 {
                candidates &= u64::MAX << start_bit;
            } else if step == word_count {
                candidates &= !(u64::MAX << start_bit);
            }

            if candidates != 0 {
                let bit = candidates.trailing_zeros() as usize;

                *self.word_mut(word_index) |= 1_u64 << bit;

                // Cannot overflow because we just found a vacant slot within capacity.
                self.len = self.len.wrapping_add(1);

                return Some(map_field_to_index(word_index, bit));
            }
        }

        None
    }

    /// Marks a slot vacant. Returns `false` if it was already vacant or out of range.
    pub(crate) fn release(&mut self, index: usize) -> bool {
        if !self.is_used(index) {
            return false;
        }

        let (word, bit) = map_index_to_field(index);
        *self.word_mut(word) &= !(1_u64 << bit);

        // Cannot underflow because the slot was occupied.
        self.len = self.len.wrapping_sub(1);

        true
    }

    #[must_use]
    pub(crate) fn is_used(&self, index: usize) -> bool {
        if index >= self.capacity.get() {
            return false;
        }

        let (word, bit) = map_index_to_field(index);
        self.word(word) & (1_u64 << bit) != 0
    }

    /// Population count of the bitfield, computed from the words themselves.
    #[must_use]
    pub(crate) fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    /// Indexes of all occupied slots in ascending order.
    pub(crate) fn iter_used(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            SetBits(word).map(move |bit| map_field_to_index(word_index, bit))
        })
    }

    /// Marks every slot vacant.
    pub(crate) fn clear(&mut self) {
        self.words.fill(0);
        self.len = 0;
    }

    /// Mask of the bits in a word that correspond to addressable slots.
    fn valid_mask(&self, word_index: usize) -> u64 {
        let last_word = self.words.len().wrapping_sub(1);
        let tail_bits = self.capacity.get() % BITS_PER_WORD;

        if word_index == last_word && tail_bits != 0 {
            (1_u64 << tail_bits).wrapping_sub(1)
        } else {
            u64::MAX
        }
    }

    fn word(&self, index: usize) -> u64 {
        *self
            .words
            .get(index)
            .expect("word index derived from a slot index within capacity")
    }

    fn word_mut(&mut self, index: usize) -> &mut u64 {
        self.words
            .get_mut(index)
            .expect("word index derived from a slot index within capacity")
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        assert_eq!(
            self.count_ones(),
            self.len,
            "bitfield population does not match the tracked live count"
        );

        let last_word = self.words.len().wrapping_sub(1);
        let stray = self.word(last_word) & !self.valid_mask(last_word);
        assert_eq!(stray, 0, "bits beyond capacity are set");
    }
}

/// Yields the positions of the set bits of a word, lowest first.
struct SetBits(u64);

impl Iterator for SetBits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }

        let bit = self.0.trailing_zeros() as usize;

        // Clears the lowest set bit.
        self.0 &= self.0.wrapping_sub(1);

        Some(bit)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn field_mapping_round_trips() {
        for index in 0..1000 {
            let (word, bit) = map_index_to_field(index);
            assert!(bit < BITS_PER_WORD);
            assert_eq!(map_field_to_index(word, bit), index);
        }
    }

    #[test]
    fn fills_to_capacity_then_reports_full() {
        let mut bits = SlotBits::new(nz!(4)).unwrap();

        let mut acquired = (0..4).map(|_| bits.acquire().unwrap()).collect::<Vec<_>>();
        acquired.sort_unstable();

        assert_eq!(acquired, vec![0, 1, 2, 3]);
        assert!(bits.is_full());
        assert_eq!(bits.acquire(), None);
        assert_eq!(bits.len(), 4);
    }

    #[test]
    fn never_returns_index_beyond_capacity() {
        // 70 slots span two words with only 6 valid bits in the second.
        let mut bits = SlotBits::new(nz!(70)).unwrap();

        for _ in 0..70 {
            let index = bits.acquire().unwrap();
            assert!(index < 70, "acquired index {index} beyond capacity");
        }

        assert_eq!(bits.acquire(), None);
        bits.integrity_check();
    }

    #[test]
    fn scan_starts_at_rotating_offset() {
        let mut bits = SlotBits::new(nz!(128)).unwrap();

        for _ in 0..20 {
            bits.acquire().unwrap();
        }

        // Live count 20 puts the scan start at index 10, which is taken, so the scan moves on
        // to the first vacant slot after it.
        assert_eq!(bits.acquire(), Some(20));

        // Freeing a low slot does not make it the next choice while the live count is high.
        assert!(bits.release(2));
        assert_eq!(bits.acquire(), Some(21));
    }

    #[test]
    fn scan_wraps_around_to_slots_before_offset() {
        let mut bits = SlotBits::new(nz!(8)).unwrap();

        for _ in 0..8 {
            bits.acquire().unwrap();
        }

        // Only slot 0 is vacant. Live count 7 starts the scan at index 3.
        assert!(bits.release(0));
        assert_eq!(bits.acquire(), Some(0));
    }

    #[test]
    fn release_of_vacant_slot_is_rejected() {
        let mut bits = SlotBits::new(nz!(10)).unwrap();

        assert!(!bits.release(3));
        assert!(!bits.release(100));
        assert_eq!(bits.len(), 0);

        let index = bits.acquire().unwrap();
        assert!(bits.release(index));
        assert!(!bits.release(index));
    }

    #[test]
    fn population_matches_live_count() {
        let mut bits = SlotBits::new(nz!(200)).unwrap();
        let mut held = Vec::new();

        // Deterministic interleaving of acquisitions and releases.
        for round in 0_usize..500 {
            if round % 3 == 2 && !held.is_empty() {
                let victim = held.swap_remove(round % held.len());
                assert!(bits.release(victim));
            } else if let Some(index) = bits.acquire() {
                held.push(index);
            }

            assert_eq!(bits.count_ones(), bits.len());
            assert_eq!(bits.len(), held.len());
        }

        bits.integrity_check();
    }

    #[test]
    fn iter_used_is_ascending() {
        let mut bits = SlotBits::new(nz!(130)).unwrap();

        for _ in 0..130 {
            bits.acquire().unwrap();
        }

        for index in (0..130).filter(|index| index % 7 != 0) {
            assert!(bits.release(index));
        }

        let used = bits.iter_used().collect::<Vec<_>>();
        let expected = (0..130).filter(|index| index % 7 == 0).collect::<Vec<_>>();

        assert_eq!(used, expected);
    }

    #[test]
    fn clear_vacates_everything() {
        let mut bits = SlotBits::new(nz!(65)).unwrap();

        for _ in 0..65 {
            bits.acquire().unwrap();
        }

        bits.clear();

        assert_eq!(bits.len(), 0);
        assert_eq!(bits.count_ones(), 0);
        assert!(!bits.is_used(64));
        assert!(bits.acquire().is_some());
    }

    #[test]
    fn size_bytes_rounds_up_to_words() {
        assert_eq!(SlotBits::size_bytes(nz!(1)), 8);
        assert_eq!(SlotBits::size_bytes(nz!(64)), 8);
        assert_eq!(SlotBits::size_bytes(nz!(65)), 16);
    }
}
