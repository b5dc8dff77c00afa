//! Simple BitSet implementation backed by a Vec<u64>.
//! Trailing zero words are trimmed so equality and hashing follow the bit pattern.

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Create an empty BitSet
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bit at `index` to true.
    /// Resizes automatically if index is out of bounds.
    pub fn set(&mut self, index: usize) {
        let (word_idx, bit_idx) = (index / 64, index % 64);
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }
        self.words[word_idx] |= 1 << bit_idx;
    }

    /// Clear the bit at `index`.
    pub fn clear(&mut self, index: usize) {
        let (word_idx, bit_idx) = (index / 64, index % 64);
        if let Some(word) = self.words.get_mut(word_idx) {
            *word &= !(1 << bit_idx);
            self.trim();
        }
    }

    /// Check if the bit at `index` is set.
    pub fn contains(&self, index: usize) -> bool {
        let (word_idx, bit_idx) = (index / 64, index % 64);
        if word_idx >= self.words.len() {
            return false;
        }
        (self.words[word_idx] & (1 << bit_idx)) != 0
    }

    /// Returns true if this set shares any set bits with `other`.
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Returns true if every bit of `other` is also set here.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.words.iter().enumerate().all(|(i, &word)| {
            let mine = self.words.get(i).copied().unwrap_or(0);
            mine & word == word
        })
    }

    /// Bitwise OR
    pub fn union(&self, other: &Self) -> Self {
        let (long, short) = if self.words.len() >= other.words.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut words = long.words.clone();
        for (dst, src) in words.iter_mut().zip(short.words.iter()) {
            *dst |= src;
        }
        Self { words }
    }

    /// Bitwise AND
    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = Self {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a & b)
                .collect(),
        };
        result.trim();
        result
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no bit is set
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns iterator over indices of set bits
    pub fn ones(&self) -> OnesIter<'_> {
        OnesIter {
            bitset: self,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

#[derive(Clone)]
pub struct OnesIter<'a> {
    bitset: &'a BitSet,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for OnesIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let trailing = self.current_word.trailing_zeros();
                self.current_word &= !(1 << trailing); // Clear the bit we just found
                return Some(self.word_idx * 64 + trailing as usize);
            }

            self.word_idx += 1;
            if self.word_idx >= self.bitset.words.len() {
                return None;
            }
            self.current_word = self.bitset.words[self.word_idx];
        }
    }
}
