/// Dense, growable bit set over ordinals.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub(crate) struct BitVector {
    words: Vec<u64>,
}

const WORD_BITS: usize = u64::BITS as usize;

impl BitVector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % WORD_BITS);
    }

    #[allow(dead_code)]
    pub(crate) fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (bit % WORD_BITS)) != 0)
    }

    /// Union `other` into `self`; returns whether any bit was added.
    pub(crate) fn union_with(&mut self, other: &BitVector) -> bool {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut changed = false;
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            let merged = *mine | theirs;
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        changed
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub(crate) fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Highest set bit plus one, or zero when empty.
    pub(crate) fn max_bit(&self) -> usize {
        self.words
            .iter()
            .rposition(|word| *word != 0)
            .map(|index| index * WORD_BITS + (WORD_BITS - self.words[index].leading_zeros() as usize))
            .unwrap_or(0)
    }

    /// Set bits in ascending order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(index * WORD_BITS + bit)
            })
        })
    }
}

impl FromIterator<usize> for BitVector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut bits = BitVector::new();
        for bit in iter {
            bits.set(bit);
        }
        bits
    }
}
