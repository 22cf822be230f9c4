use rand::prelude::{RngCore, SeedableRng, StdRng};
use rand::Rng;

/// Seeded source of every random choice made while editing graphs.
///
/// Two randomizers built from the same seed make the same choices, so a run
/// can be replayed by storing the seed.
#[derive(Debug, Clone)]
pub struct Randomizer {
    rng: StdRng,
    seed: u64,
}

impl Randomizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// A randomizer seeded from entropy. The seed is kept for replay.
    pub fn from_entropy() -> Self {
        let seed = StdRng::from_entropy().next_u64();
        Self::new(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A uniform index in `0..bound`. `bound` must be positive.
    pub fn next_index(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound)
    }

    pub fn next_bool(&mut self) -> bool {
        self.rng.gen()
    }

    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Pick one element, or `None` from an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            let index = self.next_index(items.len());
            items.get(index)
        }
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_choices() {
        let mut a = Randomizer::new(42);
        let mut b = Randomizer::new(42);
        let items = [1, 2, 3, 4, 5, 6, 7];
        for _ in 0..20 {
            assert_eq!(a.choose(&items), b.choose(&items));
        }
        assert_eq!(a.seed(), 42);
    }

    #[test]
    fn test_choose_from_empty() {
        let mut r = Randomizer::new(1);
        let empty: [u8; 0] = [];
        assert!(r.choose(&empty).is_none());
    }

    #[test]
    fn test_shuffle_keeps_elements() {
        let mut r = Randomizer::new(3);
        let mut items: Vec<u32> = (0..20).collect();
        r.shuffle(&mut items);
        items.sort();
        assert_eq!(items, (0..20).collect::<Vec<_>>());
    }
}
