//! Capabilities injected into every run: an output sink, the randomness
//! module and the host runtime handle.

use crate::runtime::HostRuntime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Receives each printed line.
pub trait OutputSink {
    fn write_line(&mut self, line: &str);
}

impl OutputSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Process-wide pseudo-random source behind `random.*` and `game.random`.
pub struct RandomModule {
    rng: StdRng,
}

impl RandomModule {
    /// Seeded for reproducible runs, from entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Uniform in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    /// Integer in `[min, max]`, both ends included.
    pub fn randint(&mut self, min: f64, max: f64) -> f64 {
        (self.random() * (max - min + 1.0)).floor() + min
    }

    /// Uniform index into a sequence of `len` elements.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(self.rng.gen_range(0..len))
        }
    }

    /// In-place Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            items.swap(i, j);
        }
    }
}

/// The fixed triple every run receives.
pub struct CapabilityBindings<'a> {
    pub output: &'a mut dyn OutputSink,
    pub random: &'a mut RandomModule,
    pub runtime: &'a mut HostRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn randint_stays_within_inclusive_bounds() {
        let mut random = RandomModule::new(Some(7));
        let mut seen = [false; 3];
        for _ in 0..200 {
            let n = random.randint(1.0, 3.0);
            assert!((1.0..=3.0).contains(&n));
            assert_eq!(n.fract(), 0.0);
            seen[(n - 1.0) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RandomModule::new(Some(42));
        let mut b = RandomModule::new(Some(42));
        for _ in 0..10 {
            assert_eq!(a.random(), b.random());
        }
    }

    #[test]
    fn shuffle_keeps_every_element() {
        let mut random = RandomModule::new(Some(1));
        let mut items: Vec<u32> = (0..20).collect();
        random.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn empty_sequence_has_no_index() {
        let mut random = RandomModule::new(Some(1));
        assert_eq!(random.index(0), None);
    }
}
