//! Random sources for the forced-sync sampling gate.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync + std::fmt::Debug {
    fn next_f64(&self) -> f64;
}

/// Thread-local RNG; the production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}

/// Reproducible sequence from a seed.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_range() {
        for _ in 0..1_000 {
            let x = ThreadRandom.next_f64();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        let xs: Vec<f64> = (0..16).map(|_| a.next_f64()).collect();
        let ys: Vec<f64> = (0..16).map(|_| b.next_f64()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_fixed_random() {
        assert_eq!(FixedRandom(0.25).next_f64(), 0.25);
    }
}
