//! Tie-break Policies
//!
//! Picks one region when several are equally loaded. The source of
//! randomness is injected so tests can pin the outcome.

use std::sync::{Mutex, PoisonError};

/// Chooses one index out of `candidates` equally ranked regions
pub trait TieBreaker: Send + Sync + std::fmt::Debug {
    /// Return an index in `0..candidates`; `candidates` is always at least 1
    fn pick(&self, candidates: usize) -> usize;
}

/// Uniform random choice
///
/// Unseeded instances use fastrand's thread-local generator, so concurrent
/// callers never contend on a lock.
#[derive(Debug, Default)]
pub struct RandomTieBreaker {
    rng: Option<Mutex<fastrand::Rng>>,
}

impl RandomTieBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reproducible sequence for tests and simulations
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Some(Mutex::new(fastrand::Rng::with_seed(seed))),
        }
    }
}

impl TieBreaker for RandomTieBreaker {
    fn pick(&self, candidates: usize) -> usize {
        if candidates <= 1 {
            return 0;
        }
        match &self.rng {
            Some(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .usize(..candidates),
            None => fastrand::usize(..candidates),
        }
    }
}

/// Always the first candidate in registration order
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstTieBreaker;

impl TieBreaker for FirstTieBreaker {
    fn pick(&self, _candidates: usize) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_candidate() {
        assert_eq!(RandomTieBreaker::new().pick(1), 0);
        assert_eq!(RandomTieBreaker::with_seed(7).pick(1), 0);
    }

    #[test]
    fn test_random_in_range_and_covers_all() {
        let breaker = RandomTieBreaker::new();
        let mut seen = [false; 3];
        for _ in 0..500 {
            let idx = breaker.pick(3);
            assert!(idx < 3);
            seen[idx] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = RandomTieBreaker::with_seed(42);
        let b = RandomTieBreaker::with_seed(42);
        let left: Vec<usize> = (0..20).map(|_| a.pick(5)).collect();
        let right: Vec<usize> = (0..20).map(|_| b.pick(5)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_first() {
        assert_eq!(FirstTieBreaker.pick(4), 0);
    }
}
