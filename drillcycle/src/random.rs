//! Random sources for the per-cycle draws.
//!
//! Each component that draws owns its own [`RandomSource`], so selection and
//! fuel draws never share a stream. A fixed seed makes a component
//! reproducible; without one the source is seeded from the OS.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A lockable, optionally seeded random number generator.
pub struct RandomSource {
    rng: Mutex<StdRng>,
}

impl RandomSource {
    /// Creates a source from an optional seed.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Runs `f` with exclusive access to the generator.
    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock();
        f(&mut *rng)
    }

    /// Draws from `Uniform(min, max)`.
    pub fn uniform(&self, min: f64, max: f64) -> f64 {
        self.with(|rng| uniform(rng, min, max))
    }
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomSource").finish_non_exhaustive()
    }
}

/// Draws from `Uniform(min, max)`.
///
/// A degenerate range returns `min`; `gen_range` would panic on it. NaN bounds
/// propagate as NaN so callers can apply their own fallback.
pub fn uniform<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    if min.is_nan() || max.is_nan() {
        return f64::NAN;
    }
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}
