//! Random tie-breaking perturbation added to every score.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bounded uniform noise source.
///
/// Each ranking mode asks for noise in `[0, range)`; the jitter scales that
/// range by `scale`. A scale of zero disables the noise entirely, which makes
/// rankings deterministic.
pub struct Jitter {
    scale: f64,
    rng: Mutex<StdRng>,
}

impl Jitter {
    /// Noise seeded from the operating system.
    pub fn from_entropy(scale: f64) -> Self {
        Self {
            scale: sanitize_scale(scale),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible noise.
    pub fn seeded(seed: u64, scale: f64) -> Self {
        Self {
            scale: sanitize_scale(scale),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// No noise at all.
    pub fn disabled() -> Self {
        Self::seeded(0, 0.0)
    }

    /// Build from the ranking config: seeded when a seed is given.
    pub fn from_config(scale: f64, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed, scale),
            None => Self::from_entropy(scale),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// A sample in `[0, range * scale)`, or `0.0` when that interval is empty.
    pub fn sample(&self, range: f64) -> f64 {
        let width = range * self.scale;
        if width <= 0.0 || !width.is_finite() {
            return 0.0;
        }
        self.rng.lock().random_range(0.0..width)
    }
}

fn sanitize_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        0.0
    }
}

impl std::fmt::Debug for Jitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jitter").field("scale", &self.scale).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_zero() {
        let jitter = Jitter::disabled();
        assert_eq!(jitter.sample(3.0), 0.0);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let jitter = Jitter::seeded(7, 1.0);
        for _ in 0..1000 {
            let v = jitter.sample(2.0);
            assert!((0.0..2.0).contains(&v), "sample {} out of range", v);
        }
    }

    #[test]
    fn test_scale_narrows_range() {
        let jitter = Jitter::seeded(7, 0.5);
        for _ in 0..1000 {
            assert!(jitter.sample(3.0) < 1.5);
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = Jitter::seeded(42, 1.0);
        let b = Jitter::seeded(42, 1.0);
        for _ in 0..10 {
            assert_eq!(a.sample(3.0), b.sample(3.0));
        }
    }

    #[test]
    fn test_bad_scale_disables() {
        assert_eq!(Jitter::seeded(1, -2.0).sample(3.0), 0.0);
        assert_eq!(Jitter::seeded(1, f64::NAN).sample(3.0), 0.0);
    }
}
