//! Discrete distribution sampler
//!
//! A sorted table of `(cumulative_probability, value)` pairs. Sampling draws
//! `u` in `[0, 1)` and returns the first entry whose cumulative bound is
//! above `u`. Adding a category is adding a row.

use rand::Rng;

use crate::error::SetupError;

#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    /// Cumulative bounds, strictly increasing, last is 1.0
    entries: Vec<(f64, T)>,
}

impl<T: Clone> WeightedTable<T> {
    /// Build from relative weights; zero-weight rows are dropped
    pub fn new(weights: impl IntoIterator<Item = (f64, T)>) -> Result<Self, SetupError> {
        let rows: Vec<(f64, T)> = weights.into_iter().collect();
        if rows.iter().any(|(w, _)| !w.is_finite() || *w < 0.0) {
            return Err(SetupError::invalid_config(
                "weights must be finite and non-negative",
            ));
        }
        let total: f64 = rows.iter().map(|(w, _)| w).sum();
        if total <= 0.0 {
            return Err(SetupError::invalid_config("weights must not all be zero"));
        }

        let mut cumulative = 0.0;
        let mut entries: Vec<(f64, T)> = rows
            .into_iter()
            .filter(|(w, _)| *w > 0.0)
            .map(|(w, value)| {
                cumulative += w / total;
                (cumulative, value)
            })
            .collect();
        // Float drift must not leave a gap at the top
        if let Some(last) = entries.last_mut() {
            last.0 = 1.0;
        }
        Ok(Self { entries })
    }

    pub fn sample(&self, rng: &mut impl Rng) -> T {
        let u: f64 = rng.gen();
        self.pick(u)
    }

    /// Value for a given uniform draw `u` in `[0, 1)`
    pub fn pick(&self, u: f64) -> T {
        let idx = self
            .entries
            .partition_point(|(bound, _)| *bound <= u)
            .min(self.entries.len() - 1);
        self.entries[idx].1.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
