use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Weighted persona selection. Weights are normalized to sum to 1.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Blender {
    weights: BTreeMap<String, f64>,
}

impl Blender {
    /// Drops non-positive and non-finite weights, then normalizes the rest.
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        let mut weights: BTreeMap<String, f64> = weights
            .into_iter()
            .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
            .collect();
        let total: f64 = weights.values().sum();
        if total > 0.0 {
            for weight in weights.values_mut() {
                *weight /= total;
            }
        }
        Self { weights }
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn choose(&self, stochastic: bool) -> Option<&str> {
        if stochastic {
            self.choose_with_roll(random_unit())
        } else {
            self.choose_max()
        }
    }

    /// Highest weight wins; ties go to the name that sorts first.
    pub fn choose_max(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (name, weight) in &self.weights {
            if best.is_none_or(|(_, best_weight)| *weight > best_weight) {
                best = Some((name.as_str(), *weight));
            }
        }
        best.map(|(name, _)| name)
    }

    /// Walks the cumulative distribution with `roll` in `[0, 1)`.
    pub fn choose_with_roll(&self, roll: f64) -> Option<&str> {
        let roll = roll.clamp(0.0, 1.0);
        let mut cumulative = 0.0;
        let mut last = None;
        for (name, weight) in &self.weights {
            cumulative += weight;
            last = Some(name.as_str());
            if roll < cumulative {
                return last;
            }
        }
        // Rounding can leave the total a hair under 1.0.
        last
    }
}

/// Uniform sample in `[0, 1)` from the OS RNG, falling back to the clock.
pub(crate) fn random_unit() -> f64 {
    random_u64() as f64 / (1u64 << 53) as f64
}

pub(crate) fn random_index(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (random_unit() * len as f64) as usize % len
}

fn random_u64() -> u64 {
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.subsec_nanos())
            .unwrap_or(0);
        return u64::from(nanos) & ((1u64 << 53) - 1);
    }
    u64::from_le_bytes(bytes) >> 11
}
