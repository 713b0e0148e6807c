//! Relative valuation of a listing against its comparables.
//!
//! The comparable set is every stored listing with the same make, model and
//! year whose price and mileage are both positive. Price and mileage are each
//! scored "lower is better" by pushing the candidate's z-score through a
//! logistic curve, then blended 60/40 into a 0.0–5.0 mark.

use crate::models::Listing;
use crate::storage::ListingStore;
use anyhow::Result;

/// Mark given when there is nothing to compare against.
pub const NEUTRAL_MARK: f64 = 2.5;
pub const MAX_MARK: f64 = 5.0;

const NEUTRAL_SCORE: f64 = 0.5;
const PRICE_WEIGHT: f64 = 0.60;
const MILEAGE_WEIGHT: f64 = 0.40;
const MIN_SPREAD: f64 = 1e-9;

/// Look up the candidate's comparables and mark it against them.
pub fn score(candidate: &Listing, store: &dyn ListingStore) -> Result<f64> {
    let comparables =
        store.find_by_make_model_year(&candidate.make, &candidate.model, &candidate.year)?;
    Ok(mark_against(candidate, &comparables))
}

pub fn mark_against(candidate: &Listing, comparables: &[Listing]) -> f64 {
    let valid: Vec<&Listing> = comparables
        .iter()
        .filter(|c| c.price > 0.0 && c.mileage_km > 0)
        .collect();

    if valid.is_empty() {
        return NEUTRAL_MARK;
    }

    let prices: Vec<f64> = valid.iter().map(|c| c.price).collect();
    let mileages: Vec<f64> = valid.iter().map(|c| c.mileage_km as f64).collect();

    let price_score = lower_is_better(candidate.price, &prices);
    let mileage_score = lower_is_better(candidate.mileage_km as f64, &mileages);

    let combined = PRICE_WEIGHT * price_score + MILEAGE_WEIGHT * mileage_score;
    round_to_tenth((combined * MAX_MARK).clamp(0.0, MAX_MARK))
}

/// 0..1, above 0.5 when `value` sits below the peer mean.
pub fn lower_is_better(value: f64, peers: &[f64]) -> f64 {
    if value.is_nan() || value <= 0.0 || peers.is_empty() {
        return NEUTRAL_SCORE;
    }

    let (mean, std) = mean_and_stddev(peers);
    if std <= MIN_SPREAD {
        return NEUTRAL_SCORE;
    }

    let z = (value - mean) / std;
    (1.0 / (1.0 + z.exp())).clamp(0.0, 1.0)
}

/// Arithmetic mean and population standard deviation.
fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Half-up on the tenths digit.
fn round_to_tenth(x: f64) -> f64 {
    (x * 10.0 + 0.5).floor() / 10.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
