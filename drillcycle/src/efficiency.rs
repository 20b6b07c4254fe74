//! Cumulative efficiency accounting.
//!
//! An operator's cumulative efficiency is the proportional-reward weight used
//! at settlement:
//!
//! ```text
//! Σ active-drill EFF × efficiency_multiplier × luck + efficiency_credits
//! ```
//!
//! Luck is applied here, once, when the value is recomputed. Settlement reads
//! the stored value and never re-applies luck.

use crate::model::Drill;

/// Computes cumulative efficiency for one operator's drills.
///
/// Inactive drills contribute nothing; credits are added even when the
/// operator has no active drill.
pub fn cumulative_efficiency(drills: &[Drill], multiplier: f64, credits: f64, luck: f64) -> f64 {
    let base: f64 = drills
        .iter()
        .filter(|d| d.active)
        .map(|d| d.efficiency_rating)
        .sum();
    base * multiplier * luck + credits
}
