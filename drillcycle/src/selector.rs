//! Weighted random extractor selection.
//!
//! A single pass over the eligible snapshot (reservoir sampling with
//! weights): each drill's weight is its efficiency times a fresh luck draw,
//! and the held selection is replaced with probability
//! `weight / running_total`. The final pick is therefore proportional to
//! weight without a second pass or a prefix-sum table.

use rand::Rng;
use tracing::{debug, warn};

use crate::index::EligibleDrill;
use crate::model::{DrillId, OperatorId};
use crate::random::{self, RandomSource};

/// Default lower bound of the luck factor.
pub const DEFAULT_MIN_LUCK: f64 = 0.9;

/// Default upper bound of the luck factor.
pub const DEFAULT_MAX_LUCK: f64 = 1.1;

/// Bounds of the uniform luck factor applied to each drill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuckRange {
    pub min: f64,
    pub max: f64,
}

impl LuckRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A range that always draws exactly 1.
    pub fn neutral() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl Default for LuckRange {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LUCK, DEFAULT_MAX_LUCK)
    }
}

/// Result of one selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extraction {
    pub drill_id: DrillId,
    pub owner_operator_id: OperatorId,
    pub efficiency: f64,
    /// Sum of every drill's weight in this draw.
    pub total_weight: f64,
}

/// Picks the cycle's extractor from an eligible snapshot.
#[derive(Debug)]
pub struct ExtractorSelector {
    luck: LuckRange,
    rng: RandomSource,
}

impl ExtractorSelector {
    pub fn new(luck: LuckRange, seed: Option<u64>) -> Self {
        Self {
            luck,
            rng: RandomSource::new(seed),
        }
    }

    pub fn luck(&self) -> LuckRange {
        self.luck
    }

    /// Selects one drill with probability proportional to
    /// `efficiency × luck`.
    ///
    /// Returns `None` for an empty snapshot or when every weight is zero.
    pub fn select(&self, snapshot: &[(DrillId, EligibleDrill)]) -> Option<Extraction> {
        if snapshot.is_empty() {
            debug!("No eligible drills, skipping extractor selection");
            return None;
        }

        let (held, total_weight) = self.rng.with(|rng| {
            let mut total_weight = 0.0;
            let mut held: Option<(DrillId, EligibleDrill)> = None;

            for (id, drill) in snapshot {
                let luck = random::uniform(rng, self.luck.min, self.luck.max);
                let weight = drill.efficiency * luck;
                if weight.is_nan() || weight <= 0.0 {
                    continue;
                }
                total_weight += weight;
                if rng.gen::<f64>() < weight / total_weight {
                    held = Some((*id, *drill));
                }
            }

            (held, total_weight)
        });

        if total_weight == 0.0 {
            warn!(
                drills = snapshot.len(),
                "Total selection weight is zero, no extractor this cycle"
            );
            return None;
        }

        held.map(|(drill_id, drill)| Extraction {
            drill_id,
            owner_operator_id: drill.owner_operator_id,
            efficiency: drill.efficiency,
            total_weight,
        })
    }
}
