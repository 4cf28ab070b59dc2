//! Sort strategy selection.
//!
//! DIRECT queries always sort by recency so the user's own field shows what
//! is newest. Every other query type draws once from the injected random
//! source:
//!
//! | draw            | decision  |
//! |-----------------|-----------|
//! | `[0.00, 0.40)`  | Relevance |
//! | `[0.40, 0.70)`  | Citations |
//! | `[0.70, 1.00)`  | Recency   |

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{QueryType, SortDecision};

const RELEVANCE_CUTOFF: f64 = 0.40;
const CITATIONS_CUTOFF: f64 = 0.70;

/// Source of uniform samples in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_float(&mut self) -> f64;
}

/// `rand`-backed source. Seed it for reproducible runs.
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl RandomSource for StdRandom {
    fn next_float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

pub struct SortStrategySelector {
    random: Box<dyn RandomSource>,
}

impl SortStrategySelector {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Pick the ranking mode for one query. Consumes at most one draw.
    pub fn select_strategy(&mut self, query_type: QueryType) -> SortDecision {
        if query_type == QueryType::Direct {
            return SortDecision::Recency;
        }
        decision_for_sample(self.random.next_float())
    }
}

impl Default for SortStrategySelector {
    fn default() -> Self {
        Self::new(Box::new(StdRandom::from_entropy()))
    }
}

fn decision_for_sample(sample: f64) -> SortDecision {
    if sample < RELEVANCE_CUTOFF {
        SortDecision::Relevance
    } else if sample < CITATIONS_CUTOFF {
        SortDecision::Citations
    } else {
        SortDecision::Recency
    }
}
