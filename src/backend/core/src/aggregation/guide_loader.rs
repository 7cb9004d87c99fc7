//! Guide candidate loading, most efficient first.

use std::cmp::Ordering;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{GuideCandidate, SequenceId};
use crate::store::{find_all, FindAll, OrderBy, Predicate, ReadStore};
use crate::telemetry::{LevelLoadMetrics, LoadOutcome, OperationTimer};

/// Efficiency score descending, then id ascending.
pub fn guide_order(a: &GuideCandidate, b: &GuideCandidate) -> Ordering {
    b.efficiency_score
        .total_cmp(&a.efficiency_score)
        .then_with(|| a.id.cmp(&b.id))
}

/// Load the guide candidates designed against one sequence.
#[instrument(level = "debug", skip(store), fields(sequence_id = %sequence_id))]
pub async fn load_guides(
    store: &dyn ReadStore,
    sequence_id: SequenceId,
    limit: Option<usize>,
) -> Result<Vec<GuideCandidate>> {
    let timer = OperationTimer::start();
    let query = FindAll::new(Predicate::new().eq("sequence_id", sequence_id))
        .order_by(OrderBy::desc("efficiency_score"))
        .order_by(OrderBy::asc("id"))
        .limit(limit);

    let mut guides = match find_all::<GuideCandidate>(store, &query).await {
        Ok(rows) => rows,
        Err(e) => {
            LevelLoadMetrics::record("guides", LoadOutcome::Failed, 0, timer.elapsed());
            return Err(e);
        }
    };
    // Concurrent siblings may complete in any order; each list is ordered on its own.
    guides.sort_by(guide_order);

    LevelLoadMetrics::record("guides", LoadOutcome::Ok, guides.len(), timer.elapsed());
    debug!(count = guides.len(), "Guides loaded");
    Ok(guides)
}
