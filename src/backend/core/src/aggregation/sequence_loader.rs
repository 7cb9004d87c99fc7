//! Sequence loading, oldest first.

use std::cmp::Ordering;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{ExperimentId, Sequence};
use crate::store::{find_all, FindAll, OrderBy, Predicate, ReadStore};
use crate::telemetry::{LevelLoadMetrics, LoadOutcome, OperationTimer};

/// Creation time ascending, then id ascending.
pub fn sequence_order(a: &Sequence, b: &Sequence) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Load the sequences of an already-authorized experiment.
#[instrument(level = "debug", skip(store), fields(experiment_id = %experiment_id))]
pub async fn load_sequences(
    store: &dyn ReadStore,
    experiment_id: ExperimentId,
    limit: Option<usize>,
) -> Result<Vec<Sequence>> {
    let timer = OperationTimer::start();
    let query = FindAll::new(Predicate::new().eq("experiment_id", experiment_id))
        .order_by(OrderBy::asc("created_at"))
        .order_by(OrderBy::asc("id"))
        .limit(limit);

    let mut sequences = match find_all::<Sequence>(store, &query).await {
        Ok(rows) => rows,
        Err(e) => {
            LevelLoadMetrics::record("sequences", LoadOutcome::Failed, 0, timer.elapsed());
            return Err(e);
        }
    };
    sequences.sort_by(sequence_order);

    LevelLoadMetrics::record("sequences", LoadOutcome::Ok, sequences.len(), timer.elapsed());
    debug!(count = sequences.len(), "Sequences loaded");
    Ok(sequences)
}
