//! Experiment resolution: the single ownership gate for a tree.

use tracing::{debug, instrument};

use crate::error::Result;
use crate::model::{Experiment, ExperimentId, PrincipalId};
use crate::store::{find_one, Predicate, ReadStore};
use crate::telemetry::{LevelLoadMetrics, LoadOutcome, OperationTimer};

/// Resolve an experiment owned by `principal`.
///
/// Returns `Ok(None)` both when the experiment does not exist and when it
/// belongs to someone else. Children are never checked again: they are only
/// reachable through an id returned from here.
#[instrument(level = "debug", skip(store), fields(experiment_id = %experiment_id))]
pub async fn resolve(
    store: &dyn ReadStore,
    experiment_id: ExperimentId,
    principal: &PrincipalId,
) -> Result<Option<Experiment>> {
    let timer = OperationTimer::start();
    let predicate = Predicate::new()
        .eq("id", experiment_id)
        .eq("principal_id", principal);

    let resolved = match find_one::<Experiment>(store, &predicate).await {
        Ok(found) => found.filter(|experiment| experiment.is_owned_by(principal)),
        Err(e) => {
            LevelLoadMetrics::record("experiment", LoadOutcome::Failed, 0, timer.elapsed());
            return Err(e);
        }
    };

    LevelLoadMetrics::record("experiment", LoadOutcome::Ok, usize::from(resolved.is_some()), timer.elapsed());
    debug!(found = resolved.is_some(), "Experiment resolved");
    Ok(resolved)
}
