// SPDX-License-Identifier: Apache-2.0

use tokio::task::JoinSet;
use tracing::error;

use crate::init::BoxError;

/// Resolves when the first task in `tasks` finishes, with its result.
pub async fn wait_for_any_task(tasks: &mut JoinSet<Result<(), BoxError>>) -> Result<(), BoxError> {
    let r = tasks.join_next().await;

    match r {
        None => Ok(()), // should not happen
        Some(res) => res?,
    }
}

/// Waits for every remaining task; the last error seen is returned.
pub async fn wait_for_tasks(tasks: &mut JoinSet<Result<(), BoxError>>) -> Result<(), BoxError> {
    let mut result = Ok(());
    while let Some(v) = tasks.join_next().await {
        match v {
            Ok(Ok(())) => {}
            Ok(Err(e)) => result = Err(e),
            Err(e) => {
                error!("Failed to join with task: {:?}", e)
            }
        }
    }

    result
}
