use futures::future::join_all;
use futures::FutureExt;
use log::{debug, error, info};
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::retrier::{CheckOutcome, PipelineRetrier};

/// How a single pipeline check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed(CheckOutcome),
    Panicked(String),
}

/// Settlements of one check cycle, in configuration order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub settlements: Vec<(u64, Settlement)>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    /// Number of pipelines in which at least one failed job was found.
    pub fn with_failed_jobs(&self) -> usize {
        self.settlements
            .iter()
            .filter(|(_, settlement)| {
                matches!(settlement, Settlement::Completed(outcome) if outcome.saw_failed_jobs())
            })
            .count()
    }

    /// Number of checks that did not run to completion, either because the
    /// pipeline could not be fetched or because the check panicked.
    pub fn unfinished(&self) -> usize {
        self.settlements
            .iter()
            .filter(|(_, settlement)| {
                !matches!(settlement, Settlement::Completed(CheckOutcome::Checked { .. }))
            })
            .count()
    }
}

/// Check every pipeline concurrently and wait until all of them settle.
///
/// A panic inside one check is caught and recorded as
/// `Settlement::Panicked`; the remaining checks keep running.
pub async fn check_and_retry_all_pipelines(
    retrier: &PipelineRetrier,
    pipeline_ids: &[u64],
) -> BatchOutcome {
    info!("Checking {} pipeline(s)...", pipeline_ids.len());

    let checks = pipeline_ids.iter().map(|&pipeline_id| async move {
        let settlement = match AssertUnwindSafe(retrier.check_and_retry_pipeline(pipeline_id))
            .catch_unwind()
            .await
        {
            Ok(outcome) => Settlement::Completed(outcome),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Check of pipeline {pipeline_id} panicked: {message}");
                Settlement::Panicked(message)
            }
        };
        (pipeline_id, settlement)
    });

    let outcome = BatchOutcome {
        settlements: join_all(checks).await,
    };

    debug!(
        "Settled {} pipeline check(s): {} with failed jobs, {} unfinished",
        outcome.len(),
        outcome.with_failed_jobs(),
        outcome.unfinished()
    );

    outcome
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
