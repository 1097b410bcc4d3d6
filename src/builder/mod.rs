//! Pipeline stage builders and shared batch machinery.
//!
//! Each stage is a pure function from a set of input artifacts to one
//! or more output documents: list inputs, transform each item through a
//! bounded worker pool, then write fully assembled documents through
//! storage. Per-item failures are collected into a [`StageSummary`];
//! only storage-root-level failures abort a stage.

pub mod catalog;
pub mod index;
pub mod playlist;
pub mod video;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use glob::Pattern;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::storage::{Location, Storage, StorageError};

pub use catalog::EmptyCatalogError;

/// Outcome of one item within a stage batch.
#[derive(Debug)]
pub enum ItemOutcome<R> {
    /// Item fully processed; `value` feeds the next step of the stage
    Done { item: String, value: R },

    /// Item intentionally not processed (e.g. unprobeable media)
    Skipped { item: String, reason: String },

    /// Item failed; the batch continues
    Failed { item: String, error: String },

    /// Storage-root-level failure; aborts the batch, abandoning all
    /// provisional work for not-yet-completed items
    Fatal { error: anyhow::Error },
}

/// Per-stage result summary, printed at the end of a run.
#[derive(Debug)]
pub struct StageSummary {
    pub stage: &'static str,
    pub succeeded: Vec<String>,
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl StageSummary {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// True when no item failed (skips do not count as failures).
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} stage: {} succeeded, {} skipped, {} failed",
            self.stage,
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        for (item, reason) in &self.skipped {
            writeln!(f, "  skipped {item}: {reason}")?;
        }
        for (item, error) in &self.failed {
            writeln!(f, "  failed {item}: {error}")?;
        }
        Ok(())
    }
}

/// Run one operation per item through a bounded worker pool.
///
/// A `Fatal` outcome aborts every outstanding worker and surfaces as
/// the stage error; all other outcomes are collected. Completion order
/// is nondeterministic — callers sort before emitting documents.
pub(crate) async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    op: F,
) -> Result<Vec<ItemOutcome<R>>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ItemOutcome<R>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut workers: JoinSet<ItemOutcome<R>> = JoinSet::new();

    for item in items {
        let semaphore = semaphore.clone();
        let op = op.clone();
        workers.spawn(async move {
            // unwrap is safe: the semaphore is never closed
            let _permit = semaphore.acquire_owned().await.unwrap();
            op(item).await
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(ItemOutcome::Fatal { error }) => {
                workers.abort_all();
                while workers.join_next().await.is_some() {}
                return Err(error);
            }
            Ok(outcome) => outcomes.push(outcome),
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(_) => {} // worker cancelled during abort
        }
    }
    Ok(outcomes)
}

/// Fold worker outcomes into a summary plus the produced values,
/// logging skips and failures as they are recorded. Both the summary
/// lists and the values are sorted for deterministic output.
pub(crate) fn fold_outcomes<R>(
    stage: &'static str,
    outcomes: Vec<ItemOutcome<R>>,
) -> (StageSummary, Vec<(String, R)>) {
    let mut summary = StageSummary::new(stage);
    let mut values = Vec::new();

    for outcome in outcomes {
        match outcome {
            ItemOutcome::Done { item, value } => {
                summary.succeeded.push(item.clone());
                values.push((item, value));
            }
            ItemOutcome::Skipped { item, reason } => {
                warn!(stage, %item, %reason, "item skipped");
                summary.skipped.push((item, reason));
            }
            ItemOutcome::Failed { item, error } => {
                error!(stage, %item, %error, "item failed");
                summary.failed.push((item, error));
            }
            ItemOutcome::Fatal { .. } => unreachable!("fatal outcomes abort run_bounded"),
        }
    }

    summary.succeeded.sort();
    summary.skipped.sort();
    summary.failed.sort();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    (summary, values)
}

/// List the files under `root` whose file name matches `pattern`,
/// optionally restricted to direct children (no subdirectory descent).
pub(crate) async fn discover(
    storage: &Storage,
    root: &Location,
    pattern: &Pattern,
    direct_only: bool,
) -> Result<Vec<Location>, StorageError> {
    let mut found = Vec::new();
    for location in storage.list(root).await? {
        let Some(name) = location.file_name() else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        if direct_only && location.parent().as_ref() != Some(root) {
            continue;
        }
        found.push(location);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_collects_all_outcomes() {
        let outcomes = run_bounded(vec![1u32, 2, 3, 4], 2, |n| async move {
            if n % 2 == 0 {
                ItemOutcome::Done {
                    item: n.to_string(),
                    value: n * 10,
                }
            } else {
                ItemOutcome::Skipped {
                    item: n.to_string(),
                    reason: "odd".to_string(),
                }
            }
        })
        .await
        .unwrap();

        let (summary, values) = fold_outcomes("test", outcomes);
        assert_eq!(summary.succeeded, vec!["2", "4"]);
        assert_eq!(summary.skipped.len(), 2);
        assert!(summary.is_success());
        assert_eq!(values, vec![("2".to_string(), 20), ("4".to_string(), 40)]);
    }

    #[tokio::test]
    async fn fatal_outcome_aborts_the_batch() {
        let result = run_bounded(vec![1u32, 2, 3], 1, |n| async move {
            if n == 2 {
                ItemOutcome::Fatal {
                    error: anyhow::anyhow!("root gone"),
                }
            } else {
                ItemOutcome::Done {
                    item: n.to_string(),
                    value: n,
                }
            }
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn values_come_back_sorted_regardless_of_completion_order() {
        use std::time::Duration;

        // Earlier items sleep longer, so completion order is reversed.
        let outcomes = run_bounded(vec![("b", 30u64), ("a", 20), ("c", 10)], 3, |(name, ms)| {
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ItemOutcome::Done {
                    item: name.to_string(),
                    value: name,
                }
            }
        })
        .await
        .unwrap();

        let (_, values) = fold_outcomes("test", outcomes);
        let names: Vec<_> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
