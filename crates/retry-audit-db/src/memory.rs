//! In-process counter backend with fault injection.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use tokio::sync::Mutex;

use crate::schema::CounterTable;
use crate::{Error, Result};

/// Which operations of the memory backend should fail, and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Every n-th increment reports an error.
    pub fail_every: Option<NonZeroUsize>,
    /// Apply a failing increment before reporting its error.
    pub commit_failed: bool,
    /// Number of leading reset attempts that fail.
    pub fail_resets: usize,
    /// Number of leading reads that fail.
    pub fail_reads: usize,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every n-th update fails after its increment was applied.
    pub fn phantom_failures(every: NonZeroUsize) -> Self {
        Self {
            fail_every: Some(every),
            commit_failed: true,
            ..Self::default()
        }
    }

    /// Every n-th update fails and leaves the counter untouched.
    pub fn lost_updates(every: NonZeroUsize) -> Self {
        Self {
            fail_every: Some(every),
            commit_failed: false,
            ..Self::default()
        }
    }

    pub fn with_failed_resets(mut self, count: usize) -> Self {
        self.fail_resets = count;
        self
    }

    pub fn with_failed_reads(mut self, count: usize) -> Self {
        self.fail_reads = count;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    tables: HashMap<String, i64>,
    increments: usize,
    resets: usize,
    reads: usize,
}

pub(crate) struct MemoryState {
    plan: FaultPlan,
    counters: Mutex<Counters>,
}

impl MemoryState {
    pub(crate) fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub(crate) async fn reset(&self, table: &CounterTable) -> Result<()> {
        let mut counters = self.counters.lock().await;
        counters.resets += 1;
        if counters.resets <= self.plan.fail_resets {
            return Err(Error::Fault {
                details: format!(
                    "reset attempt {} of `{}` rejected",
                    counters.resets,
                    table.name()
                ),
            });
        }
        counters.tables.insert(table.name().to_string(), 0);
        Ok(())
    }

    pub(crate) async fn increment(&self, table: &CounterTable) -> Result<u64> {
        let mut counters = self.counters.lock().await;
        counters.increments += 1;
        let sequence = counters.increments;
        let fails = self
            .plan
            .fail_every
            .is_some_and(|every| sequence % every.get() == 0);

        if fails && !self.plan.commit_failed {
            return Err(Error::Fault {
                details: format!("update {sequence} rejected"),
            });
        }

        let value = counters
            .tables
            .get_mut(table.name())
            .ok_or_else(|| Error::Query {
                table: table.name().to_string(),
                details: "Table not found".to_string(),
            })?;
        *value += 1;

        if fails {
            return Err(Error::Fault {
                details: format!("update {sequence} committed but reported as failed"),
            });
        }
        Ok(1)
    }

    pub(crate) async fn read(&self, table: &CounterTable) -> Result<i64> {
        let mut counters = self.counters.lock().await;
        counters.reads += 1;
        if counters.reads <= self.plan.fail_reads {
            return Err(Error::Fault {
                details: format!("read {} of `{}` rejected", counters.reads, table.name()),
            });
        }
        counters
            .tables
            .get(table.name())
            .copied()
            .ok_or_else(|| Error::Query {
                table: table.name().to_string(),
                details: "Table not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_increment_requires_reset() {
        let state = MemoryState::new(FaultPlan::none());
        let err = state.increment(&CounterTable::default()).await.unwrap_err();
        assert!(matches!(err, Error::Query { .. }));
    }

    #[tokio::test]
    async fn test_phantom_failure_still_increments() {
        let table = CounterTable::default();
        let state = MemoryState::new(FaultPlan::phantom_failures(every(2)));
        state.reset(&table).await.unwrap();

        assert!(state.increment(&table).await.is_ok());
        assert!(matches!(
            state.increment(&table).await,
            Err(Error::Fault { .. })
        ));
        assert_eq!(state.read(&table).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lost_update_leaves_counter() {
        let table = CounterTable::default();
        let state = MemoryState::new(FaultPlan::lost_updates(every(1)));
        state.reset(&table).await.unwrap();

        assert!(state.increment(&table).await.is_err());
        assert_eq!(state.read(&table).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_leading_resets_and_reads_fail() {
        let table = CounterTable::default();
        let state = MemoryState::new(FaultPlan::none().with_failed_resets(2).with_failed_reads(1));

        assert!(state.reset(&table).await.is_err());
        assert!(state.reset(&table).await.is_err());
        state.reset(&table).await.unwrap();

        assert!(state.read(&table).await.is_err());
        assert_eq!(state.read(&table).await.unwrap(), 0);
    }
}
