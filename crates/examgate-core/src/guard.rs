//! Test mutability guard.
//!
//! A test's questions are frozen as soon as any attempt references it. The
//! lock is one-way: attempt counts never decrease, so it never reopens.
//!
//! The guard answers early; `Store::insert_question` enforces the same rule
//! atomically, so an attempt started after the check still wins.

use std::sync::Arc;

use crate::error::{Conflict, ServiceError, StoreError};
use crate::model::TestId;
use crate::traits::Store;

pub struct MutabilityGuard {
    store: Arc<dyn Store>,
}

impl MutabilityGuard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `true` iff no attempt, in any state, has ever referenced `test`.
    pub async fn can_mutate_structure(&self, test: TestId) -> Result<bool, StoreError> {
        Ok(self.store.count_attempts(test).await? == 0)
    }

    /// Fail with `Conflict(StructureLocked)` once the test is locked.
    pub async fn ensure_unlocked(&self, test: TestId) -> Result<(), ServiceError> {
        if self.can_mutate_structure(test).await? {
            Ok(())
        } else {
            tracing::info!("test {test} has attempts, rejecting structural edit");
            Err(ServiceError::Conflict(Conflict::StructureLocked))
        }
    }
}
