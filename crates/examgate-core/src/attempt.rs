//! Attempt state machine.
//!
//! ```text
//!   start-attempt            complete-attempt
//!  ───────────────▶ active ───────────────────▶ completed (terminal)
//!                    │  ▲
//!                    └──┘ submit-answers
//! ```
//!
//! Lookups that target an attempt filter on the caller's identity, so a
//! foreign attempt and a missing one both read as `NotFound`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Conflict, ServiceError, StoreError};
use crate::model::{AnswerInput, Attempt, AttemptId, NewAnswer, Principal, Submission, Test};
use crate::policy::{owns_attempt, Decision};
use crate::traits::{Store, StoreTx};

pub struct AttemptMachine {
    store: Arc<dyn Store>,
}

impl AttemptMachine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open a new attempt on `test` for the principal.
    ///
    /// The store performs the "no other active attempt" check and the insert
    /// as one atomic step.
    pub async fn start(&self, principal: &Principal, test: &Test) -> Result<Attempt, ServiceError> {
        if !test.accepts_attempts() {
            return Err(ServiceError::TestNotActive(test.id.to_string()));
        }

        let attempt = self
            .store
            .create_attempt(&principal.identity, test.id, Utc::now())
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(Conflict::ActiveAttempt) => {
                    tracing::info!(
                        learner = %principal.identity,
                        "learner already has an active attempt on test {}",
                        test.id
                    );
                    ServiceError::Conflict(Conflict::ActiveAttempt)
                }
                other => other.into(),
            })?;

        tracing::info!(
            learner = %attempt.learner,
            "attempt {} started on test {}",
            attempt.id,
            attempt.test_id
        );
        Ok(attempt)
    }

    /// Move an active attempt owned by the principal to `completed`.
    ///
    /// Attempts on a soft-deleted test read as `NotFound`.
    pub async fn complete(
        &self,
        principal: &Principal,
        attempt_id: AttemptId,
    ) -> Result<Attempt, ServiceError> {
        attempt_id.validate()?;
        match self
            .store
            .complete_attempt(attempt_id, &principal.identity, Utc::now())
            .await?
        {
            Some(attempt) => {
                tracing::info!(learner = %attempt.learner, "attempt {} completed", attempt.id);
                Ok(attempt)
            }
            None => Err(ServiceError::not_found(AttemptId::LABEL, attempt_id)),
        }
    }

    /// Record a batch of answers, all or nothing.
    pub async fn submit(
        &self,
        principal: &Principal,
        items: &[AnswerInput],
    ) -> Result<Submission, ServiceError> {
        validate_batch(items)?;

        let batch_id = Uuid::new_v4();
        let mut tx = self.store.begin().await?;

        match stage_batch(tx.as_mut(), principal, items, batch_id).await {
            Ok(()) => {
                let answers = tx.commit().await?;
                tracing::info!(
                    learner = %principal.identity,
                    %batch_id,
                    "committed {} answers",
                    answers.len()
                );
                Ok(Submission { batch_id, answers })
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("rollback of batch {batch_id} failed: {rollback_err}");
                }
                tracing::warn!(
                    learner = %principal.identity,
                    %batch_id,
                    "answer batch rejected: {e}"
                );
                Err(e)
            }
        }
    }
}

fn validate_batch(items: &[AnswerInput]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidInput("answer list is empty".into()));
    }
    let mut seen = HashSet::new();
    for item in items {
        item.attempt_id.validate()?;
        item.question_id.validate()?;
        if !seen.insert((item.attempt_id, item.question_id)) {
            return Err(ServiceError::InvalidInput(format!(
                "question {} answered twice for attempt {}",
                item.question_id, item.attempt_id
            )));
        }
    }
    Ok(())
}

async fn stage_batch(
    tx: &mut dyn StoreTx,
    principal: &Principal,
    items: &[AnswerInput],
    batch_id: Uuid,
) -> Result<(), ServiceError> {
    let submitted_at = Utc::now();

    for item in items {
        let attempt = tx
            .find_attempt(item.attempt_id)
            .await?
            .filter(|a| matches!(owns_attempt(principal, &a.learner), Decision::Allow(_)))
            .filter(Attempt::is_active)
            .ok_or_else(|| ServiceError::not_found(AttemptId::LABEL, item.attempt_id))?;
        let live = tx
            .find_test(attempt.test_id)
            .await?
            .is_some_and(|t| !t.deleted);
        if !live {
            return Err(ServiceError::not_found(AttemptId::LABEL, attempt.id));
        }

        let question = tx.find_question(item.question_id).await?.ok_or_else(|| {
            ServiceError::InvalidInput(format!("question {} does not exist", item.question_id))
        })?;
        if question.test_id != attempt.test_id {
            return Err(ServiceError::InvalidInput(format!(
                "question {} does not belong to test {}",
                question.id, attempt.test_id
            )));
        }

        tx.stage_answer(NewAnswer {
            learner: principal.identity.clone(),
            attempt_id: attempt.id,
            question_id: question.id,
            value: item.value.clone(),
            batch_id,
            submitted_at,
        })
        .await?;
    }

    Ok(())
}
