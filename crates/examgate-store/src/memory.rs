//! In-memory entity store.
//!
//! All state sits behind one async mutex. Submission transactions hold the
//! lock from `begin` until commit, rollback or drop, so a batch observes and
//! writes a consistent snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use examgate_core::error::{Conflict, StoreError};
use examgate_core::model::{
    AnswerId, Attempt, AttemptId, AttemptState, Identity, NewAnswer, NewQuestion, NewTest,
    Question, QuestionId, SubmittedAnswer, Test, TestId, TestStatus,
};
use examgate_core::traits::{Store, StoreTx};

#[derive(Debug, Default)]
struct State {
    last_test: i64,
    last_question: i64,
    last_attempt: i64,
    last_answer: i64,
    tests: BTreeMap<TestId, Test>,
    questions: BTreeMap<QuestionId, Question>,
    attempts: BTreeMap<AttemptId, Attempt>,
    answers: BTreeMap<AnswerId, SubmittedAnswer>,
}

fn next_id(last: &mut i64) -> i64 {
    *last += 1;
    *last
}

impl State {
    fn upsert_answer(&mut self, answer: NewAnswer) -> SubmittedAnswer {
        let existing = self
            .answers
            .values()
            .find(|a| a.attempt_id == answer.attempt_id && a.question_id == answer.question_id)
            .map(|a| a.id);
        let id = match existing {
            Some(id) => id,
            None => AnswerId(next_id(&mut self.last_answer)),
        };

        let row = SubmittedAnswer {
            id,
            learner: answer.learner,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            value: answer.value,
            batch_id: answer.batch_id,
            submitted_at: answer.submitted_at,
        };
        self.answers.insert(id, row.clone());
        row
    }
}

/// Store backed by in-process maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of answer rows currently stored.
    pub async fn answer_count(&self) -> usize {
        self.state.lock().await.answers.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError> {
        let mut state = self.state.lock().await;
        let taken = state.tests.values().any(|t| {
            !t.deleted && t.course_id == test.course_id && t.title.eq_ignore_ascii_case(&test.title)
        });
        if taken {
            return Err(StoreError::Duplicate(Conflict::DuplicateTitle));
        }

        let row = Test {
            id: TestId(next_id(&mut state.last_test)),
            course_id: test.course_id,
            title: test.title,
            subject: test.subject,
            duration_minutes: test.duration_minutes,
            graduate: test.graduate,
            status: TestStatus::Inactive,
            deleted: false,
            created_at: test.created_at,
        };
        state.tests.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_test(&self, id: TestId) -> Result<Option<Test>, StoreError> {
        Ok(self.state.lock().await.tests.get(&id).cloned())
    }

    async fn list_tests(&self) -> Result<Vec<Test>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tests.values().filter(|t| !t.deleted).cloned().collect())
    }

    async fn set_test_status(
        &self,
        id: TestId,
        status: TestStatus,
    ) -> Result<Option<Test>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.tests.get_mut(&id).filter(|t| !t.deleted).map(|t| {
            t.status = status;
            t.clone()
        }))
    }

    async fn soft_delete_test(&self, id: TestId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.tests.get_mut(&id) {
            Some(t) if !t.deleted => {
                t.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        let mut state = self.state.lock().await;
        if state.attempts.values().any(|a| a.test_id == question.test_id) {
            return Err(StoreError::Duplicate(Conflict::StructureLocked));
        }

        let row = Question {
            id: QuestionId(next_id(&mut state.last_question)),
            test_id: question.test_id,
            name: question.name,
            text: question.text,
            kind: question.kind,
        };
        state.questions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_questions(&self, test: TestId) -> Result<Vec<Question>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .questions
            .values()
            .filter(|q| q.test_id == test)
            .cloned()
            .collect())
    }

    async fn count_attempts(&self, test: TestId) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.attempts.values().filter(|a| a.test_id == test).count() as u64)
    }

    async fn create_attempt(
        &self,
        learner: &Identity,
        test: TestId,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, StoreError> {
        let mut state = self.state.lock().await;
        let busy = state
            .attempts
            .values()
            .any(|a| a.test_id == test && a.learner == *learner && a.is_active());
        if busy {
            return Err(StoreError::Duplicate(Conflict::ActiveAttempt));
        }

        let row = Attempt {
            id: AttemptId(next_id(&mut state.last_attempt)),
            learner: learner.clone(),
            test_id: test,
            state: AttemptState::Active,
            started_at,
            completed_at: None,
        };
        state.attempts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn complete_attempt(
        &self,
        id: AttemptId,
        learner: &Identity,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, StoreError> {
        let mut state = self.state.lock().await;
        let State { tests, attempts, .. } = &mut *state;
        Ok(attempts
            .get_mut(&id)
            .filter(|a| a.learner == *learner && a.is_active())
            .filter(|a| tests.get(&a.test_id).is_some_and(|t| !t.deleted))
            .map(|a| {
                a.state = AttemptState::Completed;
                a.completed_at = Some(completed_at);
                a.clone()
            }))
    }

    async fn list_attempts(&self, test: TestId) -> Result<Vec<Attempt>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.test_id == test)
            .cloned()
            .collect())
    }

    async fn answers_for_attempt(
        &self,
        attempt: AttemptId,
    ) -> Result<Vec<SubmittedAnswer>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MemoryTx {
            state: guard,
            staged: Vec::new(),
        }))
    }
}

/// Submission transaction over a [`MemoryStore`].
pub struct MemoryTx {
    state: OwnedMutexGuard<State>,
    staged: Vec<NewAnswer>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_attempt(&mut self, id: AttemptId) -> Result<Option<Attempt>, StoreError> {
        Ok(self.state.attempts.get(&id).cloned())
    }

    async fn find_question(&mut self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        Ok(self.state.questions.get(&id).cloned())
    }

    async fn find_test(&mut self, id: TestId) -> Result<Option<Test>, StoreError> {
        Ok(self.state.tests.get(&id).cloned())
    }

    async fn stage_answer(&mut self, answer: NewAnswer) -> Result<(), StoreError> {
        self.staged.push(answer);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<Vec<SubmittedAnswer>, StoreError> {
        let MemoryTx { mut state, staged } = *self;
        Ok(staged
            .into_iter()
            .map(|answer| state.upsert_answer(answer))
            .collect())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        tracing::debug!("discarding {} staged answers", self.staged.len());
        Ok(())
    }
}
