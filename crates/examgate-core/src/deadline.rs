//! Bounded store access.
//!
//! Wraps the storage ports so that every call carries a deadline. An expired
//! call surfaces as [`StoreError::Timeout`], which the service reports as a
//! retryable `Unavailable` failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{
    Attempt, AttemptId, CourseId, Identity, NewAnswer, NewQuestion, NewTest, Question, QuestionId,
    SubmittedAnswer, Test, TestId, TestStatus,
};
use crate::traits::{RelationshipStore, Store, StoreTx};

async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            let ms = limit.as_millis() as u64;
            tracing::warn!("store call '{op}' exceeded {ms}ms deadline");
            Err(StoreError::Timeout(ms))
        }
    }
}

/// [`Store`] adapter applying a per-call deadline.
pub struct BoundedStore {
    inner: Arc<dyn Store>,
    limit: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn Store>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Store for BoundedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError> {
        bounded(self.limit, "insert_test", self.inner.insert_test(test)).await
    }

    async fn find_test(&self, id: TestId) -> Result<Option<Test>, StoreError> {
        bounded(self.limit, "find_test", self.inner.find_test(id)).await
    }

    async fn list_tests(&self) -> Result<Vec<Test>, StoreError> {
        bounded(self.limit, "list_tests", self.inner.list_tests()).await
    }

    async fn set_test_status(
        &self,
        id: TestId,
        status: TestStatus,
    ) -> Result<Option<Test>, StoreError> {
        bounded(
            self.limit,
            "set_test_status",
            self.inner.set_test_status(id, status),
        )
        .await
    }

    async fn soft_delete_test(&self, id: TestId) -> Result<bool, StoreError> {
        bounded(self.limit, "soft_delete_test", self.inner.soft_delete_test(id)).await
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        bounded(
            self.limit,
            "insert_question",
            self.inner.insert_question(question),
        )
        .await
    }

    async fn list_questions(&self, test: TestId) -> Result<Vec<Question>, StoreError> {
        bounded(self.limit, "list_questions", self.inner.list_questions(test)).await
    }

    async fn count_attempts(&self, test: TestId) -> Result<u64, StoreError> {
        bounded(self.limit, "count_attempts", self.inner.count_attempts(test)).await
    }

    async fn create_attempt(
        &self,
        learner: &Identity,
        test: TestId,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, StoreError> {
        bounded(
            self.limit,
            "create_attempt",
            self.inner.create_attempt(learner, test, started_at),
        )
        .await
    }

    async fn complete_attempt(
        &self,
        id: AttemptId,
        learner: &Identity,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, StoreError> {
        bounded(
            self.limit,
            "complete_attempt",
            self.inner.complete_attempt(id, learner, completed_at),
        )
        .await
    }

    async fn list_attempts(&self, test: TestId) -> Result<Vec<Attempt>, StoreError> {
        bounded(self.limit, "list_attempts", self.inner.list_attempts(test)).await
    }

    async fn answers_for_attempt(
        &self,
        attempt: AttemptId,
    ) -> Result<Vec<SubmittedAnswer>, StoreError> {
        bounded(
            self.limit,
            "answers_for_attempt",
            self.inner.answers_for_attempt(attempt),
        )
        .await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let inner = bounded(self.limit, "begin", self.inner.begin()).await?;
        Ok(Box::new(BoundedTx {
            inner,
            limit: self.limit,
        }))
    }
}

struct BoundedTx {
    inner: Box<dyn StoreTx>,
    limit: Duration,
}

#[async_trait]
impl StoreTx for BoundedTx {
    async fn find_attempt(&mut self, id: AttemptId) -> Result<Option<Attempt>, StoreError> {
        bounded(self.limit, "tx.find_attempt", self.inner.find_attempt(id)).await
    }

    async fn find_question(&mut self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        bounded(self.limit, "tx.find_question", self.inner.find_question(id)).await
    }

    async fn find_test(&mut self, id: TestId) -> Result<Option<Test>, StoreError> {
        bounded(self.limit, "tx.find_test", self.inner.find_test(id)).await
    }

    async fn stage_answer(&mut self, answer: NewAnswer) -> Result<(), StoreError> {
        bounded(self.limit, "tx.stage_answer", self.inner.stage_answer(answer)).await
    }

    async fn commit(self: Box<Self>) -> Result<Vec<SubmittedAnswer>, StoreError> {
        let BoundedTx { inner, limit } = *self;
        bounded(limit, "tx.commit", inner.commit()).await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let BoundedTx { inner, limit } = *self;
        bounded(limit, "tx.rollback", inner.rollback()).await
    }
}

/// [`RelationshipStore`] adapter applying a per-call deadline.
pub struct BoundedRelationships {
    inner: Arc<dyn RelationshipStore>,
    limit: Duration,
}

impl BoundedRelationships {
    pub fn new(inner: Arc<dyn RelationshipStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl RelationshipStore for BoundedRelationships {
    async fn is_teacher_of(
        &self,
        identity: &Identity,
        course: CourseId,
    ) -> Result<bool, StoreError> {
        bounded(
            self.limit,
            "is_teacher_of",
            self.inner.is_teacher_of(identity, course),
        )
        .await
    }

    async fn is_enrolled_in(
        &self,
        identity: &Identity,
        course: CourseId,
    ) -> Result<bool, StoreError> {
        bounded(
            self.limit,
            "is_enrolled_in",
            self.inner.is_enrolled_in(identity, course),
        )
        .await
    }
}
