//! Mock ports for testing.
//!
//! [`MockResolver`] accepts any credential as the caller's identity.
//! [`FlakyStore`] wraps a real store and injects latency or a staging
//! failure so the engine's deadline and rollback paths can be exercised.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use examgate_core::error::{AuthError, StoreError};
use examgate_core::model::{
    Attempt, AttemptId, Identity, NewAnswer, NewQuestion, NewTest, Principal, Question, QuestionId,
    SubmittedAnswer, Test, TestId, TestStatus,
};
use examgate_core::traits::{PrincipalResolver, Store, StoreTx};

/// Resolver that treats the credential itself as the identity.
pub struct MockResolver {
    permissions: Vec<String>,
    offline: bool,
    call_count: AtomicU32,
    last_credential: Mutex<Option<String>>,
}

impl MockResolver {
    /// Every principal carries `permissions`.
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            offline: false,
            call_count: AtomicU32::new(0),
            last_credential: Mutex::new(None),
        }
    }

    /// A resolver whose backend is down.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_credential(&self) -> Option<String> {
        self.last_credential
            .lock()
            .ok()
            .and_then(|last| last.clone())
    }
}

#[async_trait]
impl PrincipalResolver for MockResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_credential.lock() {
            *last = Some(credential.to_string());
        }
        if self.offline {
            return Err(AuthError::Backend("identity provider unreachable".into()));
        }
        Ok(Principal::new(credential, self.permissions.iter().cloned()))
    }
}

/// Store wrapper that injects faults into an inner store.
pub struct FlakyStore {
    inner: Arc<dyn Store>,
    latency: Option<Duration>,
    stage_latency: Option<Duration>,
    insert_latency: Option<Duration>,
    fail_on_stage: Option<u32>,
    call_count: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            latency: None,
            stage_latency: None,
            insert_latency: None,
            fail_on_stage: None,
            call_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Delay every store call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay only `stage_answer` calls.
    pub fn with_stage_latency(mut self, latency: Duration) -> Self {
        self.stage_latency = Some(latency);
        self
    }

    /// Delay `insert_question` before it reaches the inner store.
    pub fn with_insert_latency(mut self, latency: Duration) -> Self {
        self.insert_latency = Some(latency);
        self
    }

    /// Fail the `k`-th (1-based) `stage_answer` of every transaction.
    pub fn with_stage_failure(mut self, k: u32) -> Self {
        self.fail_on_stage = Some(k);
        self
    }

    /// Number of calls made through this wrapper, transactions included.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    async fn enter(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError> {
        self.enter().await;
        self.inner.insert_test(test).await
    }

    async fn find_test(&self, id: TestId) -> Result<Option<Test>, StoreError> {
        self.enter().await;
        self.inner.find_test(id).await
    }

    async fn list_tests(&self) -> Result<Vec<Test>, StoreError> {
        self.enter().await;
        self.inner.list_tests().await
    }

    async fn set_test_status(
        &self,
        id: TestId,
        status: TestStatus,
    ) -> Result<Option<Test>, StoreError> {
        self.enter().await;
        self.inner.set_test_status(id, status).await
    }

    async fn soft_delete_test(&self, id: TestId) -> Result<bool, StoreError> {
        self.enter().await;
        self.inner.soft_delete_test(id).await
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        self.enter().await;
        if let Some(latency) = self.insert_latency {
            tokio::time::sleep(latency).await;
        }
        self.inner.insert_question(question).await
    }

    async fn list_questions(&self, test: TestId) -> Result<Vec<Question>, StoreError> {
        self.enter().await;
        self.inner.list_questions(test).await
    }

    async fn count_attempts(&self, test: TestId) -> Result<u64, StoreError> {
        self.enter().await;
        self.inner.count_attempts(test).await
    }

    async fn create_attempt(
        &self,
        learner: &Identity,
        test: TestId,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, StoreError> {
        self.enter().await;
        self.inner.create_attempt(learner, test, started_at).await
    }

    async fn complete_attempt(
        &self,
        id: AttemptId,
        learner: &Identity,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, StoreError> {
        self.enter().await;
        self.inner.complete_attempt(id, learner, completed_at).await
    }

    async fn list_attempts(&self, test: TestId) -> Result<Vec<Attempt>, StoreError> {
        self.enter().await;
        self.inner.list_attempts(test).await
    }

    async fn answers_for_attempt(
        &self,
        attempt: AttemptId,
    ) -> Result<Vec<SubmittedAnswer>, StoreError> {
        self.enter().await;
        self.inner.answers_for_attempt(attempt).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.enter().await;
        let inner = self.inner.begin().await?;
        Ok(Box::new(FlakyTx {
            inner,
            staged: 0,
            stage_latency: self.stage_latency,
            fail_on_stage: self.fail_on_stage,
            call_count: Arc::clone(&self.call_count),
        }))
    }
}

struct FlakyTx {
    inner: Box<dyn StoreTx>,
    staged: u32,
    stage_latency: Option<Duration>,
    fail_on_stage: Option<u32>,
    call_count: Arc<AtomicU32>,
}

#[async_trait]
impl StoreTx for FlakyTx {
    async fn find_attempt(&mut self, id: AttemptId) -> Result<Option<Attempt>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.inner.find_attempt(id).await
    }

    async fn find_question(&mut self, id: QuestionId) -> Result<Option<Question>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.inner.find_question(id).await
    }

    async fn find_test(&mut self, id: TestId) -> Result<Option<Test>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.inner.find_test(id).await
    }

    async fn stage_answer(&mut self, answer: NewAnswer) -> Result<(), StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.staged += 1;
        if let Some(latency) = self.stage_latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_on_stage == Some(self.staged) {
            return Err(StoreError::Backend(format!(
                "injected failure on answer {}",
                self.staged
            )));
        }
        self.inner.stage_answer(answer).await
    }

    async fn commit(self: Box<Self>) -> Result<Vec<SubmittedAnswer>, StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.inner.rollback().await
    }
}
