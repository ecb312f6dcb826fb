//! Port traits the engine depends on.
//!
//! Credential resolution, course relationships and entity storage are
//! external collaborators. The engine only sees these async traits; the
//! `examgate-store` crate provides in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AuthError, StoreError};
use crate::model::{
    Attempt, AttemptId, CourseId, Identity, NewAnswer, NewQuestion, NewTest, Principal, Question,
    QuestionId, SubmittedAnswer, Test, TestId, TestStatus,
};

// ---------------------------------------------------------------------------
// Principal resolution
// ---------------------------------------------------------------------------

/// Turns an opaque credential into a [`Principal`].
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError>;
}

// ---------------------------------------------------------------------------
// Relationship store
// ---------------------------------------------------------------------------

/// Read-only course relationships.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Is `identity` the teacher who owns `course`?
    async fn is_teacher_of(&self, identity: &Identity, course: CourseId)
        -> Result<bool, StoreError>;

    /// Is `identity` enrolled in `course`?
    async fn is_enrolled_in(
        &self,
        identity: &Identity,
        course: CourseId,
    ) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Entity store
// ---------------------------------------------------------------------------

/// Storage port for tests, questions, attempts and answers.
///
/// Implementations must be safe to share across concurrent tasks. Three
/// operations carry atomicity requirements: [`Store::create_attempt`] and
/// [`Store::insert_question`] are check-and-create, and answer submission
/// goes through [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Human-readable backend name (e.g. "memory").
    fn name(&self) -> &str;

    /// Insert a test. Fails with `Duplicate(DuplicateTitle)` if the course
    /// already has a non-deleted test with the same title.
    async fn insert_test(&self, test: NewTest) -> Result<Test, StoreError>;

    /// Look up a test, including soft-deleted ones.
    async fn find_test(&self, id: TestId) -> Result<Option<Test>, StoreError>;

    /// All non-deleted tests, ordered by id.
    async fn list_tests(&self) -> Result<Vec<Test>, StoreError>;

    /// Set the status of a non-deleted test. `None` if there is no such test.
    async fn set_test_status(
        &self,
        id: TestId,
        status: TestStatus,
    ) -> Result<Option<Test>, StoreError>;

    /// Soft-delete a test. Returns `false` if it was absent or already deleted.
    async fn soft_delete_test(&self, id: TestId) -> Result<bool, StoreError>;

    /// Insert a question. Fails with `Duplicate(StructureLocked)` if any
    /// attempt references the test; the check and the insert are atomic.
    async fn insert_question(&self, question: NewQuestion) -> Result<Question, StoreError>;

    /// Questions attached to a test, in creation order.
    async fn list_questions(&self, test: TestId) -> Result<Vec<Question>, StoreError>;

    /// Number of attempts ever created for a test, in any state.
    async fn count_attempts(&self, test: TestId) -> Result<u64, StoreError>;

    /// Atomically create an active attempt unless `learner` already has one
    /// for `test`, in which case fail with `Duplicate(ActiveAttempt)`.
    async fn create_attempt(
        &self,
        learner: &Identity,
        test: TestId,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, StoreError>;

    /// Complete the attempt matching `id`, `learner` and state `active`
    /// whose test is not soft-deleted. Returns `None` when no row matches.
    async fn complete_attempt(
        &self,
        id: AttemptId,
        learner: &Identity,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, StoreError>;

    /// Attempts on a test, ordered by id.
    async fn list_attempts(&self, test: TestId) -> Result<Vec<Attempt>, StoreError>;

    /// Answers recorded under an attempt.
    async fn answers_for_attempt(
        &self,
        attempt: AttemptId,
    ) -> Result<Vec<SubmittedAnswer>, StoreError>;

    /// Open a transaction for answer submission.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// Transaction used by answer submission.
///
/// Reads observe committed state; staged answers become visible only on
/// [`StoreTx::commit`]. Dropping a transaction without committing discards
/// everything staged in it.
#[async_trait]
pub trait StoreTx: Send {
    async fn find_attempt(&mut self, id: AttemptId) -> Result<Option<Attempt>, StoreError>;

    async fn find_question(&mut self, id: QuestionId) -> Result<Option<Question>, StoreError>;

    /// Look up a test, including soft-deleted ones.
    async fn find_test(&mut self, id: TestId) -> Result<Option<Test>, StoreError>;

    /// Stage an answer. On commit it replaces any stored answer for the
    /// same (attempt, question) pair.
    async fn stage_answer(&mut self, answer: NewAnswer) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<Vec<SubmittedAnswer>, StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
