//! Action handlers.
//!
//! [`AssessmentService`] is the surface a transport routes to. Each handler
//! validates its payload, asks the [`DecisionEngine`], consults the
//! [`MutabilityGuard`] for structural edits, then applies the change through
//! the attempt machine, the results aggregator or the store directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::attempt::AttemptMachine;
use crate::deadline::{BoundedRelationships, BoundedStore};
use crate::error::ServiceError;
use crate::guard::MutabilityGuard;
use crate::model::{
    AddQuestion, AnswerInput, Attempt, AttemptId, CourseId, CreateTest, NewQuestion, NewTest,
    Principal, Question, Submission, Test, TestId, TestStatus,
};
use crate::policy::{Action, Decision, DecisionEngine, PolicyConfig, Resource, Standing};
use crate::results::{LearnerResult, ResultsAggregator, Visibility};
use crate::traits::{PrincipalResolver, RelationshipStore, Store};

/// Configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deadline applied to every store and relationship call.
    pub store_timeout: Duration,
    pub policy: PolicyConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            policy: PolicyConfig::default(),
        }
    }
}

pub struct AssessmentService {
    resolver: Arc<dyn PrincipalResolver>,
    store: Arc<dyn Store>,
    engine: DecisionEngine,
    guard: MutabilityGuard,
    attempts: AttemptMachine,
    results: ResultsAggregator,
}

impl AssessmentService {
    pub fn new(
        resolver: Arc<dyn PrincipalResolver>,
        relationships: Arc<dyn RelationshipStore>,
        store: Arc<dyn Store>,
        config: ServiceConfig,
    ) -> Self {
        let store: Arc<dyn Store> = Arc::new(BoundedStore::new(store, config.store_timeout));
        let relationships: Arc<dyn RelationshipStore> = Arc::new(BoundedRelationships::new(
            relationships,
            config.store_timeout,
        ));
        tracing::debug!(
            backend = store.name(),
            timeout_ms = config.store_timeout.as_millis() as u64,
            "assessment service ready"
        );

        Self {
            resolver,
            engine: DecisionEngine::new(relationships, config.policy),
            guard: MutabilityGuard::new(Arc::clone(&store)),
            attempts: AttemptMachine::new(Arc::clone(&store)),
            results: ResultsAggregator::new(Arc::clone(&store)),
            store,
        }
    }

    /// Resolve a credential into a principal.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Principal, ServiceError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::Unauthenticated("credential required".into()))?;
        Ok(self.resolver.resolve(credential).await?)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    pub async fn create_test(
        &self,
        principal: &Principal,
        request: CreateTest,
    ) -> Result<Test, ServiceError> {
        request.validate()?;
        self.require(
            principal,
            Action::CreateTest,
            &Resource::Course(request.course_id),
        )
        .await?;

        let test = self
            .store
            .insert_test(NewTest {
                course_id: request.course_id,
                title: request.title.trim().to_string(),
                subject: request.subject,
                duration_minutes: request.duration_minutes,
                graduate: request.graduate,
                created_at: Utc::now(),
            })
            .await?;
        tracing::info!(
            teacher = %principal.identity,
            "created test {} in course {}",
            test.id,
            test.course_id
        );
        Ok(test)
    }

    /// Tests visible to the principal.
    ///
    /// Teachers see every test in courses they own; enrolled learners see the
    /// active tests of their courses.
    pub async fn list_tests(&self, principal: &Principal) -> Result<Vec<Test>, ServiceError> {
        let tests = self.store.list_tests().await?;
        let mut standing: HashMap<CourseId, Option<Standing>> = HashMap::new();
        let mut visible = Vec::new();

        for test in tests {
            let course_standing = match standing.get(&test.course_id) {
                Some(s) => *s,
                None => {
                    let resource = Resource::Course(test.course_id);
                    let s = match self
                        .engine
                        .authorize(principal, Action::ListTests, &resource)
                        .await
                    {
                        Decision::Allow(s) => Some(s),
                        Decision::Deny(_) => None,
                    };
                    standing.insert(test.course_id, s);
                    s
                }
            };
            match course_standing {
                Some(Standing::Teacher) => visible.push(test),
                Some(_) if test.accepts_attempts() => visible.push(test),
                _ => {}
            }
        }
        Ok(visible)
    }

    pub async fn activate_test(
        &self,
        principal: &Principal,
        test_id: TestId,
    ) -> Result<Test, ServiceError> {
        self.set_status(principal, test_id, TestStatus::Active).await
    }

    pub async fn deactivate_test(
        &self,
        principal: &Principal,
        test_id: TestId,
    ) -> Result<Test, ServiceError> {
        self.set_status(principal, test_id, TestStatus::Inactive)
            .await
    }

    /// Soft-delete a test. It disappears from every subsequent action.
    pub async fn delete_test(
        &self,
        principal: &Principal,
        test_id: TestId,
    ) -> Result<(), ServiceError> {
        let test = self.live_test(test_id).await?;
        self.require(principal, Action::ManageTest, &test_resource(&test))
            .await?;
        if !self.store.soft_delete_test(test.id).await? {
            return Err(ServiceError::not_found(TestId::LABEL, test.id));
        }
        tracing::info!(teacher = %principal.identity, "deleted test {}", test.id);
        Ok(())
    }

    async fn set_status(
        &self,
        principal: &Principal,
        test_id: TestId,
        status: TestStatus,
    ) -> Result<Test, ServiceError> {
        let test = self.live_test(test_id).await?;
        self.require(principal, Action::ManageTest, &test_resource(&test))
            .await?;
        let updated = self
            .store
            .set_test_status(test.id, status)
            .await?
            .ok_or_else(|| ServiceError::not_found(TestId::LABEL, test.id))?;
        tracing::info!(
            teacher = %principal.identity,
            "test {} is now {}",
            updated.id,
            updated.status
        );
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Questions
    // -----------------------------------------------------------------------

    pub async fn add_question(
        &self,
        principal: &Principal,
        test_id: TestId,
        request: AddQuestion,
    ) -> Result<Question, ServiceError> {
        request.validate()?;
        let test = self.live_test(test_id).await?;
        self.require(principal, Action::AddQuestion, &test_resource(&test))
            .await?;
        // Early rejection only; the insert re-checks under the store's guard.
        self.guard.ensure_unlocked(test.id).await?;

        let question = self
            .store
            .insert_question(NewQuestion {
                test_id: test.id,
                name: request.name,
                text: request.text.trim().to_string(),
                kind: request.kind,
            })
            .await?;
        tracing::info!("added question {} to test {}", question.id, test.id);
        Ok(question)
    }

    pub async fn list_questions(
        &self,
        principal: &Principal,
        test_id: TestId,
    ) -> Result<Vec<Question>, ServiceError> {
        let test = self.live_test(test_id).await?;
        self.require(principal, Action::ListQuestions, &test_resource(&test))
            .await?;
        Ok(self.store.list_questions(test.id).await?)
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    pub async fn start_attempt(
        &self,
        principal: &Principal,
        test_id: TestId,
    ) -> Result<Attempt, ServiceError> {
        test_id.validate()?;
        self.require(
            principal,
            Action::StartAttempt,
            &Resource::Attempt {
                learner: principal.identity.clone(),
            },
        )
        .await?;

        let test = self
            .store
            .find_test(test_id)
            .await?
            .filter(|t| !t.deleted)
            .ok_or_else(|| ServiceError::not_found(TestId::LABEL, test_id))?;
        self.attempts.start(principal, &test).await
    }

    /// Complete an attempt. Ownership is part of the store predicate, so a
    /// foreign attempt reads as `NotFound`.
    pub async fn complete_attempt(
        &self,
        principal: &Principal,
        attempt_id: AttemptId,
    ) -> Result<Attempt, ServiceError> {
        self.attempts.complete(principal, attempt_id).await
    }

    /// Submit a batch of answers. Each item's attempt is checked against the
    /// principal inside the submission transaction.
    pub async fn submit_answers(
        &self,
        principal: &Principal,
        items: &[AnswerInput],
    ) -> Result<Submission, ServiceError> {
        self.attempts.submit(principal, items).await
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    pub async fn view_results(
        &self,
        principal: &Principal,
        test_id: TestId,
    ) -> Result<Vec<LearnerResult>, ServiceError> {
        let test = self.live_test(test_id).await?;
        let visibility = match self
            .require(principal, Action::ViewResults, &test_resource(&test))
            .await?
        {
            Standing::Teacher => Visibility::AllLearners,
            _ => Visibility::Learner(principal.identity.clone()),
        };
        self.results.collect(test.id, &visibility).await
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn require(
        &self,
        principal: &Principal,
        action: Action,
        resource: &Resource,
    ) -> Result<Standing, ServiceError> {
        match self.engine.authorize(principal, action, resource).await {
            Decision::Allow(standing) => Ok(standing),
            Decision::Deny(reason) => Err(ServiceError::Forbidden(reason)),
        }
    }

    /// Fetch a non-deleted test or fail with `NotFound`.
    async fn live_test(&self, test_id: TestId) -> Result<Test, ServiceError> {
        test_id.validate()?;
        self.store
            .find_test(test_id)
            .await?
            .filter(|t| !t.deleted)
            .ok_or_else(|| ServiceError::not_found(TestId::LABEL, test_id))
    }
}

fn test_resource(test: &Test) -> Resource {
    Resource::Test {
        test: test.id,
        course: test.course_id,
    }
}
