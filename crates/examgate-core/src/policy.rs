//! Access-control decision engine.
//!
//! Maps (principal, action, resource) to [`Decision::Allow`] or
//! [`Decision::Deny`]. Ownership and enrollment come from the
//! [`RelationshipStore`]; declared permission grants come from the
//! [`Principal`]. Relationship lookups that fail or cannot be answered deny.
//!
//! | Action | Who is allowed |
//! |--------|----------------|
//! | create-test, add-question, manage-test | teacher of the course (+ grant if enforced) |
//! | list-tests, list-questions | teacher or enrolled learner |
//! | start-attempt, submit-answers, complete-attempt | the attempt's own learner |
//! | view-results | teacher (all learners), or self with `read_own_results` grant |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{CourseId, Identity, Principal, TestId};
use crate::traits::RelationshipStore;

/// The closed set of actions the engine decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateTest,
    ListTests,
    AddQuestion,
    ListQuestions,
    StartAttempt,
    CompleteAttempt,
    ViewResults,
    SubmitAnswers,
    /// Activate, deactivate or soft-delete a test.
    ManageTest,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::CreateTest => "create-test",
            Action::ListTests => "list-tests",
            Action::AddQuestion => "add-question",
            Action::ListQuestions => "list-questions",
            Action::StartAttempt => "start-attempt",
            Action::CompleteAttempt => "complete-attempt",
            Action::ViewResults => "view-results",
            Action::SubmitAnswers => "submit-answers",
            Action::ManageTest => "manage-test",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an action targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Course(CourseId),
    Test { test: TestId, course: CourseId },
    /// An attempt, identified for authorization purposes by its learner.
    Attempt { learner: Identity },
}

impl Resource {
    fn course(&self) -> Option<CourseId> {
        match self {
            Resource::Course(course) | Resource::Test { course, .. } => Some(*course),
            Resource::Attempt { .. } => None,
        }
    }
}

/// The relationship under which an action was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// Teacher of the course that owns the resource.
    Teacher,
    /// Learner enrolled in the course.
    Enrolled,
    /// Acting on their own attempt or their own results.
    SelfOnly,
}

/// Why an action was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    NotTeacher,
    NotEnrolled,
    NotAttemptOwner,
    MissingPermission(String),
    RelationshipUnavailable,
    /// The action does not apply to this kind of resource.
    WrongResource,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::NotTeacher => "not_course_teacher",
            DenyReason::NotEnrolled => "not_enrolled",
            DenyReason::NotAttemptOwner => "not_attempt_owner",
            DenyReason::MissingPermission(_) => "missing_permission",
            DenyReason::RelationshipUnavailable => "relationship_unavailable",
            DenyReason::WrongResource => "wrong_resource",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotTeacher => write!(f, "not the teacher of this course"),
            DenyReason::NotEnrolled => write!(f, "not enrolled in this course"),
            DenyReason::NotAttemptOwner => write!(f, "attempt belongs to another learner"),
            DenyReason::MissingPermission(grant) => write!(f, "missing permission '{grant}'"),
            DenyReason::RelationshipUnavailable => write!(f, "course relationship unavailable"),
            DenyReason::WrongResource => write!(f, "action does not apply to this resource"),
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Standing),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Names of the declared permission grants the engine checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionNames {
    pub create_test: String,
    pub add_question: String,
    pub manage_test: String,
    pub read_own_results: String,
}

impl Default for PermissionNames {
    fn default() -> Self {
        Self {
            create_test: "course:test:add".into(),
            add_question: "test:quest:add".into(),
            manage_test: "course:test:write".into(),
            read_own_results: "test:answer:read".into(),
        }
    }
}

/// Policy switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Require declared grants on top of course ownership for teacher writes.
    pub enforce_permission_strings: bool,
    /// Require `read_own_results` for a learner to view their own results.
    pub self_results_requires_permission: bool,
    pub grants: PermissionNames,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforce_permission_strings: false,
            self_results_requires_permission: true,
            grants: PermissionNames::default(),
        }
    }
}

/// Identity-equality check shared by every attempt-scoped action.
pub fn owns_attempt(principal: &Principal, learner: &Identity) -> Decision {
    if principal.identity == *learner {
        Decision::Allow(Standing::SelfOnly)
    } else {
        Decision::Deny(DenyReason::NotAttemptOwner)
    }
}

/// The decision engine.
pub struct DecisionEngine {
    relationships: Arc<dyn RelationshipStore>,
    config: PolicyConfig,
}

impl DecisionEngine {
    pub fn new(relationships: Arc<dyn RelationshipStore>, config: PolicyConfig) -> Self {
        Self {
            relationships,
            config,
        }
    }

    /// Decide whether `principal` may perform `action` on `resource`.
    pub async fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: &Resource,
    ) -> Decision {
        let decision = self.decide(principal, action, resource).await;
        match &decision {
            Decision::Allow(standing) => tracing::debug!(
                identity = %principal.identity,
                %action,
                ?standing,
                "allowed"
            ),
            Decision::Deny(reason) => tracing::warn!(
                identity = %principal.identity,
                %action,
                reason = reason.code(),
                "denied"
            ),
        }
        decision
    }

    async fn decide(&self, principal: &Principal, action: Action, resource: &Resource) -> Decision {
        match action {
            Action::StartAttempt | Action::SubmitAnswers | Action::CompleteAttempt => {
                match resource {
                    Resource::Attempt { learner } => owns_attempt(principal, learner),
                    _ => Decision::Deny(DenyReason::WrongResource),
                }
            }
            Action::CreateTest => {
                let Resource::Course(course) = resource else {
                    return Decision::Deny(DenyReason::WrongResource);
                };
                self.teacher_write(principal, *course, &self.config.grants.create_test)
                    .await
            }
            Action::AddQuestion | Action::ManageTest => {
                let Resource::Test { course, .. } = resource else {
                    return Decision::Deny(DenyReason::WrongResource);
                };
                let grant = if action == Action::AddQuestion {
                    &self.config.grants.add_question
                } else {
                    &self.config.grants.manage_test
                };
                self.teacher_write(principal, *course, grant).await
            }
            Action::ListTests | Action::ListQuestions => {
                let Some(course) = resource.course() else {
                    return Decision::Deny(DenyReason::WrongResource);
                };
                match self.teacher_of(principal, course).await {
                    Ok(true) => Decision::Allow(Standing::Teacher),
                    Ok(false) => match self.enrolled_in(principal, course).await {
                        Ok(true) => Decision::Allow(Standing::Enrolled),
                        Ok(false) => Decision::Deny(DenyReason::NotEnrolled),
                        Err(deny) => deny,
                    },
                    Err(deny) => deny,
                }
            }
            Action::ViewResults => {
                let Resource::Test { course, .. } = resource else {
                    return Decision::Deny(DenyReason::WrongResource);
                };
                match self.teacher_of(principal, *course).await {
                    Ok(true) => Decision::Allow(Standing::Teacher),
                    Ok(false) => {
                        let grant = &self.config.grants.read_own_results;
                        if !self.config.self_results_requires_permission
                            || principal.has_permission(grant)
                        {
                            Decision::Allow(Standing::SelfOnly)
                        } else {
                            Decision::Deny(DenyReason::MissingPermission(grant.clone()))
                        }
                    }
                    Err(deny) => deny,
                }
            }
        }
    }

    async fn teacher_write(
        &self,
        principal: &Principal,
        course: CourseId,
        grant: &str,
    ) -> Decision {
        match self.teacher_of(principal, course).await {
            Ok(true) => {
                if self.config.enforce_permission_strings && !principal.has_permission(grant) {
                    Decision::Deny(DenyReason::MissingPermission(grant.to_string()))
                } else {
                    Decision::Allow(Standing::Teacher)
                }
            }
            Ok(false) => Decision::Deny(DenyReason::NotTeacher),
            Err(deny) => deny,
        }
    }

    async fn teacher_of(&self, principal: &Principal, course: CourseId) -> Result<bool, Decision> {
        self.relationships
            .is_teacher_of(&principal.identity, course)
            .await
            .map_err(|e| {
                tracing::warn!("teacher lookup for course {course} failed, denying: {e}");
                Decision::Deny(DenyReason::RelationshipUnavailable)
            })
    }

    async fn enrolled_in(&self, principal: &Principal, course: CourseId) -> Result<bool, Decision> {
        self.relationships
            .is_enrolled_in(&principal.identity, course)
            .await
            .map_err(|e| {
                tracing::warn!("enrollment lookup for course {course} failed, denying: {e}");
                Decision::Deny(DenyReason::RelationshipUnavailable)
            })
    }
}
