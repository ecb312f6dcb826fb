//! Core data model types for examgate.
//!
//! These are the entities the access-control and attempt-lifecycle engine
//! reasons about: principals, courses, tests, questions, attempts and the
//! answers learners submit.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Entity label used in error messages.
            pub const LABEL: &'static str = $label;

            /// Identifiers issued by the store are always positive.
            pub fn is_valid(self) -> bool {
                self.0 > 0
            }

            /// Reject non-positive identifiers as invalid input.
            pub fn validate(self) -> Result<Self, ServiceError> {
                if self.is_valid() {
                    Ok(self)
                } else {
                    Err(ServiceError::InvalidInput(format!(
                        "{} must be a positive integer, got {}",
                        $label, self.0
                    )))
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a course.
    CourseId,
    "course_id"
);
entity_id!(
    /// Identifier of a test.
    TestId,
    "test_id"
);
entity_id!(
    /// Identifier of a question.
    QuestionId,
    "question_id"
);
entity_id!(
    /// Identifier of an attempt.
    AttemptId,
    "attempt_id"
);
entity_id!(
    /// Identifier of a submitted answer row.
    AnswerId,
    "answer_id"
);

/// Opaque, stable caller identity.
///
/// Resolvers may hand out numeric or textual identifiers; the engine only
/// ever compares them for equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A resolved caller: identity plus declared permission grants.
///
/// Built once per request by a `PrincipalResolver` and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identity: Identity,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(identity: impl Into<Identity>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity: identity.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_permission(&self, grant: &str) -> bool {
        self.permissions.contains(grant)
    }
}

/// Whether learners may currently start attempts on a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Inactive,
    Active,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Inactive => write!(f, "inactive"),
            TestStatus::Active => write!(f, "active"),
        }
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inactive" => Ok(TestStatus::Inactive),
            "active" => Ok(TestStatus::Active),
            other => Err(format!("unknown test status: {other}")),
        }
    }
}

/// A test bound to a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub id: TestId,
    pub course_id: CourseId,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Final (graduation) test of the course.
    #[serde(default)]
    pub graduate: bool,
    pub status: TestStatus,
    /// Soft-delete marker. Deleted tests are invisible to every action.
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Test {
    /// Learners may start attempts only on active, non-deleted tests.
    pub fn accepts_attempts(&self) -> bool {
        self.status == TestStatus::Active && !self.deleted
    }
}

/// Payload for `create-test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTest {
    pub course_id: CourseId,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub graduate: bool,
}

impl CreateTest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        self.course_id.validate()?;
        if self.title.trim().is_empty() {
            return Err(ServiceError::InvalidInput("title is required".into()));
        }
        if self.duration_minutes == Some(0) {
            return Err(ServiceError::InvalidInput(
                "duration_minutes must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Record handed to the store when inserting a test.
#[derive(Debug, Clone)]
pub struct NewTest {
    pub course_id: CourseId,
    pub title: String,
    pub subject: Option<String>,
    pub duration_minutes: Option<u32>,
    pub graduate: bool,
    pub created_at: DateTime<Utc>,
}

/// Question type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    #[default]
    Single,
    Multiple,
    Text,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::Single => write!(f, "single"),
            QuestionKind::Multiple => write!(f, "multiple"),
            QuestionKind::Text => write!(f, "text"),
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "single-choice" => Ok(QuestionKind::Single),
            "multiple" | "multiple-choice" => Ok(QuestionKind::Multiple),
            "text" | "free-text" => Ok(QuestionKind::Text),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

/// A question attached to a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub test_id: TestId,
    #[serde(default)]
    pub name: Option<String>,
    pub text: String,
    pub kind: QuestionKind,
}

/// Payload for `add-question`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddQuestion {
    #[serde(default)]
    pub name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub kind: QuestionKind,
}

impl AddQuestion {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.text.trim().is_empty() {
            return Err(ServiceError::InvalidInput("question text is required".into()));
        }
        Ok(())
    }
}

/// Record handed to the store when inserting a question.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub test_id: TestId,
    pub name: Option<String>,
    pub text: String,
    pub kind: QuestionKind,
}

/// Attempt lifecycle state. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptState {
    Active,
    Completed,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Active => write!(f, "active"),
            AttemptState::Completed => write!(f, "completed"),
        }
    }
}

/// One learner's pass through a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub learner: Identity,
    pub test_id: TestId,
    pub state: AttemptState,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn is_active(&self) -> bool {
        self.state == AttemptState::Active
    }
}

/// One item of a `submit-answers` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerInput {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub value: String,
}

/// An answer staged inside a submission transaction.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub learner: Identity,
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub value: String,
    pub batch_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

/// A persisted learner answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub id: AnswerId,
    pub learner: Identity,
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    /// Raw text or the selected-option encoding.
    pub value: String,
    /// Submission this row was written by.
    pub batch_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

/// Result of a successful `submit-answers` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub batch_id: Uuid,
    pub answers: Vec<SubmittedAnswer>,
}
