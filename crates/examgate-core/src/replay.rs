//! Scenario replay.
//!
//! Plays each step of a [`Scenario`] against an [`AssessmentService`] in
//! order, binding saved labels to the ids of created entities, and records
//! whether the outcome matched the step's expectation.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, ServiceError};
use crate::model::{AddQuestion, AnswerInput, AttemptId, CreateTest, QuestionId, TestId};
use crate::scenario::{Expectation, Ref, Scenario, Step, StepAction};
use crate::service::AssessmentService;

/// What a step actually produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Actual {
    Ok {
        summary: String,
        /// Entry count for list, results and submit steps.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        len: Option<usize>,
    },
    Failed {
        kind: ErrorKind,
        reason: String,
        message: String,
    },
}

impl Actual {
    fn from_error(err: &ServiceError) -> Self {
        Actual::Failed {
            kind: err.kind(),
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Actual::Ok { .. } => "ok".to_string(),
            Actual::Failed { kind, reason, .. } if kind.as_str() == reason => kind.to_string(),
            Actual::Failed { kind, reason, .. } => format!("{kind} ({reason})"),
        }
    }
}

/// Outcome of one replayed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// 1-based step number.
    pub step: usize,
    pub actor: String,
    pub action: &'static str,
    pub expected: Expectation,
    pub actual: Actual,
    pub passed: bool,
    /// Why a passing status still failed, e.g. an entry count mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Result of replaying a whole scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scenario_id: String,
    pub scenario_name: String,
    pub steps: Vec<StepOutcome>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|s| s.passed).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.passed)
    }

    pub fn all_passed(&self) -> bool {
        self.steps.iter().all(|s| s.passed)
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Replay every step of `scenario` against `service`.
pub async fn replay(service: &AssessmentService, scenario: &Scenario) -> ScenarioReport {
    let start = Instant::now();
    let mut labels: HashMap<String, i64> = HashMap::new();
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (i, step) in scenario.steps.iter().enumerate() {
        let (actual, created) = match play(service, step, &labels).await {
            Ok(done) => (
                Actual::Ok {
                    summary: done.summary,
                    len: done.len,
                },
                done.created,
            ),
            Err(e) => (Actual::from_error(&e), None),
        };

        if let (Some(label), Some(id)) = (&step.save, created) {
            labels.insert(label.clone(), id);
        }

        let (passed, note) = judge(step, &actual);
        let outcome = StepOutcome {
            step: i + 1,
            actor: step.credential.clone().unwrap_or_else(|| "-".into()),
            action: step.action.name(),
            expected: step.expect,
            actual,
            passed,
            note,
        };
        if outcome.passed {
            tracing::debug!(
                "step {} {} -> {}",
                outcome.step,
                outcome.action,
                outcome.actual.label()
            );
        } else {
            tracing::warn!(
                "step {} {}: expected {}, got {}",
                outcome.step,
                outcome.action,
                outcome.expected,
                outcome.actual.label()
            );
        }
        steps.push(outcome);
    }

    ScenarioReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        scenario_id: scenario.id.clone(),
        scenario_name: scenario.name.clone(),
        steps,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn judge(step: &Step, actual: &Actual) -> (bool, Option<String>) {
    match (step.expect, actual) {
        (Expectation::Ok, Actual::Ok { len, .. }) => match (step.expect_len, len) {
            (Some(want), Some(got)) if want != *got => {
                (false, Some(format!("expected {want} entries, got {got}")))
            }
            (Some(_), None) => (false, Some("step produced no entries to count".into())),
            _ => (true, None),
        },
        (Expectation::Fail(want), Actual::Failed { kind, .. }) => (want == *kind, None),
        _ => (false, None),
    }
}

struct Done {
    summary: String,
    len: Option<usize>,
    created: Option<i64>,
}

impl Done {
    fn summary(summary: String) -> Self {
        Self {
            summary,
            len: None,
            created: None,
        }
    }

    fn counted(summary: String, len: usize) -> Self {
        Self {
            summary,
            len: Some(len),
            created: None,
        }
    }

    fn created(summary: String, id: i64) -> Self {
        Self {
            summary,
            len: None,
            created: Some(id),
        }
    }
}

fn resolve(labels: &HashMap<String, i64>, r: &Ref) -> Result<i64, ServiceError> {
    match r {
        Ref::Id(id) => Ok(*id),
        Ref::Label(label) => labels
            .get(label)
            .copied()
            .ok_or_else(|| ServiceError::InvalidInput(format!("label '{label}' is not bound"))),
    }
}

async fn play(
    service: &AssessmentService,
    step: &Step,
    labels: &HashMap<String, i64>,
) -> Result<Done, ServiceError> {
    let principal = service.authenticate(step.credential.as_deref()).await?;
    let test = |r: &Ref| resolve(labels, r).map(TestId);

    let done = match &step.action {
        StepAction::CreateTest {
            course,
            title,
            subject,
            duration_minutes,
            graduate,
        } => {
            let created = service
                .create_test(
                    &principal,
                    CreateTest {
                        course_id: *course,
                        title: title.clone(),
                        subject: subject.clone(),
                        duration_minutes: *duration_minutes,
                        graduate: *graduate,
                    },
                )
                .await?;
            Done::created(format!("test {}", created.id), created.id.0)
        }
        StepAction::ListTests => {
            let tests = service.list_tests(&principal).await?;
            Done::counted(format!("{} tests", tests.len()), tests.len())
        }
        StepAction::ActivateTest { test: r } => {
            let t = service.activate_test(&principal, test(r)?).await?;
            Done::summary(format!("test {} {}", t.id, t.status))
        }
        StepAction::DeactivateTest { test: r } => {
            let t = service.deactivate_test(&principal, test(r)?).await?;
            Done::summary(format!("test {} {}", t.id, t.status))
        }
        StepAction::DeleteTest { test: r } => {
            let id = test(r)?;
            service.delete_test(&principal, id).await?;
            Done::summary(format!("test {id} deleted"))
        }
        StepAction::AddQuestion {
            test: r,
            name,
            text,
            kind,
        } => {
            let q = service
                .add_question(
                    &principal,
                    test(r)?,
                    AddQuestion {
                        name: name.clone(),
                        text: text.clone(),
                        kind: *kind,
                    },
                )
                .await?;
            Done::created(format!("question {}", q.id), q.id.0)
        }
        StepAction::ListQuestions { test: r } => {
            let questions = service.list_questions(&principal, test(r)?).await?;
            Done::counted(format!("{} questions", questions.len()), questions.len())
        }
        StepAction::StartAttempt { test: r } => {
            let attempt = service.start_attempt(&principal, test(r)?).await?;
            Done::created(format!("attempt {}", attempt.id), attempt.id.0)
        }
        StepAction::CompleteAttempt { attempt } => {
            let id = AttemptId(resolve(labels, attempt)?);
            let done = service.complete_attempt(&principal, id).await?;
            Done::summary(format!("attempt {} {}", done.id, done.state))
        }
        StepAction::SubmitAnswers { answers } => {
            let items = answers
                .iter()
                .map(|a| {
                    Ok(AnswerInput {
                        attempt_id: AttemptId(resolve(labels, &a.attempt)?),
                        question_id: QuestionId(resolve(labels, &a.question)?),
                        value: a.value.clone(),
                    })
                })
                .collect::<Result<Vec<_>, ServiceError>>()?;
            let submission = service.submit_answers(&principal, &items).await?;
            Done::counted(
                format!("batch {}", submission.batch_id),
                submission.answers.len(),
            )
        }
        StepAction::ViewResults { test: r } => {
            let results = service.view_results(&principal, test(r)?).await?;
            Done::counted(format!("{} learners", results.len()), results.len())
        }
    };

    Ok(done)
}
