//! TOML scenario parser.
//!
//! A scenario seeds courses, enrollments and credentials, then lists the
//! actions to play against the engine together with the outcome each one is
//! expected to produce.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ErrorKind;
use crate::model::{CourseId, Identity, QuestionKind};

/// A parsed scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    pub courses: Vec<CourseFixture>,
    pub principals: Vec<PrincipalFixture>,
    pub steps: Vec<Step>,
}

/// A course with its teacher and enrolled learners.
#[derive(Debug, Clone)]
pub struct CourseFixture {
    pub id: CourseId,
    pub teacher: Identity,
    pub enrolled: Vec<Identity>,
}

/// A credential and the principal it resolves to.
#[derive(Debug, Clone)]
pub struct PrincipalFixture {
    pub token: String,
    pub identity: Identity,
    pub permissions: Vec<String>,
}

/// Reference to an entity: a literal id, or a label bound by an earlier
/// step's `save`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Ref {
    Id(i64),
    Label(String),
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Id(id) => write!(f, "{id}"),
            Ref::Label(label) => write!(f, "{label}"),
        }
    }
}

/// One answer inside a `submit-answers` step.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRef {
    pub attempt: Ref,
    pub question: Ref,
    pub value: String,
}

/// The action a step performs.
#[derive(Debug, Clone)]
pub enum StepAction {
    CreateTest {
        course: CourseId,
        title: String,
        subject: Option<String>,
        duration_minutes: Option<u32>,
        graduate: bool,
    },
    ListTests,
    ActivateTest {
        test: Ref,
    },
    DeactivateTest {
        test: Ref,
    },
    DeleteTest {
        test: Ref,
    },
    AddQuestion {
        test: Ref,
        name: Option<String>,
        text: String,
        kind: QuestionKind,
    },
    ListQuestions {
        test: Ref,
    },
    StartAttempt {
        test: Ref,
    },
    CompleteAttempt {
        attempt: Ref,
    },
    SubmitAnswers {
        answers: Vec<AnswerRef>,
    },
    ViewResults {
        test: Ref,
    },
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::CreateTest { .. } => "create-test",
            StepAction::ListTests => "list-tests",
            StepAction::ActivateTest { .. } => "activate-test",
            StepAction::DeactivateTest { .. } => "deactivate-test",
            StepAction::DeleteTest { .. } => "delete-test",
            StepAction::AddQuestion { .. } => "add-question",
            StepAction::ListQuestions { .. } => "list-questions",
            StepAction::StartAttempt { .. } => "start-attempt",
            StepAction::CompleteAttempt { .. } => "complete-attempt",
            StepAction::SubmitAnswers { .. } => "submit-answers",
            StepAction::ViewResults { .. } => "view-results",
        }
    }

    /// Every reference this step reads.
    pub fn refs(&self) -> Vec<&Ref> {
        match self {
            StepAction::CreateTest { .. } | StepAction::ListTests => vec![],
            StepAction::ActivateTest { test }
            | StepAction::DeactivateTest { test }
            | StepAction::DeleteTest { test }
            | StepAction::AddQuestion { test, .. }
            | StepAction::ListQuestions { test }
            | StepAction::StartAttempt { test }
            | StepAction::ViewResults { test } => vec![test],
            StepAction::CompleteAttempt { attempt } => vec![attempt],
            StepAction::SubmitAnswers { answers } => answers
                .iter()
                .flat_map(|a| [&a.attempt, &a.question])
                .collect(),
        }
    }
}

/// What a step is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expectation {
    #[default]
    Ok,
    Fail(ErrorKind),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Ok => write!(f, "ok"),
            Expectation::Fail(kind) => write!(f, "{kind}"),
        }
    }
}

impl std::str::FromStr for Expectation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ok") {
            Ok(Expectation::Ok)
        } else {
            s.parse::<ErrorKind>().map(Expectation::Fail)
        }
    }
}

impl Serialize for Expectation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single scripted action.
#[derive(Debug, Clone)]
pub struct Step {
    /// Credential presented. `None` plays the step unauthenticated.
    pub credential: Option<String>,
    pub action: StepAction,
    /// Label to bind the created entity's id to.
    pub save: Option<String>,
    pub expect: Expectation,
    /// Expected number of entries for list and results steps.
    pub expect_len: Option<usize>,
}

// ---------------------------------------------------------------------------
// TOML layout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlScenarioFile {
    scenario: TomlScenarioHeader,
    #[serde(default)]
    courses: Vec<TomlCourse>,
    #[serde(default)]
    principals: Vec<TomlPrincipal>,
    #[serde(default)]
    steps: Vec<TomlStep>,
}

#[derive(Debug, Deserialize)]
struct TomlScenarioHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlCourse {
    id: i64,
    teacher: String,
    #[serde(default)]
    enrolled: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TomlPrincipal {
    token: String,
    identity: String,
    #[serde(default)]
    permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TomlStep {
    #[serde(rename = "as", default)]
    actor: Option<String>,
    action: String,
    #[serde(default)]
    course: Option<i64>,
    #[serde(default)]
    test: Option<Ref>,
    #[serde(default)]
    attempt: Option<Ref>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    duration_minutes: Option<u32>,
    #[serde(default)]
    graduate: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    answers: Vec<AnswerRef>,
    #[serde(default)]
    save: Option<String>,
    #[serde(default)]
    expect: Option<String>,
    #[serde(default)]
    expect_len: Option<usize>,
}

/// Parse a scenario file.
pub fn parse_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;

    parse_scenario_str(&content, path)
}

/// Parse a TOML string into a `Scenario`.
pub fn parse_scenario_str(content: &str, source_path: &Path) -> Result<Scenario> {
    let parsed: TomlScenarioFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let courses = parsed
        .courses
        .into_iter()
        .map(|c| CourseFixture {
            id: CourseId(c.id),
            teacher: Identity::from(c.teacher),
            enrolled: c.enrolled.into_iter().map(Identity::from).collect(),
        })
        .collect();

    let principals = parsed
        .principals
        .into_iter()
        .map(|p| PrincipalFixture {
            token: p.token,
            identity: Identity::from(p.identity),
            permissions: p.permissions,
        })
        .collect();

    let steps = parsed
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, s)| convert_step(s).with_context(|| format!("step {}", i + 1)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Scenario {
        id: parsed.scenario.id,
        name: parsed.scenario.name,
        description: parsed.scenario.description,
        courses,
        principals,
        steps,
    })
}

fn convert_step(s: TomlStep) -> Result<Step> {
    let action_name = s.action.to_lowercase();
    let test = || {
        s.test
            .clone()
            .ok_or_else(|| anyhow::anyhow!("'{action_name}' requires `test`"))
    };

    let action = match action_name.as_str() {
        "create-test" => StepAction::CreateTest {
            course: CourseId(
                s.course
                    .ok_or_else(|| anyhow::anyhow!("'create-test' requires `course`"))?,
            ),
            title: s.title.clone().unwrap_or_default(),
            subject: s.subject.clone(),
            duration_minutes: s.duration_minutes,
            graduate: s.graduate,
        },
        "list-tests" => StepAction::ListTests,
        "activate-test" => StepAction::ActivateTest { test: test()? },
        "deactivate-test" => StepAction::DeactivateTest { test: test()? },
        "delete-test" => StepAction::DeleteTest { test: test()? },
        "add-question" => StepAction::AddQuestion {
            test: test()?,
            name: s.name.clone(),
            text: s.text.clone().unwrap_or_default(),
            kind: s
                .kind
                .as_deref()
                .map(|k| k.parse::<QuestionKind>().map_err(|e: String| anyhow::anyhow!("{}", e)))
                .transpose()?
                .unwrap_or_default(),
        },
        "list-questions" => StepAction::ListQuestions { test: test()? },
        "start-attempt" => StepAction::StartAttempt { test: test()? },
        "complete-attempt" => StepAction::CompleteAttempt {
            attempt: s
                .attempt
                .clone()
                .ok_or_else(|| anyhow::anyhow!("'complete-attempt' requires `attempt`"))?,
        },
        "submit-answers" => StepAction::SubmitAnswers {
            answers: s.answers.clone(),
        },
        "view-results" => StepAction::ViewResults { test: test()? },
        other => anyhow::bail!("unknown action: {other}"),
    };

    let expect = s
        .expect
        .as_deref()
        .map(|e| e.parse::<Expectation>().map_err(|e: String| anyhow::anyhow!("{}", e)))
        .transpose()?
        .unwrap_or_default();

    Ok(Step {
        credential: s.actor.filter(|a| !a.is_empty()),
        action,
        save: s.save,
        expect,
        expect_len: s.expect_len,
    })
}

/// Recursively load all `.toml` scenario files from a directory.
pub fn load_scenario_directory(dir: &Path) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scenarios.extend(load_scenario_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_scenario(&path) {
                Ok(scenario) => scenarios.push(scenario),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(scenarios)
}

/// A warning from scenario validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// 1-based step number (if applicable).
    pub step: Option<usize>,
    pub message: String,
}

/// Validate a scenario for common issues.
pub fn validate_scenario(scenario: &Scenario) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut course_ids = HashSet::new();
    for course in &scenario.courses {
        if !course_ids.insert(course.id) {
            warnings.push(ValidationWarning {
                step: None,
                message: format!("duplicate course id: {}", course.id),
            });
        }
        if !course.id.is_valid() {
            warnings.push(ValidationWarning {
                step: None,
                message: format!("course id must be positive: {}", course.id),
            });
        }
    }

    let mut tokens = HashSet::new();
    for principal in &scenario.principals {
        if !tokens.insert(principal.token.as_str()) {
            warnings.push(ValidationWarning {
                step: None,
                message: format!("duplicate token: {}", principal.token),
            });
        }
    }

    let identities: HashSet<&Identity> = scenario.principals.iter().map(|p| &p.identity).collect();
    for course in &scenario.courses {
        if !identities.contains(&course.teacher) {
            warnings.push(ValidationWarning {
                step: None,
                message: format!(
                    "course {} teacher '{}' has no credential",
                    course.id, course.teacher
                ),
            });
        }
    }

    let mut labels: HashMap<&str, usize> = HashMap::new();
    for (i, step) in scenario.steps.iter().enumerate() {
        let n = i + 1;

        if let Some(token) = &step.credential {
            let expects_rejection = step.expect == Expectation::Fail(ErrorKind::Unauthenticated);
            if !tokens.contains(token.as_str()) && !expects_rejection {
                warnings.push(ValidationWarning {
                    step: Some(n),
                    message: format!("unknown credential '{token}'"),
                });
            }
        }

        for r in step.action.refs() {
            if let Ref::Label(label) = r {
                if !labels.contains_key(label.as_str()) {
                    warnings.push(ValidationWarning {
                        step: Some(n),
                        message: format!("label '{label}' is used before it is saved"),
                    });
                }
            }
        }

        if let Some(label) = &step.save {
            if let Some(first) = labels.insert(label.as_str(), n) {
                warnings.push(ValidationWarning {
                    step: Some(n),
                    message: format!("label '{label}' already saved by step {first}"),
                });
            }
            if !matches!(
                step.action,
                StepAction::CreateTest { .. }
                    | StepAction::AddQuestion { .. }
                    | StepAction::StartAttempt { .. }
            ) {
                warnings.push(ValidationWarning {
                    step: Some(n),
                    message: format!("'{}' does not create anything to save", step.action.name()),
                });
            }
        }

        if step.expect_len.is_some()
            && !matches!(
                step.action,
                StepAction::ListTests
                    | StepAction::ListQuestions { .. }
                    | StepAction::ViewResults { .. }
                    | StepAction::SubmitAnswers { .. }
            )
        {
            warnings.push(ValidationWarning {
                step: Some(n),
                message: format!("expect_len has no meaning for '{}'", step.action.name()),
            });
        }
    }

    warnings
}
