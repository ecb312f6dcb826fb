//! Results aggregation.
//!
//! Assembles per-learner answer sheets for a test. Only completed attempts
//! contribute; answers are joined against the test's current questions and
//! emitted in question order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{Attempt, AttemptId, Identity, Question, QuestionId, SubmittedAnswer, TestId};
use crate::traits::Store;

/// Which learners a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Every learner with a completed attempt (course teacher).
    AllLearners,
    /// Only this learner.
    Learner(Identity),
}

/// One answered question in a result sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLine {
    pub question_id: QuestionId,
    pub question_text: String,
    pub value: String,
}

/// A learner's answers for one completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerResult {
    pub learner: Identity,
    pub attempt_id: AttemptId,
    pub completed_at: Option<DateTime<Utc>>,
    pub answers: Vec<AnswerLine>,
}

pub struct ResultsAggregator {
    store: Arc<dyn Store>,
}

impl ResultsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn collect(
        &self,
        test: TestId,
        visibility: &Visibility,
    ) -> Result<Vec<LearnerResult>, ServiceError> {
        let attempts = self.store.list_attempts(test).await?;
        let picked = latest_completed(&attempts, visibility);
        if picked.is_empty() {
            return Ok(Vec::new());
        }

        let questions = self.store.list_questions(test).await?;
        let mut results = Vec::with_capacity(picked.len());
        for attempt in picked {
            let answers = self.store.answers_for_attempt(attempt.id).await?;
            results.push(LearnerResult {
                learner: attempt.learner.clone(),
                attempt_id: attempt.id,
                completed_at: attempt.completed_at,
                answers: join_answers(&questions, &answers),
            });
        }

        tracing::debug!("assembled results for {} learners on test {test}", results.len());
        Ok(results)
    }
}

/// Pick each visible learner's most recently completed attempt.
///
/// Learners are ordered by the id of their earliest completed attempt;
/// `attempts` is expected in id order.
pub fn latest_completed<'a>(attempts: &'a [Attempt], visibility: &Visibility) -> Vec<&'a Attempt> {
    let mut order: Vec<&Identity> = Vec::new();
    let mut latest: HashMap<&Identity, &Attempt> = HashMap::new();

    for attempt in attempts.iter().filter(|a| !a.is_active()) {
        if let Visibility::Learner(me) = visibility {
            if attempt.learner != *me {
                continue;
            }
        }
        let newer = match latest.get(&attempt.learner) {
            None => {
                order.push(&attempt.learner);
                true
            }
            Some(current) => attempt.completed_at >= current.completed_at,
        };
        if newer {
            latest.insert(&attempt.learner, attempt);
        }
    }

    order
        .into_iter()
        .filter_map(|learner| latest.get(learner).copied())
        .collect()
}

/// Join answers to questions by id, in question order.
///
/// Answers to questions no longer attached to the test are dropped.
pub fn join_answers(questions: &[Question], answers: &[SubmittedAnswer]) -> Vec<AnswerLine> {
    let by_question: HashMap<QuestionId, &SubmittedAnswer> =
        answers.iter().map(|a| (a.question_id, a)).collect();

    questions
        .iter()
        .filter_map(|q| {
            by_question.get(&q.id).map(|a| AnswerLine {
                question_id: q.id,
                question_text: q.text.clone(),
                value: a.value.clone(),
            })
        })
        .collect()
}
