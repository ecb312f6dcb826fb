//! End-to-end engine tests over the in-memory ports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use examgate_core::error::{Conflict, ErrorKind, ServiceError, StoreError};
use examgate_core::model::{
    AddQuestion, AnswerInput, AttemptId, AttemptState, CourseId, CreateTest, Identity, Principal,
    Question, QuestionKind, Test, TestId, TestStatus,
};
use examgate_core::policy::{DenyReason, PolicyConfig};
use examgate_core::service::{AssessmentService, ServiceConfig};
use examgate_core::traits::{RelationshipStore, Store};
use examgate_store::mock::{FlakyStore, MockResolver};
use examgate_store::{MemoryStore, StaticRelationships};

const C1: CourseId = CourseId(1);

fn teacher() -> Principal {
    Principal::new("teacher-a", ["course:test:add", "test:quest:add"])
}

fn learner() -> Principal {
    Principal::new("learner-b", ["test:answer:read"])
}

fn relationships() -> StaticRelationships {
    StaticRelationships::new()
        .with_course(C1, "teacher-a")
        .with_enrollment(C1, "learner-b")
        .with_enrollment(C1, "learner-c")
}

fn service_over(store: Arc<dyn Store>, config: ServiceConfig) -> AssessmentService {
    AssessmentService::new(
        Arc::new(MockResolver::new(["test:answer:read"])),
        Arc::new(relationships()),
        store,
        config,
    )
}

fn service() -> (AssessmentService, MemoryStore) {
    let memory = MemoryStore::new();
    let svc = service_over(Arc::new(memory.clone()), ServiceConfig::default());
    (svc, memory)
}

fn create(title: &str) -> CreateTest {
    CreateTest {
        course_id: C1,
        title: title.into(),
        subject: None,
        duration_minutes: None,
        graduate: false,
    }
}

fn question(text: &str) -> AddQuestion {
    AddQuestion {
        name: None,
        text: text.into(),
        kind: QuestionKind::Text,
    }
}

fn answer(attempt: AttemptId, q: &Question, value: &str) -> AnswerInput {
    AnswerInput {
        attempt_id: attempt,
        question_id: q.id,
        value: value.into(),
    }
}

/// An active test with `n` questions.
async fn published(svc: &AssessmentService, title: &str, n: usize) -> (Test, Vec<Question>) {
    let test = svc.create_test(&teacher(), create(title)).await.unwrap();
    let mut questions = Vec::new();
    for i in 0..n {
        questions.push(
            svc.add_question(&teacher(), test.id, question(&format!("Q{}", i + 1)))
                .await
                .unwrap(),
        );
    }
    let test = svc.activate_test(&teacher(), test.id).await.unwrap();
    (test, questions)
}

#[tokio::test]
async fn teacher_and_learner_walkthrough() {
    let (svc, memory) = service();
    let a = teacher();
    let b = learner();

    let t1 = svc.create_test(&a, create("T1")).await.unwrap();
    assert_eq!(t1.status, TestStatus::Inactive);

    let q1 = svc.add_question(&a, t1.id, question("Q1")).await.unwrap();
    let t1 = svc.activate_test(&a, t1.id).await.unwrap();
    assert_eq!(t1.status, TestStatus::Active);

    let a1 = svc.start_attempt(&b, t1.id).await.unwrap();
    assert_eq!(a1.state, AttemptState::Active);
    assert!(a1.completed_at.is_none());

    let err = svc.start_attempt(&b, t1.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.reason(), "active_attempt_exists");

    let submission = svc
        .submit_answers(&b, &[answer(a1.id, &q1, "4")])
        .await
        .unwrap();
    assert_eq!(submission.answers.len(), 1);
    assert_eq!(submission.answers[0].batch_id, submission.batch_id);

    let done = svc.complete_attempt(&b, a1.id).await.unwrap();
    assert_eq!(done.state, AttemptState::Completed);
    assert!(done.completed_at.is_some());

    let err = svc.add_question(&a, t1.id, question("Q2")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(Conflict::StructureLocked)));
    assert_eq!(svc.list_questions(&a, t1.id).await.unwrap().len(), 1);
    assert_eq!(memory.answer_count().await, 1);
}

#[tokio::test]
async fn second_completion_is_not_found_and_changes_nothing() {
    let (svc, _) = service();
    let (test, _) = published(&svc, "Quiz", 1).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();
    let first = svc.complete_attempt(&learner(), attempt.id).await.unwrap();

    let err = svc
        .complete_attempt(&learner(), attempt.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let results = svc.view_results(&teacher(), test.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].completed_at, first.completed_at);
}

#[tokio::test]
async fn foreign_attempt_reads_as_not_found() {
    let (svc, _) = service();
    let (test, questions) = published(&svc, "Quiz", 1).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();
    let intruder = Principal::new("learner-c", Vec::<String>::new());

    let err = svc
        .complete_attempt(&intruder, attempt.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = svc
        .submit_answers(&intruder, &[answer(attempt.id, &questions[0], "x")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let missing = svc
        .complete_attempt(&intruder, AttemptId(999))
        .await
        .unwrap_err();
    assert_eq!(missing.to_string(), "attempt_id 999 not found");
    assert_eq!(err.reason(), missing.reason());
}

#[tokio::test]
async fn forced_failure_mid_batch_leaves_no_rows() {
    let memory = MemoryStore::new();
    let flaky = FlakyStore::new(Arc::new(memory.clone())).with_stage_failure(2);
    let svc = service_over(Arc::new(flaky), ServiceConfig::default());

    let (test, questions) = published(&svc, "Quiz", 3).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();
    let batch: Vec<AnswerInput> = questions
        .iter()
        .map(|q| answer(attempt.id, q, "v"))
        .collect();

    let err = svc.submit_answers(&learner(), &batch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(memory.answer_count().await, 0);

    // The attempt is untouched and still accepts a clean batch.
    let clean = svc
        .submit_answers(&learner(), &batch[..1])
        .await
        .unwrap();
    assert_eq!(clean.answers.len(), 1);
    assert_eq!(memory.answer_count().await, 1);
}

#[tokio::test]
async fn cross_test_question_rejects_whole_batch() {
    let (svc, memory) = service();
    let (quiz, quiz_questions) = published(&svc, "Quiz", 1).await;
    let (_, exam_questions) = published(&svc, "Exam", 1).await;
    let attempt = svc.start_attempt(&learner(), quiz.id).await.unwrap();

    let err = svc
        .submit_answers(
            &learner(),
            &[
                answer(attempt.id, &quiz_questions[0], "ok"),
                answer(attempt.id, &exam_questions[0], "wrong test"),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(memory.answer_count().await, 0);
}

#[tokio::test]
async fn resubmission_replaces_previous_value() {
    let (svc, memory) = service();
    let (test, questions) = published(&svc, "Quiz", 1).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();

    let first = svc
        .submit_answers(&learner(), &[answer(attempt.id, &questions[0], "3")])
        .await
        .unwrap();
    let second = svc
        .submit_answers(&learner(), &[answer(attempt.id, &questions[0], "4")])
        .await
        .unwrap();
    assert_ne!(first.batch_id, second.batch_id);
    assert_eq!(memory.answer_count().await, 1);

    svc.complete_attempt(&learner(), attempt.id).await.unwrap();
    let results = svc.view_results(&learner(), test.id).await.unwrap();
    assert_eq!(results[0].answers[0].value, "4");
}

#[tokio::test]
async fn empty_batch_and_bad_ids_are_invalid() {
    let (svc, _) = service();
    let err = svc.submit_answers(&learner(), &[]).await.unwrap_err();
    assert_eq!(err.status(), 400);

    let err = svc.start_attempt(&learner(), TestId(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = svc.create_test(&teacher(), create("   ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test(start_paused = true)]
async fn slow_store_surfaces_retryable_unavailable() {
    let slow = FlakyStore::new(Arc::new(MemoryStore::new())).with_latency(Duration::from_secs(5));
    let config = ServiceConfig {
        store_timeout: Duration::from_millis(100),
        policy: PolicyConfig::default(),
    };
    let svc = service_over(Arc::new(slow), config);

    let err = svc.create_test(&teacher(), create("Quiz")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(err.status(), 503);
    assert_eq!(err.reason(), "store_timeout");
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn timeout_while_staging_discards_batch() {
    let memory = MemoryStore::new();
    let slow = FlakyStore::new(Arc::new(memory.clone()))
        .with_stage_latency(Duration::from_secs(5));
    let config = ServiceConfig {
        store_timeout: Duration::from_millis(100),
        policy: PolicyConfig::default(),
    };
    let svc = service_over(Arc::new(slow), config);

    let (test, questions) = published(&svc, "Quiz", 2).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();
    let batch: Vec<AnswerInput> = questions
        .iter()
        .map(|q| answer(attempt.id, q, "v"))
        .collect();

    let err = svc.submit_answers(&learner(), &batch).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(memory.answer_count().await, 0);
}

#[tokio::test]
async fn results_visibility_rules() {
    let (svc, _) = service();
    let (test, questions) = published(&svc, "Quiz", 2).await;
    let carol = Principal::new("learner-c", ["test:answer:read"]);

    // Never attempted: empty, not an error.
    assert!(svc.view_results(&learner(), test.id).await.unwrap().is_empty());

    let b = svc.start_attempt(&learner(), test.id).await.unwrap();
    let c = svc.start_attempt(&carol, test.id).await.unwrap();
    svc.submit_answers(&learner(), &[answer(b.id, &questions[1], "b2")])
        .await
        .unwrap();
    svc.submit_answers(
        &carol,
        &[
            answer(c.id, &questions[1], "c2"),
            answer(c.id, &questions[0], "c1"),
        ],
    )
    .await
    .unwrap();

    // Active attempts are never exposed, even to their owner.
    assert!(svc.view_results(&learner(), test.id).await.unwrap().is_empty());
    assert!(svc.view_results(&teacher(), test.id).await.unwrap().is_empty());

    svc.complete_attempt(&carol, c.id).await.unwrap();
    svc.complete_attempt(&learner(), b.id).await.unwrap();

    let all = svc.view_results(&teacher(), test.id).await.unwrap();
    let learners: Vec<&str> = all.iter().map(|r| r.learner.as_str()).collect();
    assert_eq!(learners, vec!["learner-b", "learner-c"]);
    let carol_values: Vec<&str> = all[1].answers.iter().map(|a| a.value.as_str()).collect();
    assert_eq!(carol_values, vec!["c1", "c2"]);

    let own = svc.view_results(&learner(), test.id).await.unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].learner, Identity::from("learner-b"));
    assert_eq!(own[0].answers.len(), 1);
}

#[tokio::test]
async fn self_view_without_grant() {
    let (svc, _) = service();
    let (test, _) = published(&svc, "Quiz", 1).await;
    let bare = Principal::new("learner-b", Vec::<String>::new());

    let err = svc.view_results(&bare, test.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Forbidden(DenyReason::MissingPermission(ref g)) if g == "test:answer:read"
    ));

    let relaxed = service_over(
        Arc::new(MemoryStore::new()),
        ServiceConfig {
            policy: PolicyConfig {
                self_results_requires_permission: false,
                ..PolicyConfig::default()
            },
            ..ServiceConfig::default()
        },
    );
    let (test, _) = published(&relaxed, "Quiz", 1).await;
    assert!(relaxed.view_results(&bare, test.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn course_scoped_denials_stay_forbidden() {
    let (svc, _) = service();
    let (test, _) = published(&svc, "Quiz", 1).await;
    let stranger = Principal::new("stranger", ["course:test:add", "test:quest:add"]);

    let err = svc.create_test(&stranger, create("Mine")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(DenyReason::NotTeacher)));

    let err = svc
        .add_question(&learner(), test.id, question("Q"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = svc.list_questions(&stranger, test.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(DenyReason::NotEnrolled)));

    let err = svc.deactivate_test(&learner(), test.id).await.unwrap_err();
    assert_eq!(err.status(), 403);
}

#[tokio::test]
async fn enforced_permission_strings_gate_teacher_writes() {
    let svc = service_over(
        Arc::new(MemoryStore::new()),
        ServiceConfig {
            policy: PolicyConfig {
                enforce_permission_strings: true,
                ..PolicyConfig::default()
            },
            ..ServiceConfig::default()
        },
    );
    let ungranted = Principal::new("teacher-a", Vec::<String>::new());

    let err = svc.create_test(&ungranted, create("Quiz")).await.unwrap_err();
    assert_eq!(err.reason(), "missing_permission");

    let test = svc.create_test(&teacher(), create("Quiz")).await.unwrap();
    // `teacher()` lacks the manage grant.
    let err = svc.activate_test(&teacher(), test.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn list_tests_by_standing() {
    let (svc, _) = service();
    let (active, _) = published(&svc, "Active", 0).await;
    let draft = svc.create_test(&teacher(), create("Draft")).await.unwrap();

    let mine = svc.list_tests(&teacher()).await.unwrap();
    assert_eq!(mine.len(), 2);

    let visible = svc.list_tests(&learner()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, active.id);

    let stranger = Principal::new("stranger", Vec::<String>::new());
    assert!(svc.list_tests(&stranger).await.unwrap().is_empty());

    svc.delete_test(&teacher(), draft.id).await.unwrap();
    assert_eq!(svc.list_tests(&teacher()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn soft_deleted_test_disappears() {
    let (svc, _) = service();
    let (test, _) = published(&svc, "Quiz", 1).await;
    svc.delete_test(&teacher(), test.id).await.unwrap();

    let err = svc.start_attempt(&learner(), test.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = svc
        .add_question(&teacher(), test.id, question("Q"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = svc.delete_test(&teacher(), test.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // The title is free again.
    svc.create_test(&teacher(), create("Quiz")).await.unwrap();
}

#[tokio::test]
async fn attempts_on_deleted_test_are_not_found() {
    let (svc, memory) = service();
    let (test, questions) = published(&svc, "Quiz", 1).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();
    svc.delete_test(&teacher(), test.id).await.unwrap();

    let err = svc
        .submit_answers(&learner(), &[answer(attempt.id, &questions[0], "4")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(memory.answer_count().await, 0);

    let err = svc
        .complete_attempt(&learner(), attempt.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let stored = memory.list_attempts(test.id).await.unwrap();
    assert_eq!(stored[0].state, AttemptState::Active);
}

#[tokio::test]
async fn malformed_question_is_invalid_even_when_locked() {
    let (svc, _) = service();
    let (test, _) = published(&svc, "Quiz", 1).await;
    svc.start_attempt(&learner(), test.id).await.unwrap();

    let err = svc
        .add_question(&teacher(), test.id, question("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = svc
        .add_question(&teacher(), test.id, question("Q2"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn graduate_flag_is_stored() {
    let (svc, _) = service();
    let mut request = create("Final");
    request.graduate = true;
    let test = svc.create_test(&teacher(), request).await.unwrap();
    assert!(test.graduate);
    assert!(!svc.create_test(&teacher(), create("Weekly")).await.unwrap().graduate);
}

#[tokio::test]
async fn deactivation_blocks_new_attempts_only() {
    let (svc, _) = service();
    let (test, _) = published(&svc, "Quiz", 1).await;
    let attempt = svc.start_attempt(&learner(), test.id).await.unwrap();

    svc.deactivate_test(&teacher(), test.id).await.unwrap();
    let carol = Principal::new("learner-c", Vec::<String>::new());
    let err = svc.start_attempt(&carol, test.id).await.unwrap_err();
    assert_eq!(err.reason(), "test_not_active");

    svc.complete_attempt(&learner(), attempt.id).await.unwrap();
}

#[tokio::test]
async fn duplicate_title_is_conflict() {
    let (svc, _) = service();
    svc.create_test(&teacher(), create("Quiz")).await.unwrap();
    let err = svc.create_test(&teacher(), create("Quiz")).await.unwrap_err();
    assert_eq!(err.reason(), "duplicate_test_title");
    assert_eq!(err.status(), 409);
}

#[tokio::test]
async fn authenticate_classifies_failures() {
    let (svc, _) = service();
    assert_eq!(
        svc.authenticate(None).await.unwrap_err().kind(),
        ErrorKind::Unauthenticated
    );
    assert_eq!(
        svc.authenticate(Some("  ")).await.unwrap_err().kind(),
        ErrorKind::Unauthenticated
    );
    let p = svc.authenticate(Some("learner-b")).await.unwrap();
    assert!(p.has_permission("test:answer:read"));

    let offline = AssessmentService::new(
        Arc::new(MockResolver::offline()),
        Arc::new(relationships()),
        Arc::new(MemoryStore::new()),
        ServiceConfig::default(),
    );
    assert_eq!(
        offline.authenticate(Some("anyone")).await.unwrap_err().kind(),
        ErrorKind::Internal
    );
}

/// Relationship backend that is always down.
struct DownRelationships;

#[async_trait]
impl RelationshipStore for DownRelationships {
    async fn is_teacher_of(&self, _: &Identity, _: CourseId) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn is_enrolled_in(&self, _: &Identity, _: CourseId) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

#[tokio::test]
async fn relationship_outage_fails_closed() {
    let svc = AssessmentService::new(
        Arc::new(MockResolver::new(Vec::<String>::new())),
        Arc::new(DownRelationships),
        Arc::new(MemoryStore::new()),
        ServiceConfig::default(),
    );

    let err = svc.create_test(&teacher(), create("Quiz")).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Forbidden(DenyReason::RelationshipUnavailable)
    ));
}
