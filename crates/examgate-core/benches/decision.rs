use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examgate_core::error::StoreError;
use examgate_core::model::{CourseId, Identity, Principal, TestId};
use examgate_core::policy::{Action, DecisionEngine, PolicyConfig, Resource};
use examgate_core::traits::RelationshipStore;

/// Every course is taught by "teacher" and has "learner" enrolled.
struct StaticCourses;

#[async_trait]
impl RelationshipStore for StaticCourses {
    async fn is_teacher_of(&self, identity: &Identity, _: CourseId) -> Result<bool, StoreError> {
        Ok(identity.as_str() == "teacher")
    }

    async fn is_enrolled_in(&self, identity: &Identity, _: CourseId) -> Result<bool, StoreError> {
        Ok(identity.as_str() == "learner")
    }
}

fn bench_authorize(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let engine = DecisionEngine::new(Arc::new(StaticCourses), PolicyConfig::default());
    let teacher = Principal::new("teacher", ["course:test:add"]);
    let learner = Principal::new("learner", ["test:answer:read"]);
    let stranger = Principal::new("stranger", Vec::<String>::new());
    let test = Resource::Test {
        test: TestId(1),
        course: CourseId(1),
    };

    let mut group = c.benchmark_group("authorize");

    group.bench_function("teacher_add_question", |b| {
        b.iter(|| rt.block_on(engine.authorize(&teacher, Action::AddQuestion, black_box(&test))))
    });

    group.bench_function("learner_view_results", |b| {
        b.iter(|| rt.block_on(engine.authorize(&learner, Action::ViewResults, black_box(&test))))
    });

    group.bench_function("stranger_denied", |b| {
        b.iter(|| rt.block_on(engine.authorize(&stranger, Action::ListQuestions, black_box(&test))))
    });

    let own = Resource::Attempt {
        learner: Identity::from("learner"),
    };
    group.bench_function("attempt_ownership", |b| {
        b.iter(|| rt.block_on(engine.authorize(&learner, Action::SubmitAnswers, black_box(&own))))
    });

    group.finish();
}

criterion_group!(benches, bench_authorize);
criterion_main!(benches);
