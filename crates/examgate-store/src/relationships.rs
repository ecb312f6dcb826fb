//! Static course relationships.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use examgate_core::error::StoreError;
use examgate_core::model::{CourseId, Identity};
use examgate_core::scenario::CourseFixture;
use examgate_core::traits::RelationshipStore;

/// Teacher and enrollment tables fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticRelationships {
    teachers: HashMap<CourseId, Identity>,
    enrollments: HashSet<(CourseId, Identity)>,
}

impl StaticRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `teacher` as the owner of `course`, replacing any previous owner.
    pub fn with_course(mut self, course: CourseId, teacher: impl Into<Identity>) -> Self {
        self.teachers.insert(course, teacher.into());
        self
    }

    pub fn with_enrollment(mut self, course: CourseId, learner: impl Into<Identity>) -> Self {
        self.enrollments.insert((course, learner.into()));
        self
    }

    /// Build from scenario course fixtures.
    pub fn from_fixtures(courses: &[CourseFixture]) -> Self {
        courses.iter().fold(Self::new(), |rel, course| {
            course.enrolled.iter().fold(
                rel.with_course(course.id, course.teacher.clone()),
                |rel, learner| rel.with_enrollment(course.id, learner.clone()),
            )
        })
    }
}

#[async_trait]
impl RelationshipStore for StaticRelationships {
    async fn is_teacher_of(
        &self,
        identity: &Identity,
        course: CourseId,
    ) -> Result<bool, StoreError> {
        Ok(self.teachers.get(&course) == Some(identity))
    }

    async fn is_enrolled_in(
        &self,
        identity: &Identity,
        course: CourseId,
    ) -> Result<bool, StoreError> {
        Ok(self.enrollments.contains(&(course, identity.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn teacher_and_enrollment_lookups() {
        let rel = StaticRelationships::new()
            .with_course(CourseId(1), "teacher-a")
            .with_enrollment(CourseId(1), "learner-b");

        let teacher = Identity::from("teacher-a");
        let learner = Identity::from("learner-b");
        assert!(rel.is_teacher_of(&teacher, CourseId(1)).await.unwrap());
        assert!(!rel.is_teacher_of(&learner, CourseId(1)).await.unwrap());
        assert!(!rel.is_teacher_of(&teacher, CourseId(2)).await.unwrap());
        assert!(rel.is_enrolled_in(&learner, CourseId(1)).await.unwrap());
        assert!(!rel.is_enrolled_in(&teacher, CourseId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn numeric_looking_identities_compare_as_strings() {
        let rel = StaticRelationships::new().with_course(CourseId(1), "100");
        assert!(rel.is_teacher_of(&Identity::from("100"), CourseId(1)).await.unwrap());
        assert!(!rel.is_teacher_of(&Identity::from("0100"), CourseId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn built_from_fixtures() {
        let fixtures = vec![CourseFixture {
            id: CourseId(3),
            teacher: Identity::from("t"),
            enrolled: vec![Identity::from("l1"), Identity::from("l2")],
        }];
        let rel = StaticRelationships::from_fixtures(&fixtures);
        assert!(rel.is_teacher_of(&Identity::from("t"), CourseId(3)).await.unwrap());
        assert!(rel.is_enrolled_in(&Identity::from("l2"), CourseId(3)).await.unwrap());
    }
}
