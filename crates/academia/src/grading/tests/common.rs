use std::sync::Arc;

use axum::response::Response;
use chrono::{NaiveDate, NaiveTime, Weekday};
use serde_json::Value;

use crate::grading::domain::{
    AcademicYearId, ClassId, EvaluationDraft, EvaluationKind, Principal, PrincipalRole,
    SlotDraft, StudentId, SubjectId, TeacherId,
};
use crate::grading::{AverageCalculator, Gradebook, InMemoryGradebook};

pub(super) const YEAR: &str = "2025-2026";
pub(super) const CLASS: &str = "6A";
pub(super) const MATH_TEACHER: &str = "t-math";
pub(super) const FRENCH_TEACHER: &str = "t-french";
pub(super) const STUDENTS: [&str; 3] = ["stu-1", "stu-2", "stu-3"];

pub(super) fn year() -> AcademicYearId {
    AcademicYearId::new(YEAR)
}

pub(super) fn class() -> ClassId {
    ClassId::new(CLASS)
}

pub(super) fn student(id: &str) -> StudentId {
    StudentId::new(id)
}

pub(super) fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).expect("valid date")
}

pub(super) fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

pub(super) fn staff() -> Principal {
    Principal::new("registrar", PrincipalRole::Staff)
}

pub(super) fn admin() -> Principal {
    Principal::new("principal-office", PrincipalRole::Administrator)
}

/// Backend with three students in 6A, math (coefficient 4) and French (coefficient 5).
pub(super) fn backend() -> Arc<InMemoryGradebook> {
    let backend = Arc::new(InMemoryGradebook::default());
    for id in STUDENTS {
        backend
            .enroll(student(id), class(), year())
            .expect("enroll");
    }
    backend
        .assign(
            TeacherId::new(MATH_TEACHER),
            SubjectId::new("math"),
            class(),
            year(),
        )
        .expect("assign math");
    backend
        .assign(
            TeacherId::new(FRENCH_TEACHER),
            SubjectId::new("french"),
            class(),
            year(),
        )
        .expect("assign french");
    backend
        .set_subject_coefficient(SubjectId::new("math"), 4.0)
        .expect("math coefficient");
    backend
        .set_subject_coefficient(SubjectId::new("french"), 5.0)
        .expect("french coefficient");
    backend
}

pub(super) fn gradebook() -> (Arc<InMemoryGradebook>, Gradebook<InMemoryGradebook>) {
    let backend = backend();
    let gradebook = Gradebook::new(backend.clone(), AverageCalculator::default());
    (backend, gradebook)
}

pub(super) fn math_draft(evaluation_date: NaiveDate) -> EvaluationDraft {
    EvaluationDraft {
        code: None,
        title: "Fractions test".to_string(),
        subject_id: SubjectId::new("math"),
        class_id: class(),
        teacher_id: TeacherId::new(MATH_TEACHER),
        academic_year_id: year(),
        period: "T1".to_string(),
        kind: EvaluationKind::Test,
        coefficient: 1,
        minimum_score: 0.0,
        maximum_score: 20.0,
        evaluation_date,
        description: None,
    }
}

pub(super) fn french_draft(evaluation_date: NaiveDate) -> EvaluationDraft {
    EvaluationDraft {
        title: "Dictation".to_string(),
        subject_id: SubjectId::new("french"),
        teacher_id: TeacherId::new(FRENCH_TEACHER),
        ..math_draft(evaluation_date)
    }
}

pub(super) fn monday_slot(teacher: &str, class_id: &str, start: NaiveTime, end: NaiveTime) -> SlotDraft {
    SlotDraft {
        class_id: ClassId::new(class_id),
        subject_id: SubjectId::new("math"),
        teacher_id: TeacherId::new(teacher),
        academic_year_id: year(),
        day_of_week: Weekday::Mon,
        start_time: start,
        end_time: end,
        room: None,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
