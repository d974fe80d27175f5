use academia::grading::{
    AcademicYearId, ClassId, GradingError, InMemoryGradebook, StudentId, SubjectId, TeacherId,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const SAMPLE_YEAR: &str = "2025-2026";
pub(crate) const SAMPLE_CLASS: &str = "6A";
pub(crate) const SAMPLE_STUDENTS: [&str; 3] = ["amina", "bruno", "chloe"];

/// Subject, teacher, and catalog coefficient taught to the sample class.
pub(crate) const SAMPLE_SUBJECTS: [(&str, &str, f64); 2] =
    [("math", "t-math", 4.0), ("french", "t-french", 5.0)];

pub(crate) fn sample_class() -> ClassId {
    ClassId::new(SAMPLE_CLASS)
}

pub(crate) fn sample_year() -> AcademicYearId {
    AcademicYearId::new(SAMPLE_YEAR)
}

/// Enrollments, teacher assignments, and subject coefficients for the sample class.
pub(crate) fn seed_roster(backend: &InMemoryGradebook) -> Result<(), GradingError> {
    for student in SAMPLE_STUDENTS {
        backend.enroll(StudentId::new(student), sample_class(), sample_year())?;
    }
    for (subject, teacher, coefficient) in SAMPLE_SUBJECTS {
        backend.assign(
            TeacherId::new(teacher),
            SubjectId::new(subject),
            sample_class(),
            sample_year(),
        )?;
        backend.set_subject_coefficient(SubjectId::new(subject), coefficient)?;
    }
    Ok(())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
