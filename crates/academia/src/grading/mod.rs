//! Academic evaluation and grade aggregation engine.
//!
//! Evaluations are validated and scheduled by [`EvaluationRegistry`], grades are recorded
//! against them by [`GradeStore`], and [`ReportCardService`] recomputes subject averages,
//! general averages, and class rankings from the current grade state on every request.

pub mod averages;
pub mod domain;
pub mod error;
pub mod evaluations;
pub mod grades;
pub mod import;
pub mod memory;
pub mod ranking;
pub mod report;
pub mod repository;
pub mod router;
pub mod schedule;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use averages::{AverageCalculator, StudentAverages, SubjectAverage};
pub use domain::{
    AcademicYearId, ClassId, Evaluation, EvaluationDraft, EvaluationId, EvaluationKind,
    EvaluationStatus, Grade, GradeEntry, GradeId, GradeUpdate, Period, Principal, PrincipalRole,
    ScheduleSlot, SlotDraft, SlotId, StudentId, SubjectId, TeacherId,
};
pub use error::{BusinessRuleViolation, ErrorKind, GradingError, ValidationError};
pub use evaluations::EvaluationRegistry;
pub use grades::{EvaluationLocks, GradeStore};
pub use import::{GradeSheetError, GradeSheetImporter};
pub use memory::InMemoryGradebook;
pub use ranking::{ClassRanking, ClassStatistics, RankedStudent, RankingEngine};
pub use report::{ClassReport, ReportCardService, StudentReportCard};
pub use repository::{GradingBackend, RepositoryError};
pub use router::grading_router;
pub use schedule::{ScheduleConflictDetector, Timetable};

/// Facade wiring every component to one backend.
pub struct Gradebook<R> {
    evaluations: EvaluationRegistry<R, R, R>,
    grades: GradeStore<R, R, R>,
    timetable: Timetable<R>,
    reports: ReportCardService<R>,
}

impl<R> Gradebook<R>
where
    R: GradingBackend,
{
    pub fn new(backend: Arc<R>, calculator: AverageCalculator) -> Self {
        let locks = Arc::new(EvaluationLocks::default());
        Self {
            evaluations: EvaluationRegistry::new(
                backend.clone(),
                backend.clone(),
                backend.clone(),
                locks.clone(),
            ),
            grades: GradeStore::new(backend.clone(), backend.clone(), backend.clone(), locks),
            timetable: Timetable::new(backend.clone()),
            reports: ReportCardService::new(backend, calculator),
        }
    }

    pub fn evaluations(&self) -> &EvaluationRegistry<R, R, R> {
        &self.evaluations
    }

    pub fn grades(&self) -> &GradeStore<R, R, R> {
        &self.grades
    }

    pub fn timetable(&self) -> &Timetable<R> {
        &self.timetable
    }

    pub fn reports(&self) -> &ReportCardService<R> {
        &self.reports
    }
}
