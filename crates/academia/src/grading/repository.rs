use chrono::{NaiveDate, NaiveDateTime, Weekday};

use super::domain::{
    AcademicYearId, ClassId, Evaluation, EvaluationId, EvaluationStatus, Grade, GradeId,
    ScheduleSlot, SlotId, StudentId, SubjectId, TeacherId,
};

/// Error enumeration for storage and directory failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Predicate used to list evaluations. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationFilter {
    pub class_id: Option<ClassId>,
    pub teacher_id: Option<TeacherId>,
    pub subject_id: Option<SubjectId>,
    pub academic_year_id: Option<AcademicYearId>,
    pub status: Option<EvaluationStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl EvaluationFilter {
    pub fn for_teacher_on(teacher_id: TeacherId, date: NaiveDate) -> Self {
        Self {
            teacher_id: Some(teacher_id),
            from_date: Some(date),
            to_date: Some(date),
            ..Self::default()
        }
    }

    pub fn for_class(class_id: ClassId, academic_year_id: AcademicYearId) -> Self {
        Self {
            class_id: Some(class_id),
            academic_year_id: Some(academic_year_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, evaluation: &Evaluation) -> bool {
        self.class_id
            .as_ref()
            .map_or(true, |id| *id == evaluation.class_id)
            && self
                .teacher_id
                .as_ref()
                .map_or(true, |id| *id == evaluation.teacher_id)
            && self
                .subject_id
                .as_ref()
                .map_or(true, |id| *id == evaluation.subject_id)
            && self
                .academic_year_id
                .as_ref()
                .map_or(true, |id| *id == evaluation.academic_year_id)
            && self.status.map_or(true, |status| status == evaluation.status)
            && self
                .from_date
                .map_or(true, |from| evaluation.evaluation_date >= from)
            && self
                .to_date
                .map_or(true, |to| evaluation.evaluation_date <= to)
    }
}

/// Predicate used to list timetable slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFilter {
    pub class_id: Option<ClassId>,
    pub teacher_id: Option<TeacherId>,
    pub academic_year_id: Option<AcademicYearId>,
    pub day_of_week: Option<Weekday>,
}

impl SlotFilter {
    pub fn matches(&self, slot: &ScheduleSlot) -> bool {
        self.class_id.as_ref().map_or(true, |id| *id == slot.class_id)
            && self
                .teacher_id
                .as_ref()
                .map_or(true, |id| *id == slot.teacher_id)
            && self
                .academic_year_id
                .as_ref()
                .map_or(true, |id| *id == slot.academic_year_id)
            && self.day_of_week.map_or(true, |day| day == slot.day_of_week)
    }
}

/// Storage for evaluations.
pub trait EvaluationRepository: Send + Sync {
    fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError>;
    fn update_evaluation(&self, evaluation: Evaluation) -> Result<(), RepositoryError>;
    fn fetch_evaluation(&self, id: &EvaluationId) -> Result<Option<Evaluation>, RepositoryError>;
    fn delete_evaluation(&self, id: &EvaluationId) -> Result<(), RepositoryError>;
    fn evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>, RepositoryError>;
}

/// Storage for grades. Tombstoned grades stay fetchable by id.
pub trait GradeRepository: Send + Sync {
    /// Persists every grade or none of them.
    fn insert_grades(&self, grades: Vec<Grade>) -> Result<Vec<Grade>, RepositoryError>;
    fn update_grade(&self, grade: Grade) -> Result<(), RepositoryError>;
    fn fetch_grade(&self, id: &GradeId) -> Result<Option<Grade>, RepositoryError>;
    fn soft_delete_grade(&self, id: &GradeId, at: NaiveDateTime) -> Result<(), RepositoryError>;
    fn restore_grade(&self, id: &GradeId) -> Result<(), RepositoryError>;
    fn grades_for_evaluation(
        &self,
        evaluation_id: &EvaluationId,
        include_removed: bool,
    ) -> Result<Vec<Grade>, RepositoryError>;
    /// Active grades only.
    fn grades_for_student(&self, student_id: &StudentId) -> Result<Vec<Grade>, RepositoryError>;
}

/// Storage for recurring timetable slots.
pub trait ScheduleRepository: Send + Sync {
    fn insert_slot(&self, slot: ScheduleSlot) -> Result<ScheduleSlot, RepositoryError>;
    fn update_slot(&self, slot: ScheduleSlot) -> Result<(), RepositoryError>;
    fn fetch_slot(&self, id: &SlotId) -> Result<Option<ScheduleSlot>, RepositoryError>;
    fn delete_slot(&self, id: &SlotId) -> Result<(), RepositoryError>;
    fn slots(&self, filter: &SlotFilter) -> Result<Vec<ScheduleSlot>, RepositoryError>;
}

pub trait EnrollmentDirectory: Send + Sync {
    fn is_enrolled(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<bool, RepositoryError>;

    fn enrolled_students(
        &self,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<Vec<StudentId>, RepositoryError>;
}

pub trait TeacherAssignmentRegistry: Send + Sync {
    fn is_assigned(
        &self,
        teacher_id: &TeacherId,
        subject_id: &SubjectId,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<bool, RepositoryError>;
}

pub trait SubjectCatalog: Send + Sync {
    /// `None` when the catalog has no coefficient for the subject.
    fn coefficient_of(&self, subject_id: &SubjectId) -> Result<Option<f64>, RepositoryError>;
}

/// Everything the engine needs from the surrounding platform, in one backend.
pub trait GradingBackend:
    EvaluationRepository
    + GradeRepository
    + ScheduleRepository
    + EnrollmentDirectory
    + TeacherAssignmentRegistry
    + SubjectCatalog
    + 'static
{
}

impl<T> GradingBackend for T where
    T: EvaluationRepository
        + GradeRepository
        + ScheduleRepository
        + EnrollmentDirectory
        + TeacherAssignmentRegistry
        + SubjectCatalog
        + 'static
{
}
