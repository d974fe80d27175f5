use chrono::NaiveDate;
use chrono::NaiveTime;
use serde::Serialize;

use super::domain::{
    AcademicYearId, ClassId, EvaluationAction, EvaluationId, EvaluationStatus, SlotId, StudentId,
    SubjectId, TeacherId,
};
use super::repository::RepositoryError;

/// Malformed input or out-of-range values, rejected before touching storage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("minimum score {minimum} exceeds maximum score {maximum}")]
    InvertedScoreBounds { minimum: f64, maximum: f64 },
    #[error("maximum score must be positive, found {0}")]
    NonPositiveMaximum(f64),
    #[error("minimum score cannot be negative, found {0}")]
    NegativeMinimum(f64),
    #[error("coefficient must be at least 1, found {0}")]
    InvalidCoefficient(u32),
    #[error("score {score} outside the allowed range [{minimum}, {maximum}]")]
    ScoreOutOfBounds {
        score: f64,
        minimum: f64,
        maximum: f64,
    },
    #[error("a score is required unless the student is marked absent")]
    MissingScore,
    #[error("slot start {start} must be before its end {end}")]
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },
    #[error("period start {start} is after its end {end}")]
    InvertedPeriod { start: NaiveDate, end: NaiveDate },
    #[error("{0} must not be blank")]
    Blank(&'static str),
}

impl ValidationError {
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::InvertedScoreBounds { .. } => "inverted_score_bounds",
            Self::NonPositiveMaximum(_) => "non_positive_maximum",
            Self::NegativeMinimum(_) => "negative_minimum",
            Self::InvalidCoefficient(_) => "invalid_coefficient",
            Self::ScoreOutOfBounds { .. } => "score_out_of_bounds",
            Self::MissingScore => "missing_score",
            Self::InvalidTimeRange { .. } => "invalid_time_range",
            Self::InvertedPeriod { .. } => "inverted_period",
            Self::Blank(_) => "blank_field",
        }
    }
}

/// Which shared resource made two timetable slots collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    Teacher,
    Class,
}

impl ConflictReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Class => "class",
        }
    }
}

/// Domain rules that reject an otherwise well-formed request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusinessRuleViolation {
    #[error("student {student_id} already has a grade for evaluation {evaluation_id}")]
    DuplicateGrade {
        student_id: StudentId,
        evaluation_id: EvaluationId,
    },
    #[error("student {student_id} is not enrolled in class {class_id} for {academic_year_id}")]
    NotEnrolled {
        student_id: StudentId,
        class_id: ClassId,
        academic_year_id: AcademicYearId,
    },
    #[error(
        "teacher {teacher_id} is not assigned to subject {subject_id} in class {class_id} for {academic_year_id}"
    )]
    NotAssigned {
        teacher_id: TeacherId,
        subject_id: SubjectId,
        class_id: ClassId,
        academic_year_id: AcademicYearId,
    },
    #[error("teacher {teacher_id} already has evaluation {conflicting} on {date}")]
    ScheduleConflict {
        teacher_id: TeacherId,
        date: NaiveDate,
        conflicting: EvaluationId,
    },
    #[error("slot overlaps slot {conflicting} for the same {}", .reason.label())]
    TimetableConflict {
        conflicting: SlotId,
        reason: ConflictReason,
    },
    #[error("cannot {action} an evaluation that is {from}")]
    InvalidTransition {
        from: EvaluationStatus,
        action: EvaluationAction,
    },
    #[error("evaluation {0} is cancelled")]
    EvaluationCancelled(EvaluationId),
    #[error("evaluation {id} is {status} and can no longer be edited")]
    EvaluationLocked {
        id: EvaluationId,
        status: EvaluationStatus,
    },
    #[error("evaluation {id} still has {count} recorded grade(s)")]
    EvaluationHasGrades { id: EvaluationId, count: usize },
    #[error("evaluation {id} already has grades; its {field} cannot change")]
    GradedEvaluationMoved { id: EvaluationId, field: &'static str },
    #[error("{action} requires an administrator")]
    Forbidden { action: &'static str },
}

impl BusinessRuleViolation {
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::DuplicateGrade { .. } => "duplicate_grade",
            Self::NotEnrolled { .. } => "not_enrolled",
            Self::NotAssigned { .. } => "not_assigned",
            Self::ScheduleConflict { .. } => "schedule_conflict",
            Self::TimetableConflict { .. } => "timetable_conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::EvaluationCancelled(_) => "evaluation_cancelled",
            Self::EvaluationLocked { .. } => "evaluation_locked",
            Self::EvaluationHasGrades { .. } => "evaluation_has_grades",
            Self::GradedEvaluationMoved { .. } => "graded_evaluation_moved",
            Self::Forbidden { .. } => "forbidden",
        }
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    NotFound,
    Infrastructure,
}

/// Error raised by every grading operation.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Rule(#[from] BusinessRuleViolation),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("batch entry {position} for student {student_id} rejected: {source}")]
    BatchRejected {
        position: usize,
        student_id: StudentId,
        source: Box<GradingError>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl GradingError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Rule(_) => ErrorKind::BusinessRule,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BatchRejected { source, .. } => source.kind(),
            Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Repository(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.reason_code(),
            Self::Rule(violation) => violation.reason_code(),
            Self::NotFound { .. } => "not_found",
            Self::BatchRejected { source, .. } => source.reason_code(),
            Self::Repository(_) => "repository_failure",
        }
    }

    /// Innermost business rule violation, looking through batch wrappers.
    pub fn violation(&self) -> Option<&BusinessRuleViolation> {
        match self {
            Self::Rule(violation) => Some(violation),
            Self::BatchRejected { source, .. } => source.violation(),
            _ => None,
        }
    }

    /// Innermost validation failure, looking through batch wrappers.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            Self::BatchRejected { source, .. } => source.validation(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_rejection_reports_inner_kind() {
        let inner = GradingError::Rule(BusinessRuleViolation::DuplicateGrade {
            student_id: StudentId::new("stu-1"),
            evaluation_id: EvaluationId::new("eval-1"),
        });
        let wrapped = GradingError::BatchRejected {
            position: 2,
            student_id: StudentId::new("stu-1"),
            source: Box::new(inner),
        };

        assert_eq!(wrapped.kind(), ErrorKind::BusinessRule);
        assert_eq!(wrapped.reason_code(), "duplicate_grade");
        assert!(wrapped.to_string().contains("batch entry 2"));
    }

    #[test]
    fn repository_not_found_maps_to_not_found_kind() {
        let err = GradingError::from(RepositoryError::NotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = GradingError::from(RepositoryError::Unavailable("down".to_string()));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
