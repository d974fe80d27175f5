use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier wrapper for scheduled evaluations.
    EvaluationId
);
identifier!(GradeId);
identifier!(StudentId);
identifier!(TeacherId);
identifier!(SubjectId);
identifier!(ClassId);
identifier!(AcademicYearId);
identifier!(
    /// Identifier wrapper for recurring timetable slots.
    SlotId
);

/// Kind of assessment an evaluation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    Continuous,
    Semester,
    Annual,
    Test,
    Exam,
    Quiz,
    Homework,
    Participation,
}

impl EvaluationKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Continuous => "Continuous assessment",
            Self::Semester => "Semester exam",
            Self::Annual => "Annual exam",
            Self::Test => "Test",
            Self::Exam => "Exam",
            Self::Quiz => "Quiz",
            Self::Homework => "Homework",
            Self::Participation => "Participation",
        }
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

impl EvaluationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transition requested on an evaluation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationAction {
    Start,
    Complete,
    Cancel,
}

impl EvaluationAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for EvaluationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Staff-provided fields used to create or update an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDraft {
    #[serde(default)]
    pub code: Option<String>,
    pub title: String,
    pub subject_id: SubjectId,
    pub class_id: ClassId,
    pub teacher_id: TeacherId,
    pub academic_year_id: AcademicYearId,
    pub period: String,
    #[serde(rename = "type")]
    pub kind: EvaluationKind,
    pub coefficient: u32,
    pub minimum_score: f64,
    pub maximum_score: f64,
    pub evaluation_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

/// A single graded assessment event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub code: String,
    pub title: String,
    pub subject_id: SubjectId,
    pub class_id: ClassId,
    pub teacher_id: TeacherId,
    pub academic_year_id: AcademicYearId,
    pub period: String,
    #[serde(rename = "type")]
    pub kind: EvaluationKind,
    pub coefficient: u32,
    pub minimum_score: f64,
    pub maximum_score: f64,
    pub evaluation_date: NaiveDate,
    pub status: EvaluationStatus,
    pub description: Option<String>,
}

impl Evaluation {
    pub(crate) fn from_draft(
        id: EvaluationId,
        code: String,
        status: EvaluationStatus,
        draft: EvaluationDraft,
    ) -> Self {
        Self {
            id,
            code,
            title: draft.title,
            subject_id: draft.subject_id,
            class_id: draft.class_id,
            teacher_id: draft.teacher_id,
            academic_year_id: draft.academic_year_id,
            period: draft.period,
            kind: draft.kind,
            coefficient: draft.coefficient,
            minimum_score: draft.minimum_score,
            maximum_score: draft.maximum_score,
            evaluation_date: draft.evaluation_date,
            status,
            description: draft.description,
        }
    }

    pub fn accepts_score(&self, score: f64) -> bool {
        score >= self.minimum_score && score <= self.maximum_score
    }

    /// Cancelled evaluations keep their grades but never feed an average.
    pub fn counts_toward_averages(&self) -> bool {
        self.status != EvaluationStatus::Cancelled
    }
}

/// One student's submitted outcome for an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub student_id: StudentId,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_absent: bool,
    #[serde(default)]
    pub coefficient: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl GradeEntry {
    pub fn scored(student_id: StudentId, score: f64) -> Self {
        Self {
            student_id,
            score: Some(score),
            is_absent: false,
            coefficient: None,
            comment: None,
        }
    }

    pub fn absent(student_id: StudentId) -> Self {
        Self {
            student_id,
            score: None,
            is_absent: true,
            coefficient: None,
            comment: None,
        }
    }
}

/// Replacement values applied by a grade update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeUpdate {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_absent: bool,
    #[serde(default)]
    pub coefficient: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Recorded grade. Removal is a tombstone so the record can be restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub evaluation_id: EvaluationId,
    pub student_id: StudentId,
    pub score: Option<f64>,
    pub coefficient: Option<u32>,
    pub is_absent: bool,
    pub comment: Option<String>,
    pub recorded_by: String,
    pub recorded_at: NaiveDateTime,
    pub removed_at: Option<NaiveDateTime>,
}

impl Grade {
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Weight of this grade inside its subject average.
    pub fn effective_coefficient(&self, evaluation: &Evaluation) -> u32 {
        self.coefficient.unwrap_or(evaluation.coefficient)
    }
}

/// Catalog entry for a subject and its weight in the general average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub coefficient: f64,
}

/// Inclusive date window scoping a periodic average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Period {
    pub fn new(label: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            label: label.into(),
            start_date,
            end_date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalRole {
    Teacher,
    Staff,
    Administrator,
}

/// Caller on whose behalf a mutating operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: PrincipalRole,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: PrincipalRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == PrincipalRole::Administrator
    }
}

/// Fields describing a recurring weekly timetable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub academic_year_id: AcademicYearId,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: SlotId,
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub academic_year_id: AcademicYearId,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub room: Option<String>,
}

impl ScheduleSlot {
    pub(crate) fn from_draft(id: SlotId, draft: SlotDraft) -> Self {
        Self {
            id,
            class_id: draft.class_id,
            subject_id: draft.subject_id,
            teacher_id: draft.teacher_id,
            academic_year_id: draft.academic_year_id,
            day_of_week: draft.day_of_week,
            start_time: draft.start_time,
            end_time: draft.end_time,
            room: draft.room,
        }
    }
}
