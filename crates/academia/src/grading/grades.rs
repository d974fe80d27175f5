use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::info;

use super::domain::{
    Evaluation, EvaluationId, EvaluationStatus, Grade, GradeEntry, GradeId, GradeUpdate,
    Principal, StudentId,
};
use super::error::{BusinessRuleViolation, GradingError, ValidationError};
use super::repository::{EnrollmentDirectory, EvaluationRepository, GradeRepository, RepositoryError};

static GRADE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_grade_id() -> GradeId {
    let id = GRADE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    GradeId(format!("grade-{id:06}"))
}

/// Bounds check applied to a submitted score. Absence waives the score entirely.
pub fn validate_score(
    evaluation: &Evaluation,
    score: Option<f64>,
    is_absent: bool,
    coefficient: Option<u32>,
) -> Result<(), ValidationError> {
    if coefficient == Some(0) {
        return Err(ValidationError::InvalidCoefficient(0));
    }
    if is_absent {
        return Ok(());
    }

    let score = score.ok_or(ValidationError::MissingScore)?;
    if evaluation.accepts_score(score) {
        Ok(())
    } else {
        Err(ValidationError::ScoreOutOfBounds {
            score,
            minimum: evaluation.minimum_score,
            maximum: evaluation.maximum_score,
        })
    }
}

/// One writer per evaluation: validation and persistence run under the same lock.
///
/// Shared by the evaluation registry and the grade store so that deleting an evaluation
/// and writing grades against it never interleave.
#[derive(Default)]
pub struct EvaluationLocks {
    locks: Mutex<HashMap<EvaluationId, Arc<Mutex<()>>>>,
}

impl EvaluationLocks {
    pub(crate) fn handle(&self, id: &EvaluationId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        Ok(self.table()?.entry(id.clone()).or_default().clone())
    }

    /// Drop the entry of an evaluation that no longer exists.
    pub(crate) fn release(&self, id: &EvaluationId) -> Result<(), RepositoryError> {
        self.table()?.remove(id);
        Ok(())
    }

    fn table(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<EvaluationId, Arc<Mutex<()>>>>, RepositoryError> {
        self.locks
            .lock()
            .map_err(|_| RepositoryError::Unavailable("evaluation lock table poisoned".into()))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().map(|table| table.len()).unwrap_or_default()
    }
}

pub(crate) fn poisoned<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("evaluation write lock poisoned".into())
}

/// Validates and records grades against their evaluation and the enrollment directory.
pub struct GradeStore<E, G, D> {
    evaluations: Arc<E>,
    grades: Arc<G>,
    enrollment: Arc<D>,
    locks: Arc<EvaluationLocks>,
}

impl<E, G, D> GradeStore<E, G, D>
where
    E: EvaluationRepository + 'static,
    G: GradeRepository + 'static,
    D: EnrollmentDirectory + 'static,
{
    pub fn new(
        evaluations: Arc<E>,
        grades: Arc<G>,
        enrollment: Arc<D>,
        locks: Arc<EvaluationLocks>,
    ) -> Self {
        Self {
            evaluations,
            grades,
            enrollment,
            locks,
        }
    }

    /// Record a single grade.
    pub fn record(
        &self,
        evaluation_id: &EvaluationId,
        entry: GradeEntry,
        principal: &Principal,
    ) -> Result<Grade, GradingError> {
        let lock = self.locks.handle(evaluation_id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let evaluation = self.open_evaluation(evaluation_id)?;
        let recorded = self.recorded_students(evaluation_id)?;
        self.check_entry(&evaluation, &entry, &recorded)?;

        let grade = new_grade(&evaluation, entry, principal);
        let mut stored = self.grades.insert_grades(vec![grade])?;
        let grade = stored
            .pop()
            .ok_or_else(|| RepositoryError::Unavailable("grade insert returned nothing".into()))?;

        info!(
            grade = %grade.id,
            evaluation = %evaluation.id,
            student = %grade.student_id,
            absent = grade.is_absent,
            by = %principal.user_id,
            "grade recorded"
        );
        Ok(grade)
    }

    /// Record a whole grade sheet. Any rejected entry voids the batch.
    pub fn bulk_record(
        &self,
        evaluation_id: &EvaluationId,
        entries: Vec<GradeEntry>,
        principal: &Principal,
    ) -> Result<Vec<Grade>, GradingError> {
        let lock = self.locks.handle(evaluation_id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let evaluation = self.open_evaluation(evaluation_id)?;
        let mut recorded = self.recorded_students(evaluation_id)?;

        for (position, entry) in entries.iter().enumerate() {
            self.check_entry(&evaluation, entry, &recorded)
                .map_err(|source| GradingError::BatchRejected {
                    position,
                    student_id: entry.student_id.clone(),
                    source: Box::new(source),
                })?;
            // Duplicates inside the sheet itself count too.
            recorded.insert(entry.student_id.clone());
        }

        let grades = entries
            .into_iter()
            .map(|entry| new_grade(&evaluation, entry, principal))
            .collect();
        let stored = self.grades.insert_grades(grades)?;

        info!(
            evaluation = %evaluation.id,
            count = stored.len(),
            by = %principal.user_id,
            "grade sheet recorded"
        );
        Ok(stored)
    }

    /// Replace the outcome of an active grade.
    pub fn update(
        &self,
        grade_id: &GradeId,
        update: GradeUpdate,
        principal: &Principal,
    ) -> Result<Grade, GradingError> {
        let current = self.active_grade(grade_id)?;
        let lock = self.locks.handle(&current.evaluation_id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let current = self.active_grade(grade_id)?;
        let evaluation = self.open_evaluation(&current.evaluation_id)?;
        validate_score(&evaluation, update.score, update.is_absent, update.coefficient)?;

        let grade = Grade {
            score: update.score,
            is_absent: update.is_absent,
            coefficient: update.coefficient,
            comment: update.comment,
            recorded_by: principal.user_id.clone(),
            recorded_at: Utc::now().naive_utc(),
            ..current
        };
        self.grades.update_grade(grade.clone())?;
        info!(grade = %grade.id, by = %principal.user_id, "grade updated");
        Ok(grade)
    }

    /// Tombstone a grade; it stops counting but can be restored.
    pub fn delete(&self, grade_id: &GradeId, principal: &Principal) -> Result<(), GradingError> {
        let current = self.active_grade(grade_id)?;
        let lock = self.locks.handle(&current.evaluation_id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let grade = self.active_grade(grade_id)?;
        self.grades
            .soft_delete_grade(&grade.id, Utc::now().naive_utc())?;
        info!(grade = %grade.id, by = %principal.user_id, "grade removed");
        Ok(())
    }

    /// Bring a tombstoned grade back. Its score must still fit the evaluation's bounds.
    pub fn restore(&self, grade_id: &GradeId, principal: &Principal) -> Result<Grade, GradingError> {
        if !principal.is_privileged() {
            return Err(BusinessRuleViolation::Forbidden {
                action: "restoring a grade",
            }
            .into());
        }

        let current = self.stored_grade(grade_id)?;
        let lock = self.locks.handle(&current.evaluation_id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let mut grade = self.stored_grade(grade_id)?;
        if !grade.is_removed() {
            return Ok(grade);
        }

        let evaluation = self
            .evaluations
            .fetch_evaluation(&grade.evaluation_id)?
            .ok_or_else(|| GradingError::not_found("evaluation", &grade.evaluation_id))?;
        validate_score(&evaluation, grade.score, grade.is_absent, grade.coefficient)?;

        self.grades.restore_grade(grade_id)?;
        grade.removed_at = None;
        info!(grade = %grade.id, by = %principal.user_id, "grade restored");
        Ok(grade)
    }

    /// Active grades of one evaluation, ordered by student.
    pub fn grades_for_evaluation(
        &self,
        evaluation_id: &EvaluationId,
    ) -> Result<Vec<Grade>, GradingError> {
        if self.evaluations.fetch_evaluation(evaluation_id)?.is_none() {
            return Err(GradingError::not_found("evaluation", evaluation_id));
        }
        let mut grades = self.grades.grades_for_evaluation(evaluation_id, false)?;
        grades.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(grades)
    }

    fn open_evaluation(&self, id: &EvaluationId) -> Result<Evaluation, GradingError> {
        let evaluation = self
            .evaluations
            .fetch_evaluation(id)?
            .ok_or_else(|| GradingError::not_found("evaluation", id))?;
        if evaluation.status == EvaluationStatus::Cancelled {
            return Err(BusinessRuleViolation::EvaluationCancelled(evaluation.id).into());
        }
        Ok(evaluation)
    }

    fn stored_grade(&self, id: &GradeId) -> Result<Grade, GradingError> {
        self.grades
            .fetch_grade(id)?
            .ok_or_else(|| GradingError::not_found("grade", id))
    }

    fn active_grade(&self, id: &GradeId) -> Result<Grade, GradingError> {
        self.grades
            .fetch_grade(id)?
            .filter(|grade| !grade.is_removed())
            .ok_or_else(|| GradingError::not_found("grade", id))
    }

    /// Students holding a grade for the evaluation, tombstoned ones included.
    fn recorded_students(&self, id: &EvaluationId) -> Result<HashSet<StudentId>, GradingError> {
        Ok(self
            .grades
            .grades_for_evaluation(id, true)?
            .into_iter()
            .map(|grade| grade.student_id)
            .collect())
    }

    fn check_entry(
        &self,
        evaluation: &Evaluation,
        entry: &GradeEntry,
        recorded: &HashSet<StudentId>,
    ) -> Result<(), GradingError> {
        if recorded.contains(&entry.student_id) {
            return Err(BusinessRuleViolation::DuplicateGrade {
                student_id: entry.student_id.clone(),
                evaluation_id: evaluation.id.clone(),
            }
            .into());
        }

        let enrolled = self.enrollment.is_enrolled(
            &entry.student_id,
            &evaluation.class_id,
            &evaluation.academic_year_id,
        )?;
        if !enrolled {
            return Err(BusinessRuleViolation::NotEnrolled {
                student_id: entry.student_id.clone(),
                class_id: evaluation.class_id.clone(),
                academic_year_id: evaluation.academic_year_id.clone(),
            }
            .into());
        }

        validate_score(evaluation, entry.score, entry.is_absent, entry.coefficient)?;
        Ok(())
    }
}

fn new_grade(evaluation: &Evaluation, entry: GradeEntry, principal: &Principal) -> Grade {
    Grade {
        id: next_grade_id(),
        evaluation_id: evaluation.id.clone(),
        student_id: entry.student_id,
        score: entry.score,
        coefficient: entry.coefficient,
        is_absent: entry.is_absent,
        comment: entry.comment,
        recorded_by: principal.user_id.clone(),
        recorded_at: Utc::now().naive_utc(),
        removed_at: None,
    }
}
