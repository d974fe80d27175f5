use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::domain::{
    Evaluation, EvaluationAction, EvaluationDraft, EvaluationId, EvaluationStatus, Principal,
};
use super::error::{BusinessRuleViolation, GradingError, ValidationError};
use super::grades::{poisoned, EvaluationLocks};
use super::repository::{
    EvaluationFilter, EvaluationRepository, GradeRepository, TeacherAssignmentRegistry,
};
use super::schedule::ScheduleConflictDetector;

/// Lifecycle table: `planned -> ongoing -> completed`, cancel from either open state.
pub fn transition(
    from: EvaluationStatus,
    action: EvaluationAction,
) -> Result<EvaluationStatus, BusinessRuleViolation> {
    match (from, action) {
        (EvaluationStatus::Planned, EvaluationAction::Start) => Ok(EvaluationStatus::Ongoing),
        (EvaluationStatus::Ongoing, EvaluationAction::Complete) => Ok(EvaluationStatus::Completed),
        (EvaluationStatus::Planned | EvaluationStatus::Ongoing, EvaluationAction::Cancel) => {
            Ok(EvaluationStatus::Cancelled)
        }
        (from, action) => Err(BusinessRuleViolation::InvalidTransition { from, action }),
    }
}

/// Traceability code used when staff do not supply one.
pub fn derive_code(draft: &EvaluationDraft) -> String {
    format!(
        "EVAL-{}-{}-{}-{}",
        draft.subject_id,
        draft.teacher_id,
        draft.academic_year_id,
        draft.evaluation_date.format("%Y%m%d")
    )
    .to_ascii_uppercase()
}

pub fn validate_draft(draft: &EvaluationDraft) -> Result<(), ValidationError> {
    if draft.title.trim().is_empty() {
        return Err(ValidationError::Blank("title"));
    }
    if draft.period.trim().is_empty() {
        return Err(ValidationError::Blank("period"));
    }
    if draft.coefficient == 0 {
        return Err(ValidationError::InvalidCoefficient(draft.coefficient));
    }
    if draft.minimum_score.is_nan() || draft.minimum_score < 0.0 {
        return Err(ValidationError::NegativeMinimum(draft.minimum_score));
    }
    if !(draft.maximum_score.is_finite() && draft.maximum_score > 0.0) {
        return Err(ValidationError::NonPositiveMaximum(draft.maximum_score));
    }
    if draft.minimum_score > draft.maximum_score {
        return Err(ValidationError::InvertedScoreBounds {
            minimum: draft.minimum_score,
            maximum: draft.maximum_score,
        });
    }
    Ok(())
}

static EVALUATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_evaluation_id() -> EvaluationId {
    let id = EVALUATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EvaluationId(format!("eval-{id:06}"))
}

/// Owns evaluation creation, edits, and lifecycle transitions.
pub struct EvaluationRegistry<E, G, A> {
    evaluations: Arc<E>,
    grades: Arc<G>,
    assignments: Arc<A>,
    locks: Arc<EvaluationLocks>,
}

impl<E, G, A> EvaluationRegistry<E, G, A>
where
    E: EvaluationRepository + 'static,
    G: GradeRepository + 'static,
    A: TeacherAssignmentRegistry + 'static,
{
    pub fn new(
        evaluations: Arc<E>,
        grades: Arc<G>,
        assignments: Arc<A>,
        locks: Arc<EvaluationLocks>,
    ) -> Self {
        Self {
            evaluations,
            grades,
            assignments,
            locks,
        }
    }

    /// Validate and persist a new evaluation in the `planned` state.
    pub fn create(
        &self,
        mut draft: EvaluationDraft,
        principal: &Principal,
    ) -> Result<Evaluation, GradingError> {
        self.check(&draft, None)?;

        let code = match draft.code.take() {
            Some(code) if !code.trim().is_empty() => code,
            _ => derive_code(&draft),
        };
        let evaluation =
            Evaluation::from_draft(next_evaluation_id(), code, EvaluationStatus::Planned, draft);

        let stored = self.evaluations.insert_evaluation(evaluation)?;
        info!(
            evaluation = %stored.id,
            code = %stored.code,
            teacher = %stored.teacher_id,
            date = %stored.evaluation_date,
            by = %principal.user_id,
            "evaluation planned"
        );
        Ok(stored)
    }

    /// Re-validate and replace the editable fields of an open evaluation.
    pub fn update(
        &self,
        id: &EvaluationId,
        mut draft: EvaluationDraft,
        principal: &Principal,
    ) -> Result<Evaluation, GradingError> {
        let lock = self.locks.handle(id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let current = self.fetch(id)?;
        if current.status.is_terminal() {
            return Err(BusinessRuleViolation::EvaluationLocked {
                id: current.id,
                status: current.status,
            }
            .into());
        }

        self.check(&draft, Some(id))?;

        // Tombstoned grades count too: a restore must land inside the bounds.
        let recorded = self.grades.grades_for_evaluation(id, true)?;
        if !recorded.is_empty() {
            let moved = if draft.class_id != current.class_id {
                Some("class")
            } else if draft.academic_year_id != current.academic_year_id {
                Some("academic year")
            } else if draft.subject_id != current.subject_id {
                Some("subject")
            } else {
                None
            };
            if let Some(field) = moved {
                return Err(BusinessRuleViolation::GradedEvaluationMoved {
                    id: current.id,
                    field,
                }
                .into());
            }
        }

        for grade in &recorded {
            if grade.is_absent {
                continue;
            }
            if let Some(score) = grade.score {
                if score < draft.minimum_score || score > draft.maximum_score {
                    return Err(ValidationError::ScoreOutOfBounds {
                        score,
                        minimum: draft.minimum_score,
                        maximum: draft.maximum_score,
                    }
                    .into());
                }
            }
        }

        let code = match draft.code.take() {
            Some(code) if !code.trim().is_empty() => code,
            _ => derive_code(&draft),
        };
        let updated = Evaluation::from_draft(current.id, code, current.status, draft);
        self.evaluations.update_evaluation(updated.clone())?;
        info!(evaluation = %updated.id, by = %principal.user_id, "evaluation updated");
        Ok(updated)
    }

    pub fn start(&self, id: &EvaluationId, principal: &Principal) -> Result<Evaluation, GradingError> {
        self.apply(id, EvaluationAction::Start, principal)
    }

    pub fn complete(
        &self,
        id: &EvaluationId,
        principal: &Principal,
    ) -> Result<Evaluation, GradingError> {
        self.apply(id, EvaluationAction::Complete, principal)
    }

    /// Cancelling keeps recorded grades but drops them from every average.
    pub fn cancel(
        &self,
        id: &EvaluationId,
        principal: &Principal,
    ) -> Result<Evaluation, GradingError> {
        self.apply(id, EvaluationAction::Cancel, principal)
    }

    /// Destroy an evaluation that has never received a grade.
    pub fn delete(&self, id: &EvaluationId, principal: &Principal) -> Result<(), GradingError> {
        let lock = self.locks.handle(id)?;
        let writer = lock.lock().map_err(poisoned)?;

        let evaluation = self.fetch(id)?;
        let recorded = self.grades.grades_for_evaluation(id, true)?;
        if !recorded.is_empty() {
            return Err(BusinessRuleViolation::EvaluationHasGrades {
                id: evaluation.id,
                count: recorded.len(),
            }
            .into());
        }

        self.evaluations.delete_evaluation(id)?;
        drop(writer);
        self.locks.release(id)?;
        info!(evaluation = %id, by = %principal.user_id, "evaluation deleted");
        Ok(())
    }

    pub fn get(&self, id: &EvaluationId) -> Result<Evaluation, GradingError> {
        self.fetch(id)
    }

    pub fn list(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>, GradingError> {
        let mut evaluations = self.evaluations.evaluations(filter)?;
        evaluations.sort_by(|a, b| {
            a.evaluation_date
                .cmp(&b.evaluation_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(evaluations)
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &EvaluationLocks {
        &self.locks
    }

    fn fetch(&self, id: &EvaluationId) -> Result<Evaluation, GradingError> {
        self.evaluations
            .fetch_evaluation(id)?
            .ok_or_else(|| GradingError::not_found("evaluation", id))
    }

    fn apply(
        &self,
        id: &EvaluationId,
        action: EvaluationAction,
        principal: &Principal,
    ) -> Result<Evaluation, GradingError> {
        let lock = self.locks.handle(id)?;
        let _writer = lock.lock().map_err(poisoned)?;

        let mut evaluation = self.fetch(id)?;
        let from = evaluation.status;
        evaluation.status = transition(from, action)?;

        self.evaluations.update_evaluation(evaluation.clone())?;
        info!(
            evaluation = %evaluation.id,
            from = %from,
            to = %evaluation.status,
            by = %principal.user_id,
            "evaluation transitioned"
        );
        Ok(evaluation)
    }

    /// Rules shared by create and update; `own_id` is excluded from the conflict search.
    fn check(
        &self,
        draft: &EvaluationDraft,
        own_id: Option<&EvaluationId>,
    ) -> Result<(), GradingError> {
        validate_draft(draft)?;

        let assigned = self.assignments.is_assigned(
            &draft.teacher_id,
            &draft.subject_id,
            &draft.class_id,
            &draft.academic_year_id,
        )?;
        if !assigned {
            return Err(BusinessRuleViolation::NotAssigned {
                teacher_id: draft.teacher_id.clone(),
                subject_id: draft.subject_id.clone(),
                class_id: draft.class_id.clone(),
                academic_year_id: draft.academic_year_id.clone(),
            }
            .into());
        }

        let same_day = self.evaluations.evaluations(&EvaluationFilter::for_teacher_on(
            draft.teacher_id.clone(),
            draft.evaluation_date,
        ))?;
        if let Some(existing) = ScheduleConflictDetector::evaluation_conflict(
            &draft.teacher_id,
            draft.evaluation_date,
            own_id,
            &same_day,
        ) {
            return Err(BusinessRuleViolation::ScheduleConflict {
                teacher_id: draft.teacher_id.clone(),
                date: draft.evaluation_date,
                conflicting: existing.id.clone(),
            }
            .into());
        }

        Ok(())
    }
}
