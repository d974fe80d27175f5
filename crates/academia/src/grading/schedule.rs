//! Conflict detection for one-off evaluations and the recurring weekly timetable.
//!
//! Evaluations collide on calendar date alone. Timetable slots collide on overlapping time
//! intervals within the same weekday.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::info;

use super::domain::{
    AcademicYearId, ClassId, Evaluation, EvaluationId, EvaluationStatus, Principal, ScheduleSlot,
    SlotDraft, SlotId, TeacherId,
};
use super::error::{BusinessRuleViolation, ConflictReason, GradingError, ValidationError};
use super::repository::{ScheduleRepository, SlotFilter};

/// Half-open overlap: sharing a boundary is not a conflict.
pub fn intervals_overlap(
    start_a: NaiveTime,
    end_a: NaiveTime,
    start_b: NaiveTime,
    end_b: NaiveTime,
) -> bool {
    start_a < end_b && end_a > start_b
}

/// Existing slot that a candidate collides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConflict<'a> {
    pub existing: &'a ScheduleSlot,
    pub reason: ConflictReason,
}

/// Stateless predicates shared by the evaluation registry and the timetable.
pub struct ScheduleConflictDetector;

impl ScheduleConflictDetector {
    /// First non-cancelled evaluation of `teacher_id` on `date`, ignoring `exclude`.
    pub fn evaluation_conflict<'a, I>(
        teacher_id: &TeacherId,
        date: NaiveDate,
        exclude: Option<&EvaluationId>,
        existing: I,
    ) -> Option<&'a Evaluation>
    where
        I: IntoIterator<Item = &'a Evaluation>,
    {
        existing.into_iter().find(|evaluation| {
            evaluation.teacher_id == *teacher_id
                && evaluation.evaluation_date == date
                && evaluation.status != EvaluationStatus::Cancelled
                && exclude.map_or(true, |id| *id != evaluation.id)
        })
    }

    /// First existing slot sharing the candidate's teacher or class on an overlapping interval.
    pub fn slot_conflict<'a, I>(candidate: &ScheduleSlot, existing: I) -> Option<SlotConflict<'a>>
    where
        I: IntoIterator<Item = &'a ScheduleSlot>,
    {
        existing
            .into_iter()
            .filter(|slot| {
                slot.id != candidate.id
                    && slot.academic_year_id == candidate.academic_year_id
                    && slot.day_of_week == candidate.day_of_week
                    && intervals_overlap(
                        candidate.start_time,
                        candidate.end_time,
                        slot.start_time,
                        slot.end_time,
                    )
            })
            .find_map(|slot| {
                let reason = if slot.teacher_id == candidate.teacher_id {
                    ConflictReason::Teacher
                } else if slot.class_id == candidate.class_id {
                    ConflictReason::Class
                } else {
                    return None;
                };
                Some(SlotConflict {
                    existing: slot,
                    reason,
                })
            })
    }
}

static SLOT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_slot_id() -> SlotId {
    let id = SLOT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SlotId(format!("slot-{id:06}"))
}

/// Weekly timetable that refuses overlapping slots before they are stored.
pub struct Timetable<S> {
    slots: Arc<S>,
}

impl<S> Timetable<S>
where
    S: ScheduleRepository + 'static,
{
    pub fn new(slots: Arc<S>) -> Self {
        Self { slots }
    }

    pub fn create_slot(
        &self,
        draft: SlotDraft,
        principal: &Principal,
    ) -> Result<ScheduleSlot, GradingError> {
        validate_times(draft.start_time, draft.end_time)?;
        let candidate = ScheduleSlot::from_draft(next_slot_id(), draft);
        self.ensure_free(&candidate)?;

        let stored = self.slots.insert_slot(candidate)?;
        info!(
            slot = %stored.id,
            teacher = %stored.teacher_id,
            class = %stored.class_id,
            by = %principal.user_id,
            "timetable slot created"
        );
        Ok(stored)
    }

    pub fn update_slot(
        &self,
        id: &SlotId,
        draft: SlotDraft,
        principal: &Principal,
    ) -> Result<ScheduleSlot, GradingError> {
        if self.slots.fetch_slot(id)?.is_none() {
            return Err(GradingError::not_found("slot", id));
        }
        validate_times(draft.start_time, draft.end_time)?;
        let candidate = ScheduleSlot::from_draft(id.clone(), draft);
        self.ensure_free(&candidate)?;

        self.slots.update_slot(candidate.clone())?;
        info!(slot = %id, by = %principal.user_id, "timetable slot updated");
        Ok(candidate)
    }

    pub fn delete_slot(&self, id: &SlotId, principal: &Principal) -> Result<(), GradingError> {
        if self.slots.fetch_slot(id)?.is_none() {
            return Err(GradingError::not_found("slot", id));
        }
        self.slots.delete_slot(id)?;
        info!(slot = %id, by = %principal.user_id, "timetable slot deleted");
        Ok(())
    }

    pub fn weekly_for_class(
        &self,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<Vec<ScheduleSlot>, GradingError> {
        self.weekly(SlotFilter {
            class_id: Some(class_id.clone()),
            academic_year_id: Some(academic_year_id.clone()),
            ..SlotFilter::default()
        })
    }

    pub fn weekly_for_teacher(
        &self,
        teacher_id: &TeacherId,
        academic_year_id: &AcademicYearId,
    ) -> Result<Vec<ScheduleSlot>, GradingError> {
        self.weekly(SlotFilter {
            teacher_id: Some(teacher_id.clone()),
            academic_year_id: Some(academic_year_id.clone()),
            ..SlotFilter::default()
        })
    }

    fn weekly(&self, filter: SlotFilter) -> Result<Vec<ScheduleSlot>, GradingError> {
        let mut slots = self.slots.slots(&filter)?;
        slots.sort_by(|a, b| {
            a.day_of_week
                .num_days_from_monday()
                .cmp(&b.day_of_week.num_days_from_monday())
                .then(a.start_time.cmp(&b.start_time))
        });
        Ok(slots)
    }

    fn ensure_free(&self, candidate: &ScheduleSlot) -> Result<(), GradingError> {
        let same_day = self.slots.slots(&SlotFilter {
            academic_year_id: Some(candidate.academic_year_id.clone()),
            day_of_week: Some(candidate.day_of_week),
            ..SlotFilter::default()
        })?;

        match ScheduleConflictDetector::slot_conflict(candidate, &same_day) {
            Some(conflict) => Err(BusinessRuleViolation::TimetableConflict {
                conflicting: conflict.existing.id.clone(),
                reason: conflict.reason,
            }
            .into()),
            None => Ok(()),
        }
    }
}

fn validate_times(start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    if start < end {
        Ok(())
    } else {
        Err(ValidationError::InvalidTimeRange { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn slot(id: &str, teacher: &str, class: &str, start: NaiveTime, end: NaiveTime) -> ScheduleSlot {
        ScheduleSlot {
            id: SlotId::new(id),
            class_id: ClassId::new(class),
            subject_id: crate::grading::domain::SubjectId::new("math"),
            teacher_id: TeacherId::new(teacher),
            academic_year_id: AcademicYearId::new("2025-2026"),
            day_of_week: Weekday::Mon,
            start_time: start,
            end_time: end,
            room: None,
        }
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(intervals_overlap(time(8, 30), time(9, 30), time(8, 0), time(9, 0)));
        assert!(!intervals_overlap(time(9, 0), time(10, 0), time(8, 0), time(9, 0)));
        assert!(!intervals_overlap(time(7, 0), time(8, 0), time(8, 0), time(9, 0)));
        // containment in either direction
        assert!(intervals_overlap(time(7, 0), time(10, 0), time(8, 0), time(9, 0)));
        assert!(intervals_overlap(time(8, 15), time(8, 45), time(8, 0), time(9, 0)));
    }

    #[test]
    fn slot_conflict_reports_teacher_before_class() {
        let existing = vec![slot("a", "t-1", "6A", time(8, 0), time(9, 0))];
        let candidate = slot("b", "t-1", "6A", time(8, 30), time(9, 30));

        let conflict = ScheduleConflictDetector::slot_conflict(&candidate, &existing)
            .expect("overlap detected");
        assert_eq!(conflict.reason, ConflictReason::Teacher);
        assert_eq!(conflict.existing.id, SlotId::new("a"));
    }

    #[test]
    fn unrelated_slots_never_conflict() {
        let existing = vec![slot("a", "t-1", "6A", time(8, 0), time(9, 0))];
        let candidate = slot("b", "t-2", "6B", time(8, 0), time(9, 0));
        assert!(ScheduleConflictDetector::slot_conflict(&candidate, &existing).is_none());
    }

    #[test]
    fn slot_never_conflicts_with_itself() {
        let existing = vec![slot("a", "t-1", "6A", time(8, 0), time(9, 0))];
        let candidate = slot("a", "t-1", "6A", time(8, 0), time(9, 30));
        assert!(ScheduleConflictDetector::slot_conflict(&candidate, &existing).is_none());
    }
}
