use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;

use super::domain::{
    AcademicYearId, ClassId, Evaluation, EvaluationId, Grade, GradeId, ScheduleSlot, SlotId,
    StudentId, SubjectId, TeacherId,
};
use super::repository::{
    EnrollmentDirectory, EvaluationFilter, EvaluationRepository, GradeRepository,
    RepositoryError, ScheduleRepository, SlotFilter, SubjectCatalog, TeacherAssignmentRegistry,
};

type Enrollment = (StudentId, ClassId, AcademicYearId);
type Assignment = (TeacherId, SubjectId, ClassId, AcademicYearId);

#[derive(Default)]
struct State {
    evaluations: HashMap<EvaluationId, Evaluation>,
    grades: HashMap<GradeId, Grade>,
    slots: HashMap<SlotId, ScheduleSlot>,
    enrollments: HashSet<Enrollment>,
    assignments: HashSet<Assignment>,
    subject_coefficients: HashMap<SubjectId, f64>,
}

/// Process-local backend implementing every port, for the demo server and tests.
#[derive(Default, Clone)]
pub struct InMemoryGradebook {
    state: Arc<Mutex<State>>,
}

impl InMemoryGradebook {
    fn state(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("gradebook mutex poisoned".to_string()))
    }

    pub fn enroll(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        academic_year_id: AcademicYearId,
    ) -> Result<(), RepositoryError> {
        self.state()?
            .enrollments
            .insert((student_id, class_id, academic_year_id));
        Ok(())
    }

    pub fn assign(
        &self,
        teacher_id: TeacherId,
        subject_id: SubjectId,
        class_id: ClassId,
        academic_year_id: AcademicYearId,
    ) -> Result<(), RepositoryError> {
        self.state()?
            .assignments
            .insert((teacher_id, subject_id, class_id, academic_year_id));
        Ok(())
    }

    pub fn set_subject_coefficient(
        &self,
        subject_id: SubjectId,
        coefficient: f64,
    ) -> Result<(), RepositoryError> {
        self.state()?
            .subject_coefficients
            .insert(subject_id, coefficient);
        Ok(())
    }
}

impl EvaluationRepository for InMemoryGradebook {
    fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError> {
        let mut state = self.state()?;
        if state.evaluations.contains_key(&evaluation.id) {
            return Err(RepositoryError::Conflict);
        }
        state
            .evaluations
            .insert(evaluation.id.clone(), evaluation.clone());
        Ok(evaluation)
    }

    fn update_evaluation(&self, evaluation: Evaluation) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.evaluations.get_mut(&evaluation.id) {
            Some(slot) => {
                *slot = evaluation;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_evaluation(&self, id: &EvaluationId) -> Result<Option<Evaluation>, RepositoryError> {
        Ok(self.state()?.evaluations.get(id).cloned())
    }

    fn delete_evaluation(&self, id: &EvaluationId) -> Result<(), RepositoryError> {
        self.state()?
            .evaluations
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn evaluations(&self, filter: &EvaluationFilter) -> Result<Vec<Evaluation>, RepositoryError> {
        Ok(self
            .state()?
            .evaluations
            .values()
            .filter(|evaluation| filter.matches(evaluation))
            .cloned()
            .collect())
    }
}

impl GradeRepository for InMemoryGradebook {
    fn insert_grades(&self, grades: Vec<Grade>) -> Result<Vec<Grade>, RepositoryError> {
        let mut state = self.state()?;
        let mut incoming = HashSet::new();
        for grade in &grades {
            let duplicate_pair = state.grades.values().any(|existing| {
                existing.evaluation_id == grade.evaluation_id
                    && existing.student_id == grade.student_id
            });
            if state.grades.contains_key(&grade.id)
                || duplicate_pair
                || !incoming.insert((&grade.evaluation_id, &grade.student_id))
            {
                return Err(RepositoryError::Conflict);
            }
        }

        for grade in &grades {
            state.grades.insert(grade.id.clone(), grade.clone());
        }
        Ok(grades)
    }

    fn update_grade(&self, grade: Grade) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.grades.get_mut(&grade.id) {
            Some(slot) => {
                *slot = grade;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_grade(&self, id: &GradeId) -> Result<Option<Grade>, RepositoryError> {
        Ok(self.state()?.grades.get(id).cloned())
    }

    fn soft_delete_grade(&self, id: &GradeId, at: NaiveDateTime) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let grade = state.grades.get_mut(id).ok_or(RepositoryError::NotFound)?;
        grade.removed_at = Some(at);
        Ok(())
    }

    fn restore_grade(&self, id: &GradeId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let grade = state.grades.get_mut(id).ok_or(RepositoryError::NotFound)?;
        grade.removed_at = None;
        Ok(())
    }

    fn grades_for_evaluation(
        &self,
        evaluation_id: &EvaluationId,
        include_removed: bool,
    ) -> Result<Vec<Grade>, RepositoryError> {
        Ok(self
            .state()?
            .grades
            .values()
            .filter(|grade| grade.evaluation_id == *evaluation_id)
            .filter(|grade| include_removed || !grade.is_removed())
            .cloned()
            .collect())
    }

    fn grades_for_student(&self, student_id: &StudentId) -> Result<Vec<Grade>, RepositoryError> {
        Ok(self
            .state()?
            .grades
            .values()
            .filter(|grade| grade.student_id == *student_id && !grade.is_removed())
            .cloned()
            .collect())
    }
}

impl ScheduleRepository for InMemoryGradebook {
    fn insert_slot(&self, slot: ScheduleSlot) -> Result<ScheduleSlot, RepositoryError> {
        let mut state = self.state()?;
        if state.slots.contains_key(&slot.id) {
            return Err(RepositoryError::Conflict);
        }
        state.slots.insert(slot.id.clone(), slot.clone());
        Ok(slot)
    }

    fn update_slot(&self, slot: ScheduleSlot) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.slots.get_mut(&slot.id) {
            Some(existing) => {
                *existing = slot;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_slot(&self, id: &SlotId) -> Result<Option<ScheduleSlot>, RepositoryError> {
        Ok(self.state()?.slots.get(id).cloned())
    }

    fn delete_slot(&self, id: &SlotId) -> Result<(), RepositoryError> {
        self.state()?
            .slots
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn slots(&self, filter: &SlotFilter) -> Result<Vec<ScheduleSlot>, RepositoryError> {
        Ok(self
            .state()?
            .slots
            .values()
            .filter(|slot| filter.matches(slot))
            .cloned()
            .collect())
    }
}

impl EnrollmentDirectory for InMemoryGradebook {
    fn is_enrolled(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.state()?.enrollments.contains(&(
            student_id.clone(),
            class_id.clone(),
            academic_year_id.clone(),
        )))
    }

    fn enrolled_students(
        &self,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<Vec<StudentId>, RepositoryError> {
        Ok(self
            .state()?
            .enrollments
            .iter()
            .filter(|(_, class, year)| class == class_id && year == academic_year_id)
            .map(|(student, _, _)| student.clone())
            .collect())
    }
}

impl TeacherAssignmentRegistry for InMemoryGradebook {
    fn is_assigned(
        &self,
        teacher_id: &TeacherId,
        subject_id: &SubjectId,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.state()?.assignments.contains(&(
            teacher_id.clone(),
            subject_id.clone(),
            class_id.clone(),
            academic_year_id.clone(),
        )))
    }
}

impl SubjectCatalog for InMemoryGradebook {
    fn coefficient_of(&self, subject_id: &SubjectId) -> Result<Option<f64>, RepositoryError> {
        Ok(self.state()?.subject_coefficients.get(subject_id).copied())
    }
}
