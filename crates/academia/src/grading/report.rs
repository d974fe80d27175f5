use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::averages::{Assessment, AverageCalculator, StudentAverages, SubjectAverage};
use super::domain::{AcademicYearId, ClassId, Evaluation, EvaluationId, Grade, Period, StudentId};
use super::error::{GradingError, ValidationError};
use super::ranking::{ClassRanking, ClassStatistics, RankedStudent, RankingEngine};
use super::repository::{
    EnrollmentDirectory, EvaluationFilter, EvaluationRepository, GradeRepository, SubjectCatalog,
};

/// Read model handed to report rendering; consumers must not re-derive these figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReportCard {
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub academic_year_id: AcademicYearId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub subject_averages: Vec<SubjectAverage>,
    pub general_average: Option<f64>,
    pub rank: Option<usize>,
    pub is_ex_aequo: bool,
    pub class_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub class_id: ClassId,
    pub academic_year_id: AcademicYearId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub ranking: Vec<RankedStudent>,
    pub statistics: ClassStatistics,
    /// Enrolled students without any gradeable result in scope.
    pub unranked: Vec<StudentId>,
}

/// Composes averages and rankings from current grade state on every call.
pub struct ReportCardService<R> {
    backend: Arc<R>,
    calculator: AverageCalculator,
}

impl<R> ReportCardService<R>
where
    R: EvaluationRepository + GradeRepository + EnrollmentDirectory + SubjectCatalog + 'static,
{
    pub fn new(backend: Arc<R>, calculator: AverageCalculator) -> Self {
        Self {
            backend,
            calculator,
        }
    }

    pub fn student_averages(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
        period: Option<&Period>,
    ) -> Result<StudentAverages, GradingError> {
        check_period(period)?;
        let evaluations = self.class_evaluations(class_id, academic_year_id)?;
        self.averages_for(student_id, &evaluations, period)
    }

    pub fn class_ranking(
        &self,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
        period: Option<&Period>,
    ) -> Result<ClassReport, GradingError> {
        check_period(period)?;
        let (ranking, unranked) = self.rank_class(class_id, academic_year_id, period)?;
        Ok(ClassReport {
            class_id: class_id.clone(),
            academic_year_id: academic_year_id.clone(),
            period: period.map(|p| p.label.clone()),
            ranking: ranking.entries,
            statistics: ranking.statistics,
            unranked,
        })
    }

    pub fn report_card(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
        period: Option<&Period>,
    ) -> Result<StudentReportCard, GradingError> {
        check_period(period)?;
        if !self
            .backend
            .is_enrolled(student_id, class_id, academic_year_id)?
        {
            return Err(GradingError::not_found("enrollment", student_id));
        }

        let evaluations = self.class_evaluations(class_id, academic_year_id)?;
        let averages = self.averages_for(student_id, &evaluations, period)?;
        let (ranking, _) = self.rank_class(class_id, academic_year_id, period)?;
        let placement = ranking.position_of(student_id);

        Ok(StudentReportCard {
            student_id: student_id.clone(),
            class_id: class_id.clone(),
            academic_year_id: academic_year_id.clone(),
            period: period.map(|p| p.label.clone()),
            general_average: averages.general_value(),
            subject_averages: averages.subject_averages,
            rank: placement.map(|entry| entry.rank),
            is_ex_aequo: placement.map_or(false, |entry| entry.is_ex_aequo),
            class_size: ranking.statistics.ranked_count,
        })
    }

    fn rank_class(
        &self,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
        period: Option<&Period>,
    ) -> Result<(ClassRanking, Vec<StudentId>), GradingError> {
        let evaluations = self.class_evaluations(class_id, academic_year_id)?;
        let mut students = self.backend.enrolled_students(class_id, academic_year_id)?;
        students.sort();

        let mut cohort = Vec::with_capacity(students.len());
        let mut unranked = Vec::new();
        for student_id in students {
            let averages = self.averages_for(&student_id, &evaluations, period)?;
            match averages.general_value() {
                Some(value) => cohort.push((student_id, value)),
                None => unranked.push(student_id),
            }
        }

        Ok((RankingEngine::rank(cohort), unranked))
    }

    fn class_evaluations(
        &self,
        class_id: &ClassId,
        academic_year_id: &AcademicYearId,
    ) -> Result<HashMap<EvaluationId, Evaluation>, GradingError> {
        let filter = EvaluationFilter::for_class(class_id.clone(), academic_year_id.clone());
        Ok(self
            .backend
            .evaluations(&filter)?
            .into_iter()
            .map(|evaluation| (evaluation.id.clone(), evaluation))
            .collect())
    }

    fn averages_for(
        &self,
        student_id: &StudentId,
        evaluations: &HashMap<EvaluationId, Evaluation>,
        period: Option<&Period>,
    ) -> Result<StudentAverages, GradingError> {
        let grades: Vec<Grade> = self.backend.grades_for_student(student_id)?;
        let assessments: Vec<Assessment<'_>> = grades
            .iter()
            .filter_map(|grade| {
                evaluations
                    .get(&grade.evaluation_id)
                    .map(|evaluation| Assessment::new(evaluation, grade))
            })
            .collect();

        Ok(self
            .calculator
            .compute(&assessments, period, self.backend.as_ref()))
    }
}

fn check_period(period: Option<&Period>) -> Result<(), ValidationError> {
    match period {
        Some(period) if period.start_date > period.end_date => {
            Err(ValidationError::InvertedPeriod {
                start: period.start_date,
                end: period.end_date,
            })
        }
        _ => Ok(()),
    }
}
