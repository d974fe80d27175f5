//! Two-level weighted averaging.
//!
//! Step 1 weights each normalised score by its evaluation coefficient inside a subject and
//! rounds to two decimals. Step 2 weights those rounded subject averages by the subject's
//! catalog coefficient and rounds again. Official report cards are reproduced only when the
//! rounding happens at both levels, so the two steps must stay separate.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{Evaluation, Grade, Period, SubjectId};
use super::repository::SubjectCatalog;

pub const DEFAULT_GRADING_SCALE: f64 = 20.0;
const DEFAULT_SUBJECT_COEFFICIENT: f64 = 1.0;

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A grade paired with the evaluation it was recorded against.
#[derive(Debug, Clone, Copy)]
pub struct Assessment<'a> {
    pub evaluation: &'a Evaluation,
    pub grade: &'a Grade,
}

impl<'a> Assessment<'a> {
    pub fn new(evaluation: &'a Evaluation, grade: &'a Grade) -> Self {
        Self { evaluation, grade }
    }

    /// Normalised score when this assessment may enter an average.
    fn eligible_score(&self, period: Option<&Period>, scale: f64) -> Option<f64> {
        if self.grade.is_absent || self.grade.is_removed() {
            return None;
        }
        if !self.evaluation.counts_toward_averages() {
            return None;
        }
        if let Some(period) = period {
            if !period.contains(self.evaluation.evaluation_date) {
                return None;
            }
        }
        let score = self.grade.score?;
        Some(score * scale / self.evaluation.maximum_score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject_id: SubjectId,
    pub average: f64,
    pub total_weight: u64,
    pub grade_count: usize,
}

/// A subject's share of the general average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectContribution {
    pub subject_id: SubjectId,
    pub average: f64,
    pub coefficient: f64,
    pub points: f64,
    /// The catalog had no usable coefficient and the default was applied.
    pub defaulted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralAverage {
    pub value: f64,
    pub total_coefficient: f64,
    pub contributions: Vec<SubjectContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAverages {
    pub subject_averages: Vec<SubjectAverage>,
    pub general_average: Option<GeneralAverage>,
}

impl StudentAverages {
    pub fn general_value(&self) -> Option<f64> {
        self.general_average.as_ref().map(|general| general.value)
    }
}

#[derive(Default)]
struct Accumulator {
    weighted: f64,
    // Widened so that summing large per-grade overrides cannot overflow.
    weight: u64,
    count: usize,
}

/// Computes subject and general averages from a student's grades. Always recomputes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AverageCalculator {
    grading_scale: f64,
}

impl Default for AverageCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_GRADING_SCALE)
    }
}

impl AverageCalculator {
    pub fn new(grading_scale: f64) -> Self {
        let grading_scale = if grading_scale.is_finite() && grading_scale > 0.0 {
            grading_scale
        } else {
            DEFAULT_GRADING_SCALE
        };
        Self { grading_scale }
    }

    pub fn grading_scale(&self) -> f64 {
        self.grading_scale
    }

    /// Step 1. Subjects without an eligible grade are left out entirely.
    pub fn subject_averages(
        &self,
        assessments: &[Assessment<'_>],
        period: Option<&Period>,
    ) -> Vec<SubjectAverage> {
        let mut by_subject: BTreeMap<&SubjectId, Accumulator> = BTreeMap::new();

        for assessment in assessments {
            let Some(score) = assessment.eligible_score(period, self.grading_scale) else {
                continue;
            };
            let weight = assessment.grade.effective_coefficient(assessment.evaluation);
            let entry = by_subject
                .entry(&assessment.evaluation.subject_id)
                .or_default();
            entry.weighted += score * f64::from(weight);
            entry.weight += u64::from(weight);
            entry.count += 1;
        }

        by_subject
            .into_iter()
            .filter(|(_, acc)| acc.weight > 0)
            .map(|(subject_id, acc)| SubjectAverage {
                subject_id: subject_id.clone(),
                average: round2(acc.weighted / acc.weight as f64),
                total_weight: acc.weight,
                grade_count: acc.count,
            })
            .collect()
    }

    /// Step 2. A missing or unusable catalog coefficient degrades to 1 for that subject only.
    pub fn general_average<C>(
        &self,
        subject_averages: &[SubjectAverage],
        catalog: &C,
    ) -> Option<GeneralAverage>
    where
        C: SubjectCatalog + ?Sized,
    {
        if subject_averages.is_empty() {
            return None;
        }

        let contributions: Vec<SubjectContribution> = subject_averages
            .iter()
            .map(|subject| {
                let (coefficient, defaulted) = subject_coefficient(catalog, &subject.subject_id);
                SubjectContribution {
                    subject_id: subject.subject_id.clone(),
                    average: subject.average,
                    coefficient,
                    points: subject.average * coefficient,
                    defaulted,
                }
            })
            .collect();

        let total_coefficient: f64 = contributions.iter().map(|c| c.coefficient).sum();
        let points: f64 = contributions.iter().map(|c| c.points).sum();
        let value = round2(points / total_coefficient);
        debug!(value, total_coefficient, subjects = contributions.len(), "general average computed");

        Some(GeneralAverage {
            value,
            total_coefficient,
            contributions,
        })
    }

    /// Both steps for one student.
    pub fn compute<C>(
        &self,
        assessments: &[Assessment<'_>],
        period: Option<&Period>,
        catalog: &C,
    ) -> StudentAverages
    where
        C: SubjectCatalog + ?Sized,
    {
        let subject_averages = self.subject_averages(assessments, period);
        let general_average = self.general_average(&subject_averages, catalog);
        StudentAverages {
            subject_averages,
            general_average,
        }
    }
}

fn subject_coefficient<C>(catalog: &C, subject_id: &SubjectId) -> (f64, bool)
where
    C: SubjectCatalog + ?Sized,
{
    match catalog.coefficient_of(subject_id) {
        Ok(Some(coefficient)) if coefficient.is_finite() && coefficient > 0.0 => {
            (coefficient, false)
        }
        Ok(other) => {
            warn!(subject = %subject_id, coefficient = ?other, "subject coefficient unavailable, defaulting to 1");
            (DEFAULT_SUBJECT_COEFFICIENT, true)
        }
        Err(err) => {
            warn!(subject = %subject_id, error = %err, "subject catalog lookup failed, defaulting to 1");
            (DEFAULT_SUBJECT_COEFFICIENT, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::domain::{
        AcademicYearId, ClassId, EvaluationId, EvaluationKind, EvaluationStatus, GradeId,
        StudentId, TeacherId,
    };
    use crate::grading::repository::RepositoryError;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct Catalog(HashMap<&'static str, f64>);

    impl SubjectCatalog for Catalog {
        fn coefficient_of(&self, subject_id: &SubjectId) -> Result<Option<f64>, RepositoryError> {
            Ok(self.0.get(subject_id.as_str()).copied())
        }
    }

    struct BrokenCatalog;

    impl SubjectCatalog for BrokenCatalog {
        fn coefficient_of(&self, _: &SubjectId) -> Result<Option<f64>, RepositoryError> {
            Err(RepositoryError::Unavailable("catalog offline".to_string()))
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).expect("valid date")
    }

    fn evaluation(id: &str, subject: &str, coefficient: u32, maximum: f64, day: u32) -> Evaluation {
        Evaluation {
            id: EvaluationId::new(id),
            code: id.to_uppercase(),
            title: format!("{subject} {id}"),
            subject_id: SubjectId::new(subject),
            class_id: ClassId::new("6A"),
            teacher_id: TeacherId::new("t-1"),
            academic_year_id: AcademicYearId::new("2025-2026"),
            period: "T1".to_string(),
            kind: EvaluationKind::Test,
            coefficient,
            minimum_score: 0.0,
            maximum_score: maximum,
            evaluation_date: date(day),
            status: EvaluationStatus::Completed,
            description: None,
        }
    }

    fn grade(evaluation: &Evaluation, score: Option<f64>, absent: bool) -> Grade {
        Grade {
            id: GradeId::new(format!("g-{}", evaluation.id)),
            evaluation_id: evaluation.id.clone(),
            student_id: StudentId::new("stu-1"),
            score,
            coefficient: None,
            is_absent: absent,
            comment: None,
            recorded_by: "t-1".to_string(),
            recorded_at: date(1).and_hms_opt(8, 0, 0).expect("valid time"),
            removed_at: None,
        }
    }

    #[test]
    fn weights_scores_by_evaluation_coefficient() {
        let first = evaluation("e1", "math", 1, 20.0, 2);
        let second = evaluation("e2", "math", 2, 20.0, 3);
        let grades = [grade(&first, Some(14.0), false), grade(&second, Some(16.0), false)];
        let assessments = [
            Assessment::new(&first, &grades[0]),
            Assessment::new(&second, &grades[1]),
        ];

        let subjects = AverageCalculator::default().subject_averages(&assessments, None);
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].average, 15.33);
        assert_eq!(subjects[0].total_weight, 3);
    }

    #[test]
    fn single_subject_general_equals_subject_average() {
        let ds = evaluation("ds", "french", 1, 20.0, 2);
        let composition = evaluation("compo", "french", 2, 20.0, 9);
        let grades = [grade(&ds, Some(15.0), false), grade(&composition, Some(12.0), false)];
        let assessments = [
            Assessment::new(&ds, &grades[0]),
            Assessment::new(&composition, &grades[1]),
        ];
        let catalog = Catalog(HashMap::from([("french", 5.0)]));

        let averages = AverageCalculator::default().compute(&assessments, None, &catalog);
        assert_eq!(averages.subject_averages[0].average, 13.0);
        assert_eq!(averages.general_value(), Some(13.0));
    }

    #[test]
    fn normalises_scores_before_weighting_subjects() {
        let quiz = evaluation("quiz", "math", 1, 10.0, 2);
        let exam = evaluation("exam", "math", 1, 100.0, 3);
        let dictation = evaluation("dict", "french", 1, 20.0, 4);
        let grades = [
            grade(&quiz, Some(8.0), false),
            grade(&exam, Some(75.0), false),
            grade(&dictation, Some(14.0), false),
        ];
        let assessments = [
            Assessment::new(&quiz, &grades[0]),
            Assessment::new(&exam, &grades[1]),
            Assessment::new(&dictation, &grades[2]),
        ];
        let catalog = Catalog(HashMap::from([("math", 4.0), ("french", 5.0)]));

        let averages = AverageCalculator::default().compute(&assessments, None, &catalog);
        let general = averages.general_average.expect("general average");
        assert_eq!(general.value, 14.67);
        assert_eq!(general.total_coefficient, 9.0);
        let math = general
            .contributions
            .iter()
            .find(|c| c.subject_id.as_str() == "math")
            .expect("math counted");
        assert_eq!(math.average, 15.5);
        assert_eq!(math.points, 62.0);
    }

    #[test]
    fn absences_never_enter_either_level() {
        let present = evaluation("e1", "math", 1, 20.0, 2);
        let missed = evaluation("e2", "math", 3, 20.0, 3);
        let history_missed = evaluation("e3", "history", 2, 20.0, 4);
        let grades = [
            grade(&present, Some(12.0), false),
            // a stored score alongside the absence flag is still ignored
            grade(&missed, Some(2.0), true),
            grade(&history_missed, None, true),
        ];
        let assessments = [
            Assessment::new(&present, &grades[0]),
            Assessment::new(&missed, &grades[1]),
            Assessment::new(&history_missed, &grades[2]),
        ];
        let catalog = Catalog(HashMap::from([("math", 4.0), ("history", 2.0)]));

        let averages = AverageCalculator::default().compute(&assessments, None, &catalog);
        assert_eq!(averages.subject_averages.len(), 1);
        assert_eq!(averages.subject_averages[0].average, 12.0);
        assert_eq!(averages.subject_averages[0].grade_count, 1);
        let general = averages.general_average.expect("general");
        assert_eq!(general.total_coefficient, 4.0);
        assert_eq!(general.value, 12.0);
    }

    #[test]
    fn cancelled_and_out_of_period_evaluations_are_skipped() {
        let inside = evaluation("e1", "math", 1, 20.0, 5);
        let outside = evaluation("e2", "math", 1, 20.0, 25);
        let mut cancelled = evaluation("e3", "math", 1, 20.0, 6);
        cancelled.status = EvaluationStatus::Cancelled;
        let grades = [
            grade(&inside, Some(10.0), false),
            grade(&outside, Some(20.0), false),
            grade(&cancelled, Some(0.0), false),
        ];
        let assessments = [
            Assessment::new(&inside, &grades[0]),
            Assessment::new(&outside, &grades[1]),
            Assessment::new(&cancelled, &grades[2]),
        ];
        let period = Period::new("first half", date(1), date(15));

        let subjects = AverageCalculator::default().subject_averages(&assessments, Some(&period));
        assert_eq!(subjects[0].average, 10.0);
        assert_eq!(subjects[0].grade_count, 1);
    }

    #[test]
    fn missing_subject_coefficient_defaults_to_one() {
        let math = evaluation("e1", "math", 1, 20.0, 2);
        let art = evaluation("e2", "art", 1, 20.0, 3);
        let grades = [grade(&math, Some(10.0), false), grade(&art, Some(16.0), false)];
        let assessments = [
            Assessment::new(&math, &grades[0]),
            Assessment::new(&art, &grades[1]),
        ];
        let catalog = Catalog(HashMap::from([("math", 3.0)]));

        let general = AverageCalculator::default()
            .compute(&assessments, None, &catalog)
            .general_average
            .expect("general");
        assert_eq!(general.total_coefficient, 4.0);
        assert_eq!(general.value, 11.5);
        assert!(general.contributions.iter().any(|c| c.defaulted));

        let degraded = AverageCalculator::default()
            .compute(&assessments, None, &BrokenCatalog)
            .general_average
            .expect("catalog failure does not abort");
        assert_eq!(degraded.value, 13.0);
    }

    #[test]
    fn rounds_each_level_separately() {
        // Math is 32/3 = 10.666.. and is rounded to 10.67 before step 2.
        // Carrying the unrounded value through would give 10.44 instead of 10.45.
        let a = evaluation("e1", "math", 1, 20.0, 2);
        let b = evaluation("e2", "math", 2, 20.0, 3);
        let c = evaluation("e3", "physics", 1, 20.0, 4);
        let grades = [
            grade(&a, Some(10.0), false),
            grade(&b, Some(11.0), false),
            grade(&c, Some(10.0), false),
        ];
        let assessments = [
            Assessment::new(&a, &grades[0]),
            Assessment::new(&b, &grades[1]),
            Assessment::new(&c, &grades[2]),
        ];
        let catalog = Catalog(HashMap::from([("math", 2.0), ("physics", 1.0)]));

        let averages = AverageCalculator::default().compute(&assessments, None, &catalog);
        let math = averages
            .subject_averages
            .iter()
            .find(|subject| subject.subject_id.as_str() == "math")
            .expect("math average");
        assert_eq!(math.average, 10.67);
        assert_eq!(averages.general_value(), Some(10.45));
    }

    #[test]
    fn huge_coefficient_overrides_do_not_overflow_the_weight() {
        let heavy = evaluation("e1", "math", 1, 20.0, 2);
        let light = evaluation("e2", "math", 1, 20.0, 3);
        let mut weighted = grade(&heavy, Some(20.0), false);
        weighted.coefficient = Some(u32::MAX);
        let grades = [weighted, grade(&light, Some(10.0), false)];
        let assessments = [
            Assessment::new(&heavy, &grades[0]),
            Assessment::new(&light, &grades[1]),
        ];

        let subjects = AverageCalculator::default().subject_averages(&assessments, None);
        assert_eq!(subjects[0].total_weight, u64::from(u32::MAX) + 1);
        assert_eq!(subjects[0].average, 20.0);
    }

    #[test]
    fn no_eligible_grades_yields_no_general_average() {
        let missed = evaluation("e1", "math", 1, 20.0, 2);
        let grades = [grade(&missed, None, true)];
        let assessments = [Assessment::new(&missed, &grades[0])];
        let averages =
            AverageCalculator::default().compute(&assessments, None, &Catalog(HashMap::new()));
        assert!(averages.subject_averages.is_empty());
        assert!(averages.general_average.is_none());
    }
}
