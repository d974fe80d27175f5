use std::sync::Arc;

use academia::grading::{
    AcademicYearId, AverageCalculator, ClassId, EvaluationDraft, EvaluationKind, GradeEntry,
    GradeSheetImporter, Gradebook, InMemoryGradebook, Period, Principal, PrincipalRole, StudentId,
    SubjectId, TeacherId,
};
use chrono::NaiveDate;

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).expect("valid date")
}

fn setup() -> Gradebook<InMemoryGradebook> {
    let backend = Arc::new(InMemoryGradebook::default());
    let class = ClassId::new("4B");
    let year = AcademicYearId::new("2025-2026");
    for student in ["ada", "blaise", "emmy"] {
        backend
            .enroll(StudentId::new(student), class.clone(), year.clone())
            .expect("enrolled");
    }
    backend
        .assign(
            TeacherId::new("t-history"),
            SubjectId::new("history"),
            class,
            year,
        )
        .expect("assigned");
    Gradebook::new(backend, AverageCalculator::default())
}

fn history(date: NaiveDate, kind: EvaluationKind, coefficient: u32) -> EvaluationDraft {
    EvaluationDraft {
        code: None,
        title: format!("History {kind}"),
        subject_id: SubjectId::new("history"),
        class_id: ClassId::new("4B"),
        teacher_id: TeacherId::new("t-history"),
        academic_year_id: AcademicYearId::new("2025-2026"),
        period: "T1".to_string(),
        kind,
        coefficient,
        minimum_score: 0.0,
        maximum_score: 20.0,
        evaluation_date: date,
        description: None,
    }
}

#[test]
fn single_subject_term_matches_hand_computed_average() {
    let gradebook = setup();
    let registrar = Principal::new("registrar", PrincipalRole::Staff);

    let ds = gradebook
        .evaluations()
        .create(history(day(10, 2), EvaluationKind::Test, 1), &registrar)
        .expect("test planned");
    let composition = gradebook
        .evaluations()
        .create(history(day(11, 14), EvaluationKind::Exam, 2), &registrar)
        .expect("exam planned");

    for evaluation in [&ds, &composition] {
        gradebook
            .evaluations()
            .start(&evaluation.id, &registrar)
            .expect("started");
    }

    let sheet = "student_id,score,absent,coefficient,comment\n\
                 ada,15,,,\n\
                 blaise,11,,,\n\
                 emmy,,abs,,\n";
    let entries = GradeSheetImporter::from_reader(sheet.as_bytes()).expect("sheet parses");
    gradebook
        .grades()
        .bulk_record(&ds.id, entries, &registrar)
        .expect("test graded");
    gradebook
        .grades()
        .bulk_record(
            &composition.id,
            vec![
                GradeEntry::scored(StudentId::new("ada"), 12.0),
                GradeEntry::scored(StudentId::new("blaise"), 14.0),
                GradeEntry::scored(StudentId::new("emmy"), 16.0),
            ],
            &registrar,
        )
        .expect("exam graded");

    for evaluation in [&ds, &composition] {
        gradebook
            .evaluations()
            .complete(&evaluation.id, &registrar)
            .expect("completed");
    }

    let term = Period::new("T1", day(9, 1), day(12, 19));
    let class = ClassId::new("4B");
    let year = AcademicYearId::new("2025-2026");

    let card = gradebook
        .reports()
        .report_card(&StudentId::new("ada"), &class, &year, Some(&term))
        .expect("report card");
    assert_eq!(card.subject_averages.len(), 1);
    assert_eq!(card.subject_averages[0].average, 13.0);
    // A lone subject with no catalog coefficient still yields its own average.
    assert_eq!(card.general_average, Some(13.0));

    let report = gradebook
        .reports()
        .class_ranking(&class, &year, Some(&term))
        .expect("ranking");
    let order: Vec<(&str, usize)> = report
        .ranking
        .iter()
        .map(|entry| (entry.student_id.as_str(), entry.rank))
        .collect();
    // emmy: absent on the test, 16 on the exam. ada and blaise both land on 13.00.
    assert_eq!(order, vec![("emmy", 1), ("ada", 2), ("blaise", 2)]);
    assert_eq!(report.ranking[0].general_average, 16.0);
    assert!(!report.ranking[1].is_ex_aequo);
    assert!(report.ranking[2].is_ex_aequo);
    assert_eq!(report.statistics.cohort_average, Some(14.0));
}
