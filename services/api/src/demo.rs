use crate::infra::{parse_date, sample_class, sample_year, seed_roster, SAMPLE_STUDENTS};
use academia::config::AppConfig;
use academia::error::AppError;
use academia::grading::{
    AverageCalculator, ClassReport, EvaluationDraft, EvaluationKind, GradeEntry,
    GradeSheetImporter, Gradebook, InMemoryGradebook, Period, Principal, PrincipalRole, StudentId,
    StudentReportCard, SubjectId, TeacherId,
};
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// First day of the reporting period (YYYY-MM-DD). Defaults to 2025-09-01.
    #[arg(long, value_parser = parse_date)]
    pub(crate) period_start: Option<NaiveDate>,
    /// Last day of the reporting period (YYYY-MM-DD). Defaults to 2025-12-19.
    #[arg(long, value_parser = parse_date)]
    pub(crate) period_end: Option<NaiveDate>,
    /// CSV grade sheet (student_id,score,absent,coefficient,comment) for the math quiz
    #[arg(long)]
    pub(crate) grade_sheet: Option<PathBuf>,
    /// Print the per-subject breakdown for every student
    #[arg(long)]
    pub(crate) show_subjects: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let backend = Arc::new(InMemoryGradebook::default());
    seed_roster(&backend)?;
    let gradebook = Gradebook::new(
        backend,
        AverageCalculator::new(config.grading.grading_scale),
    );
    let registrar = Principal::new("demo-registrar", PrincipalRole::Staff);

    let start = args.period_start.unwrap_or_else(|| demo_date(9, 1));
    let end = args.period_end.unwrap_or_else(|| demo_date(12, 19));
    let period = Period::new("Term 1", start, end);

    let quiz = gradebook.evaluations().create(
        draft("math", "t-math", "Fractions quiz", EvaluationKind::Quiz, 10.0, demo_date(10, 6)),
        &registrar,
    )?;
    let exam = gradebook.evaluations().create(
        draft("math", "t-math", "Midterm exam", EvaluationKind::Exam, 100.0, demo_date(11, 17)),
        &registrar,
    )?;
    let dictation = gradebook.evaluations().create(
        draft("french", "t-french", "Dictation", EvaluationKind::Test, 20.0, demo_date(10, 9)),
        &registrar,
    )?;

    let quiz_sheet = match args.grade_sheet {
        Some(path) => GradeSheetImporter::from_path(path)?,
        None => scored(&[("amina", 8.0), ("bruno", 8.0), ("chloe", 5.5)]),
    };
    gradebook
        .grades()
        .bulk_record(&quiz.id, quiz_sheet, &registrar)?;
    gradebook.grades().bulk_record(
        &exam.id,
        scored(&[("amina", 75.0), ("bruno", 75.0), ("chloe", 62.0)]),
        &registrar,
    )?;
    let mut dictation_sheet = scored(&[("amina", 14.0), ("bruno", 14.0)]);
    dictation_sheet.push(GradeEntry::absent(StudentId::new("chloe")));
    gradebook
        .grades()
        .bulk_record(&dictation.id, dictation_sheet, &registrar)?;

    for evaluation in [&quiz, &exam, &dictation] {
        gradebook.evaluations().start(&evaluation.id, &registrar)?;
        gradebook.evaluations().complete(&evaluation.id, &registrar)?;
    }

    println!("Academia gradebook demo");
    println!(
        "Class {} ({}), period {} to {}, scores normalised to /{}",
        sample_class(),
        sample_year(),
        start,
        end,
        config.grading.grading_scale
    );

    let report = gradebook
        .reports()
        .class_ranking(&sample_class(), &sample_year(), Some(&period))?;
    render_ranking(&report);

    println!("\nReport cards");
    for student in SAMPLE_STUDENTS {
        let card = gradebook.reports().report_card(
            &StudentId::new(student),
            &sample_class(),
            &sample_year(),
            Some(&period),
        )?;
        render_report_card(&card, args.show_subjects);
    }

    Ok(())
}

fn demo_date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap_or_default()
}

fn draft(
    subject: &str,
    teacher: &str,
    title: &str,
    kind: EvaluationKind,
    maximum_score: f64,
    evaluation_date: NaiveDate,
) -> EvaluationDraft {
    EvaluationDraft {
        code: None,
        title: title.to_string(),
        subject_id: SubjectId::new(subject),
        class_id: sample_class(),
        teacher_id: TeacherId::new(teacher),
        academic_year_id: sample_year(),
        period: "T1".to_string(),
        kind,
        coefficient: 1,
        minimum_score: 0.0,
        maximum_score,
        evaluation_date,
        description: None,
    }
}

fn scored(scores: &[(&str, f64)]) -> Vec<GradeEntry> {
    scores
        .iter()
        .map(|(student, score)| GradeEntry::scored(StudentId::new(*student), *score))
        .collect()
}

fn render_ranking(report: &ClassReport) {
    println!("\nClass ranking");
    for entry in &report.ranking {
        let marker = if entry.is_ex_aequo { " (ex aequo)" } else { "" };
        println!(
            "  {:>2}. {:<8} {:>6.2}{}",
            entry.rank, entry.student_id, entry.general_average, marker
        );
    }
    if !report.unranked.is_empty() {
        let names: Vec<&str> = report.unranked.iter().map(|id| id.as_str()).collect();
        println!("  Not ranked (no grades in period): {}", names.join(", "));
    }

    let stats = &report.statistics;
    match (stats.cohort_average, stats.top, stats.bottom) {
        (Some(average), Some(top), Some(bottom)) => println!(
            "  Cohort average {average:.2}, top {top:.2}, bottom {bottom:.2} over {} students",
            stats.ranked_count
        ),
        _ => println!("  No student has a general average yet"),
    }
}

fn render_report_card(card: &StudentReportCard, show_subjects: bool) {
    let general = card
        .general_average
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| "n/a".to_string());
    let rank = match card.rank {
        Some(rank) if card.is_ex_aequo => format!("{rank}/{} ex aequo", card.class_size),
        Some(rank) => format!("{rank}/{}", card.class_size),
        None => "unranked".to_string(),
    };
    println!("  {:<8} general {general:>6}  rank {rank}", card.student_id);

    if show_subjects {
        for subject in &card.subject_averages {
            println!(
                "      {:<8} {:>6.2}  ({} grade(s), weight {})",
                subject.subject_id, subject.average, subject.grade_count, subject.total_weight
            );
        }
    }
}
