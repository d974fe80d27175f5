use chrono::Weekday;

use super::common::*;
use crate::grading::domain::{SlotId, TeacherId};
use crate::grading::error::{BusinessRuleViolation, ConflictReason, ErrorKind, GradingError};

#[test]
fn overlapping_teacher_slot_is_rejected() {
    let (_, gradebook) = gradebook();
    let timetable = gradebook.timetable();
    let first = timetable
        .create_slot(monday_slot(MATH_TEACHER, "6A", time(8, 0), time(9, 0)), &staff())
        .expect("first slot");

    match timetable.create_slot(monday_slot(MATH_TEACHER, "5B", time(8, 30), time(9, 30)), &staff()) {
        Err(GradingError::Rule(BusinessRuleViolation::TimetableConflict { conflicting, reason })) => {
            assert_eq!(conflicting, first.id);
            assert_eq!(reason, ConflictReason::Teacher);
        }
        other => panic!("expected timetable conflict, got {other:?}"),
    }
}

#[test]
fn adjacent_slots_do_not_conflict() {
    let (_, gradebook) = gradebook();
    let timetable = gradebook.timetable();
    timetable
        .create_slot(monday_slot(MATH_TEACHER, "6A", time(8, 0), time(9, 0)), &staff())
        .expect("first slot");
    timetable
        .create_slot(monday_slot(MATH_TEACHER, "6A", time(9, 0), time(10, 0)), &staff())
        .expect("back to back");
}

#[test]
fn class_cannot_hold_two_lessons_at_once() {
    let (_, gradebook) = gradebook();
    let timetable = gradebook.timetable();
    timetable
        .create_slot(monday_slot(MATH_TEACHER, "6A", time(8, 0), time(9, 0)), &staff())
        .expect("first slot");

    let err = timetable
        .create_slot(monday_slot(FRENCH_TEACHER, "6A", time(8, 15), time(8, 45)), &staff())
        .expect_err("class busy");
    assert!(matches!(
        err,
        GradingError::Rule(BusinessRuleViolation::TimetableConflict {
            reason: ConflictReason::Class,
            ..
        })
    ));

    // Other days and other classes are independent.
    let mut tuesday = monday_slot(FRENCH_TEACHER, "6A", time(8, 15), time(8, 45));
    tuesday.day_of_week = Weekday::Tue;
    timetable.create_slot(tuesday, &staff()).expect("tuesday");
    timetable
        .create_slot(monday_slot(FRENCH_TEACHER, "5B", time(8, 15), time(8, 45)), &staff())
        .expect("other class");
}

#[test]
fn inverted_or_empty_interval_is_invalid() {
    let (_, gradebook) = gradebook();
    for (start, end) in [(time(10, 0), time(9, 0)), (time(9, 0), time(9, 0))] {
        let err = gradebook
            .timetable()
            .create_slot(monday_slot(MATH_TEACHER, "6A", start, end), &staff())
            .expect_err("bad interval");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[test]
fn update_ignores_the_slot_being_moved() {
    let (_, gradebook) = gradebook();
    let timetable = gradebook.timetable();
    let slot = timetable
        .create_slot(monday_slot(MATH_TEACHER, "6A", time(8, 0), time(9, 0)), &staff())
        .expect("slot");

    let moved = timetable
        .update_slot(
            &slot.id,
            monday_slot(MATH_TEACHER, "6A", time(8, 30), time(9, 30)),
            &staff(),
        )
        .expect("shifted onto its own old interval");
    assert_eq!(moved.id, slot.id);
    assert_eq!(moved.start_time, time(8, 30));

    let err = timetable
        .update_slot(
            &SlotId::new("slot-missing"),
            monday_slot(MATH_TEACHER, "6A", time(14, 0), time(15, 0)),
            &staff(),
        )
        .expect_err("unknown slot");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn weekly_views_are_sorted_by_day_then_time() {
    let (_, gradebook) = gradebook();
    let timetable = gradebook.timetable();

    let mut friday = monday_slot(MATH_TEACHER, "6A", time(8, 0), time(9, 0));
    friday.day_of_week = Weekday::Fri;
    timetable.create_slot(friday, &staff()).expect("friday");
    timetable
        .create_slot(monday_slot(MATH_TEACHER, "6A", time(14, 0), time(15, 0)), &staff())
        .expect("monday afternoon");
    let morning = timetable
        .create_slot(monday_slot(MATH_TEACHER, "5B", time(8, 0), time(9, 0)), &staff())
        .expect("monday morning");

    let week = timetable
        .weekly_for_teacher(&TeacherId::new(MATH_TEACHER), &year())
        .expect("teacher week");
    let order: Vec<(Weekday, _)> = week
        .iter()
        .map(|slot| (slot.day_of_week, slot.start_time))
        .collect();
    assert_eq!(
        order,
        vec![
            (Weekday::Mon, time(8, 0)),
            (Weekday::Mon, time(14, 0)),
            (Weekday::Fri, time(8, 0)),
        ]
    );

    assert_eq!(
        timetable
            .weekly_for_class(&class(), &year())
            .expect("class week")
            .len(),
        2
    );

    timetable.delete_slot(&morning.id, &staff()).expect("deleted");
    assert_eq!(
        timetable
            .weekly_for_teacher(&TeacherId::new(MATH_TEACHER), &year())
            .expect("teacher week")
            .len(),
        2
    );
}
