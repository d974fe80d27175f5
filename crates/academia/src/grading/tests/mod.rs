mod common;
mod timetable;
