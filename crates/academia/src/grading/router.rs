use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    AcademicYearId, ClassId, EvaluationDraft, EvaluationId, EvaluationStatus, GradeEntry, Period,
    Principal, PrincipalRole, SlotDraft, StudentId, SubjectId, TeacherId,
};
use super::error::{ErrorKind, GradingError};
use super::repository::{EvaluationFilter, GradingBackend};
use super::Gradebook;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";

/// Router builder exposing evaluation, grading, timetable, and report endpoints.
pub fn grading_router<R>(gradebook: Arc<Gradebook<R>>) -> Router
where
    R: GradingBackend,
{
    Router::new()
        .route(
            "/api/v1/evaluations",
            post(create_evaluation_handler::<R>).get(list_evaluations_handler::<R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/start",
            post(start_handler::<R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/complete",
            post(complete_handler::<R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/cancel",
            post(cancel_handler::<R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/grades",
            post(record_grades_handler::<R>).get(evaluation_grades_handler::<R>),
        )
        .route("/api/v1/timetable/slots", post(create_slot_handler::<R>))
        .route(
            "/api/v1/classes/:class_id/ranking",
            get(class_ranking_handler::<R>),
        )
        .route(
            "/api/v1/students/:student_id/report-card",
            get(report_card_handler::<R>),
        )
        .with_state(gradebook)
}

/// Maps an engine failure onto an HTTP status with a stable reason code.
pub fn error_response(error: GradingError) -> Response {
    let kind = error.kind();
    let reason = error.reason_code();
    let status = match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::BusinessRule if reason == "forbidden" => StatusCode::FORBIDDEN,
        ErrorKind::BusinessRule => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
        "kind": kind,
        "reason": reason,
    });
    (status, Json(payload)).into_response()
}

fn unauthorized() -> Response {
    let payload = json!({ "error": "missing x-principal-id header" });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn unprocessable(detail: &str) -> Response {
    let payload = json!({ "error": detail, "kind": ErrorKind::Validation });
    (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
}

/// Caller identity forwarded by the authentication layer in front of this service.
pub(crate) fn principal_from(headers: &HeaderMap) -> Option<Principal> {
    let user_id = headers
        .get(PRINCIPAL_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .to_string();
    if user_id.is_empty() {
        return None;
    }

    let role = match headers
        .get(PRINCIPAL_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("teacher") => PrincipalRole::Teacher,
        Some("admin") | Some("administrator") => PrincipalRole::Administrator,
        _ => PrincipalRole::Staff,
    };

    Some(Principal::new(user_id, role))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EvaluationQuery {
    class_id: Option<String>,
    teacher_id: Option<String>,
    subject_id: Option<String>,
    academic_year_id: Option<String>,
    status: Option<EvaluationStatus>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl From<EvaluationQuery> for EvaluationFilter {
    fn from(query: EvaluationQuery) -> Self {
        Self {
            class_id: query.class_id.map(ClassId),
            teacher_id: query.teacher_id.map(TeacherId),
            subject_id: query.subject_id.map(SubjectId),
            academic_year_id: query.academic_year_id.map(AcademicYearId),
            status: query.status,
            from_date: query.from,
            to_date: query.to,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportQuery {
    academic_year_id: String,
    #[serde(default)]
    class_id: Option<String>,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    start: Option<NaiveDate>,
    #[serde(default)]
    end: Option<NaiveDate>,
}

impl ReportQuery {
    fn period(&self) -> Result<Option<Period>, &'static str> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                let label = self
                    .period
                    .clone()
                    .unwrap_or_else(|| format!("{start}..{end}"));
                Ok(Some(Period::new(label, start, end)))
            }
            (None, None) => Ok(None),
            _ => Err("a period needs both start and end dates"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GradeSheetPayload {
    entries: Vec<GradeEntry>,
}

pub(crate) async fn create_evaluation_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    headers: HeaderMap,
    Json(draft): Json<EvaluationDraft>,
) -> Response {
    let Some(principal) = principal_from(&headers) else {
        return unauthorized();
    };
    match gradebook.evaluations().create(draft, &principal) {
        Ok(evaluation) => (StatusCode::CREATED, Json(evaluation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_evaluations_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    Query(query): Query<EvaluationQuery>,
) -> Response {
    match gradebook.evaluations().list(&query.into()) {
        Ok(evaluations) => (StatusCode::OK, Json(evaluations)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn start_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    headers: HeaderMap,
    Path(evaluation_id): Path<String>,
) -> Response {
    let Some(principal) = principal_from(&headers) else {
        return unauthorized();
    };
    let id = EvaluationId(evaluation_id);
    transition_response(gradebook.evaluations().start(&id, &principal))
}

pub(crate) async fn complete_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    headers: HeaderMap,
    Path(evaluation_id): Path<String>,
) -> Response {
    let Some(principal) = principal_from(&headers) else {
        return unauthorized();
    };
    let id = EvaluationId(evaluation_id);
    transition_response(gradebook.evaluations().complete(&id, &principal))
}

pub(crate) async fn cancel_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    headers: HeaderMap,
    Path(evaluation_id): Path<String>,
) -> Response {
    let Some(principal) = principal_from(&headers) else {
        return unauthorized();
    };
    let id = EvaluationId(evaluation_id);
    transition_response(gradebook.evaluations().cancel(&id, &principal))
}

fn transition_response(
    outcome: Result<super::domain::Evaluation, GradingError>,
) -> Response {
    match outcome {
        Ok(evaluation) => (StatusCode::OK, Json(evaluation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn record_grades_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    headers: HeaderMap,
    Path(evaluation_id): Path<String>,
    Json(payload): Json<GradeSheetPayload>,
) -> Response {
    let Some(principal) = principal_from(&headers) else {
        return unauthorized();
    };
    let id = EvaluationId(evaluation_id);
    match gradebook
        .grades()
        .bulk_record(&id, payload.entries, &principal)
    {
        Ok(grades) => (StatusCode::CREATED, Json(grades)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn evaluation_grades_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    Path(evaluation_id): Path<String>,
) -> Response {
    let id = EvaluationId(evaluation_id);
    match gradebook.grades().grades_for_evaluation(&id) {
        Ok(grades) => (StatusCode::OK, Json(grades)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_slot_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    headers: HeaderMap,
    Json(draft): Json<SlotDraft>,
) -> Response {
    let Some(principal) = principal_from(&headers) else {
        return unauthorized();
    };
    match gradebook.timetable().create_slot(draft, &principal) {
        Ok(slot) => (StatusCode::CREATED, Json(slot)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn class_ranking_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    Path(class_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let period = match query.period() {
        Ok(period) => period,
        Err(detail) => return unprocessable(detail),
    };
    let class_id = ClassId(class_id);
    let year = AcademicYearId(query.academic_year_id);
    match gradebook
        .reports()
        .class_ranking(&class_id, &year, period.as_ref())
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn report_card_handler<R: GradingBackend>(
    State(gradebook): State<Arc<Gradebook<R>>>,
    Path(student_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let period = match query.period() {
        Ok(period) => period,
        Err(detail) => return unprocessable(detail),
    };
    let Some(class_id) = query.class_id.clone() else {
        return unprocessable("class_id is required");
    };
    let student_id = StudentId(student_id);
    let class_id = ClassId(class_id);
    let year = AcademicYearId(query.academic_year_id);
    match gradebook
        .reports()
        .report_card(&student_id, &class_id, &year, period.as_ref())
    {
        Ok(card) => (StatusCode::OK, Json(card)).into_response(),
        Err(error) => error_response(error),
    }
}
