use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_staff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::repositories::exams::ExamScope;
use crate::schemas::exam::{ExamCreate, ExamResponse};

use super::helpers::{self, ExamView};
use super::queries::{ExamStatusFilter, ListExamsQuery};

pub(super) async fn create_exam(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    require_staff(&user)?;

    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if payload.questions.is_empty() {
        return Err(ApiError::BadRequest(
            "An exam requires at least one question".to_string(),
        ));
    }

    let student_ids =
        repositories::users::list_active_student_ids_in_class(state.db(), &payload.class_name)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to look up students in class"))?;

    tracing::info!(
        class_name = %payload.class_name,
        students = student_ids.len(),
        questions = payload.questions.len(),
        "Creating exam"
    );

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let exam_id = Uuid::new_v4().to_string();
    let exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &payload.title,
            description: payload.description.as_deref(),
            subject: &payload.subject,
            class_name: &payload.class_name,
            duration_minutes: payload.duration_minutes,
            total_points: payload.total_points,
            exam_date: payload.exam_date,
            exam_time: payload.exam_time.as_deref(),
            created_by: &user.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    helpers::insert_questions(&mut tx, &exam.id, &user.id, &payload.questions).await?;

    let assigned = repositories::assignments::create_many(&mut *tx, &exam.id, &student_ids, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to assign exam to students"))?;

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(exam_id = %exam.id, assigned, "Exam created");

    let response = helpers::fetch_exam_response(state.db(), &exam.id, ExamView::Staff)
        .await?
        .ok_or_else(|| {
            ApiError::internal("exam missing after commit", "Failed to fetch created exam")
        })?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub(super) async fn list_exams(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<ListExamsQuery>,
) -> Result<Json<Vec<ExamResponse>>, ApiError> {
    let (scope, view) = match user.role {
        UserRole::Admin => (ExamScope::All, ExamView::Staff),
        UserRole::Teacher => (ExamScope::CreatedBy(&user.id), ExamView::Staff),
        UserRole::Student => (ExamScope::AssignedTo(&user.id), ExamView::Student),
    };
    let upcoming_only = params.status == Some(ExamStatusFilter::Upcoming);

    let rows = repositories::exams::list(state.db(), scope, upcoming_only)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    let mut response = Vec::with_capacity(rows.len());
    for row in rows {
        response.push(helpers::compose_exam_response(state.db(), row, view).await?);
    }

    Ok(Json(response))
}

pub(super) async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let row = repositories::exams::find_row_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;

    let Some(row) = row else {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    };

    let view = match user.role {
        UserRole::Admin => ExamView::Staff,
        UserRole::Teacher => {
            if !helpers::can_manage_exam(&user, &row.created_by) {
                return Err(ApiError::Forbidden("You can only view your own exams"));
            }
            ExamView::Staff
        }
        UserRole::Student => {
            let assigned = repositories::exams::is_assigned_to(state.db(), &row.id, &user.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to check assignment"))?;
            if !assigned {
                // Unassigned students cannot tell whether the exam exists.
                return Err(ApiError::NotFound("Exam not found".to_string()));
            }
            ExamView::Student
        }
    };

    let response = helpers::compose_exam_response(state.db(), row, view).await?;
    Ok(Json(response))
}

pub(super) async fn delete_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    require_staff(&user)?;

    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;

    let Some(exam) = exam else {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    };

    if !helpers::can_manage_exam(&user, &exam.created_by) {
        return Err(ApiError::Forbidden("You can only delete your own exams"));
    }

    repositories::exams::delete_by_id(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    tracing::info!(exam_id = %exam.id, "Exam deleted");

    Ok(StatusCode::NO_CONTENT)
}
