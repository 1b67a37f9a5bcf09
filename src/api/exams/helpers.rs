use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::core::time::{format_date, format_primitive, primitive_now_utc};
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::repositories::exams::ExamListRow;
use crate::schemas::exam::{
    AssigneeResponse, CreatorResponse, ExamResponse, QuestionCreate, QuestionResponse,
};

/// Controls what a composed exam response exposes: staff see answer keys and
/// the assignee roster, students see neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ExamView {
    Staff,
    Student,
}

pub(super) async fn insert_questions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    exam_id: &str,
    created_by: &str,
    questions: &[QuestionCreate],
) -> Result<(), ApiError> {
    let now = primitive_now_utc();

    for question in questions {
        repositories::questions::create(
            &mut **tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id,
                text: &question.text,
                question_type: question.question_type,
                points: question.points,
                options: question.options.clone(),
                correct_answer: &question.correct_answer,
                created_by,
                created_at: now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
    }

    Ok(())
}

/// Re-reads the exam with its questions and assignees and composes the
/// role-appropriate response.
pub(super) async fn fetch_exam_response(
    pool: &sqlx::PgPool,
    exam_id: &str,
    view: ExamView,
) -> Result<Option<ExamResponse>, ApiError> {
    let row = repositories::exams::find_row_by_id(pool, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(compose_exam_response(pool, row, view).await?))
}

pub(super) async fn compose_exam_response(
    pool: &sqlx::PgPool,
    row: ExamListRow,
    view: ExamView,
) -> Result<ExamResponse, ApiError> {
    let questions = repositories::questions::list_by_exam(pool, &row.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    let question_responses = questions
        .into_iter()
        .map(|question| QuestionResponse {
            id: question.id,
            text: question.text,
            question_type: question.question_type,
            points: question.points,
            options: question.options.0,
            correct_answer: match view {
                ExamView::Staff => Some(question.correct_answer),
                ExamView::Student => None,
            },
        })
        .collect();

    let assignees = match view {
        ExamView::Staff => {
            let rows = repositories::assignments::list_by_exam(pool, &row.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to fetch assignees"))?;

            Some(
                rows.into_iter()
                    .map(|assignee| AssigneeResponse {
                        user_id: assignee.user_id,
                        username: assignee.username,
                        full_name: assignee.full_name,
                        status: assignee.status,
                        assigned_at: format_primitive(assignee.assigned_at),
                    })
                    .collect(),
            )
        }
        ExamView::Student => None,
    };

    Ok(ExamResponse {
        id: row.id,
        title: row.title,
        description: row.description,
        subject: row.subject,
        class_name: row.class_name,
        duration_minutes: row.duration_minutes,
        total_points: row.total_points,
        exam_date: row.exam_date.map(format_date),
        exam_time: row.exam_time,
        created_by: CreatorResponse {
            id: row.created_by,
            username: row.creator_username,
            full_name: row.creator_full_name,
            role: row.creator_role,
        },
        created_at: format_primitive(row.created_at),
        updated_at: format_primitive(row.updated_at),
        questions: question_responses,
        assignees,
    })
}

pub(super) fn can_manage_exam(user: &User, created_by: &str) -> bool {
    matches!(user.role, UserRole::Admin) || created_by == user.id
}
