use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};
use time::{Date, PrimitiveDateTime};

use crate::db::models::Exam;
use crate::db::types::UserRole;

pub(crate) const COLUMNS: &str = "\
    id, title, description, subject, class_name, duration_minutes, \
    total_points, exam_date, exam_time, created_by, created_at, updated_at";

const LIST_COLUMNS: &str = "\
    e.id, e.title, e.description, e.subject, e.class_name, e.duration_minutes, \
    e.total_points, e.exam_date, e.exam_time, e.created_by, e.created_at, \
    e.updated_at, u.username AS creator_username, u.full_name AS creator_full_name, \
    u.role AS creator_role";

/// Exam row joined with its creator's identity, as returned by the listing
/// queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExamListRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: String,
    pub(crate) class_name: String,
    pub(crate) duration_minutes: i32,
    pub(crate) total_points: i32,
    pub(crate) exam_date: Option<Date>,
    pub(crate) exam_time: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) creator_username: String,
    pub(crate) creator_full_name: String,
    pub(crate) creator_role: UserRole,
}

/// Which exams a listing query covers, depending on the caller's role.
pub(crate) enum ExamScope<'a> {
    All,
    CreatedBy(&'a str),
    AssignedTo(&'a str),
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_row_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamListRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamListRow>(&format!(
        "SELECT {LIST_COLUMNS} FROM exams e JOIN users u ON u.id = e.created_by WHERE e.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    scope: ExamScope<'_>,
    upcoming_only: bool,
) -> Result<Vec<ExamListRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {LIST_COLUMNS} FROM exams e JOIN users u ON u.id = e.created_by"
    ));

    match scope {
        ExamScope::All => {
            builder.push(" WHERE TRUE");
        }
        ExamScope::CreatedBy(user_id) => {
            builder.push(" WHERE e.created_by = ");
            builder.push_bind(user_id);
        }
        ExamScope::AssignedTo(user_id) => {
            builder.push(
                " JOIN exam_assignments a ON a.exam_id = e.id WHERE a.user_id = ",
            );
            builder.push_bind(user_id);
        }
    }

    if upcoming_only {
        builder.push(" AND e.exam_date IS NOT NULL AND e.exam_date >= CURRENT_DATE");
    }

    builder.push(" ORDER BY e.created_at DESC");

    builder.build_query_as::<ExamListRow>().fetch_all(pool).await
}

pub(crate) async fn is_assigned_to(
    pool: &PgPool,
    exam_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM exam_assignments WHERE exam_id = $1 AND user_id = $2",
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) subject: &'a str,
    pub(crate) class_name: &'a str,
    pub(crate) duration_minutes: i32,
    pub(crate) total_points: i32,
    pub(crate) exam_date: Option<Date>,
    pub(crate) exam_time: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, description, subject, class_name, duration_minutes,
            total_points, exam_date, exam_time, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.subject)
    .bind(params.class_name)
    .bind(params.duration_minutes)
    .bind(params.total_points)
    .bind(params.exam_date)
    .bind(params.exam_time)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}
