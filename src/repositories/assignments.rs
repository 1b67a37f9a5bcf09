use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::types::AssignmentStatus;

/// Assignment joined with the assigned student's identity.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AssigneeRow {
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) assigned_at: PrimitiveDateTime,
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<AssigneeRow>, sqlx::Error> {
    sqlx::query_as::<_, AssigneeRow>(
        "SELECT a.user_id, u.username, u.full_name, a.status, a.assigned_at
         FROM exam_assignments a
         JOIN users u ON u.id = a.user_id
         WHERE a.exam_id = $1
         ORDER BY u.full_name, u.username",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_assignments WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

/// Bulk-inserts one pending assignment per student. No-op for an empty list.
pub(crate) async fn create_many(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_ids: &[String],
    assigned_at: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if student_ids.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO exam_assignments (exam_id, user_id, status, assigned_at) ",
    );
    builder.push_values(student_ids, |mut row, student_id| {
        row.push_bind(exam_id)
            .push_bind(student_id)
            .push_bind(AssignmentStatus::Pending)
            .push_bind(assigned_at);
    });

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}
