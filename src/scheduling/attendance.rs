use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::Actor;
use crate::db::{get_attendance, get_session, get_student, upsert_attendance};
use crate::error::AppError;
use crate::models::{AttendanceRecord, AttendanceStatus};

/// Marks a student present or absent for a session. Last write wins; a
/// repeated mark keeps the status and refreshes `marked_at`.
#[instrument(skip(pool, actor), fields(actor = %actor.id))]
pub async fn set_attendance(
    pool: &Pool<Sqlite>,
    session_id: i64,
    student_id: i64,
    status: AttendanceStatus,
    actor: &Actor,
) -> Result<AttendanceRecord, AppError> {
    if status == AttendanceStatus::Pending {
        return Err(AppError::validation(
            "status",
            "Attendance can only be marked present or absent",
        ));
    }

    info!("Marking attendance");
    let mut conn = pool.acquire().await?;

    get_session(&mut conn, session_id).await?;
    get_student(&mut conn, student_id).await?;

    upsert_attendance(
        &mut conn,
        session_id,
        student_id,
        status,
        Utc::now(),
        Some(actor.id.as_str()),
    )
    .await?;

    get_attendance(&mut conn, session_id, student_id).await
}
