use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    AttendanceRecord, AttendanceStatus, Branch, Coach, DbAttendanceRecord, DbLogicalSession,
    DbTrainingSession, LogicalSession, SessionFilter, SessionRow, Student, TrainingSession,
};

/// Message raised by the schema's overlap triggers.
pub const DOUBLE_BOOKING_GUARD: &str = "coach_double_booked";

const SESSION_COLUMNS: &str =
    "id, date, start_time, end_time, branch_id, coach_id, package_type, status, notes";

pub fn is_double_booking(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains(DOUBLE_BOOKING_GUARD),
        _ => false,
    }
}

// Branches

#[instrument(skip(pool))]
pub async fn create_branch(
    pool: &Pool<Sqlite>,
    name: &str,
    address: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating branch");

    let existing = sqlx::query("SELECT id FROM branches WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::validation(
            "name",
            format!("Branch '{}' already exists", name),
        ));
    }

    let res = sqlx::query("INSERT INTO branches (name, address) VALUES (?, ?)")
        .bind(name)
        .bind(address)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_branches(pool: &Pool<Sqlite>) -> Result<Vec<Branch>, AppError> {
    info!("Listing branches");
    let rows = sqlx::query_as::<_, Branch>("SELECT id, name, address FROM branches ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[instrument(skip(conn))]
pub async fn get_branch(conn: &mut SqliteConnection, id: i64) -> Result<Branch, AppError> {
    let row = sqlx::query_as::<_, Branch>("SELECT id, name, address FROM branches WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Branch with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn update_branch(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    address: Option<&str>,
) -> Result<(), AppError> {
    info!("Updating branch");
    let res = sqlx::query("UPDATE branches SET name = ?, address = ? WHERE id = ?")
        .bind(name)
        .bind(address)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Branch with id {} not found", id)));
    }

    Ok(())
}

// Coaches

#[instrument(skip(pool))]
pub async fn create_coach(
    pool: &Pool<Sqlite>,
    name: &str,
    email: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating coach");
    let res = sqlx::query("INSERT INTO coaches (name, email) VALUES (?, ?)")
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_coaches(
    pool: &Pool<Sqlite>,
    include_archived: bool,
) -> Result<Vec<Coach>, AppError> {
    info!(include_archived = %include_archived, "Listing coaches");

    let query = if include_archived {
        "SELECT id, name, email, archived FROM coaches ORDER BY name"
    } else {
        "SELECT id, name, email, archived FROM coaches WHERE archived IS 0 ORDER BY name"
    };

    let rows = sqlx::query_as::<_, Coach>(query).fetch_all(pool).await?;
    Ok(rows)
}

#[instrument(skip(conn))]
pub async fn get_coach(conn: &mut SqliteConnection, id: i64) -> Result<Coach, AppError> {
    let row = sqlx::query_as::<_, Coach>(
        "SELECT id, name, email, archived FROM coaches WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Coach with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn update_coach(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    email: Option<&str>,
) -> Result<(), AppError> {
    info!("Updating coach");
    let res = sqlx::query("UPDATE coaches SET name = ?, email = ? WHERE id = ?")
        .bind(name)
        .bind(email)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Coach with id {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn set_coach_archived(
    pool: &Pool<Sqlite>,
    id: i64,
    archived: bool,
) -> Result<(), AppError> {
    info!("Toggling coach archived status");
    let res = sqlx::query("UPDATE coaches SET archived = ? WHERE id = ?")
        .bind(archived)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Coach with id {} not found", id)));
    }

    Ok(())
}

// Students

#[instrument(skip(pool))]
pub async fn create_student(
    pool: &Pool<Sqlite>,
    name: &str,
    birth_date: Option<NaiveDate>,
) -> Result<i64, AppError> {
    info!("Creating student");
    let res = sqlx::query("INSERT INTO students (name, birth_date) VALUES (?, ?)")
        .bind(name)
        .bind(birth_date)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_students(
    pool: &Pool<Sqlite>,
    include_archived: bool,
) -> Result<Vec<Student>, AppError> {
    info!(include_archived = %include_archived, "Listing students");

    let query = if include_archived {
        "SELECT id, name, birth_date, archived FROM students ORDER BY name"
    } else {
        "SELECT id, name, birth_date, archived FROM students WHERE archived IS 0 ORDER BY name"
    };

    let rows = sqlx::query_as::<_, Student>(query).fetch_all(pool).await?;
    Ok(rows)
}

#[instrument(skip(conn))]
pub async fn get_student(conn: &mut SqliteConnection, id: i64) -> Result<Student, AppError> {
    let row = sqlx::query_as::<_, Student>(
        "SELECT id, name, birth_date, archived FROM students WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn update_student(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    birth_date: Option<NaiveDate>,
) -> Result<(), AppError> {
    info!("Updating student");
    let res = sqlx::query("UPDATE students SET name = ?, birth_date = ? WHERE id = ?")
        .bind(name)
        .bind(birth_date)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Student with id {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn set_student_archived(
    pool: &Pool<Sqlite>,
    id: i64,
    archived: bool,
) -> Result<(), AppError> {
    info!("Toggling student archived status");
    let res = sqlx::query("UPDATE students SET archived = ? WHERE id = ?")
        .bind(archived)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Student with id {} not found", id)));
    }

    Ok(())
}

/// Returns the ids from `ids` that have no matching student row.
#[instrument(skip(conn))]
pub async fn find_missing_students(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<i64>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM students WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let found: Vec<i64> = qb
        .build_query_scalar::<i64>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect())
}

// Training sessions

#[instrument(skip(conn))]
pub async fn list_sessions(
    conn: &mut SqliteConnection,
    filter: &SessionFilter,
) -> Result<Vec<TrainingSession>, AppError> {
    info!("Listing training sessions");

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM training_sessions WHERE 1 = 1",
        SESSION_COLUMNS
    ));

    if let Some(coach_id) = filter.coach_id {
        qb.push(" AND coach_id = ").push_bind(coach_id);
    }
    if let Some(branch_id) = filter.branch_id {
        qb.push(" AND branch_id = ").push_bind(branch_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND date <= ").push_bind(to);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY date, start_time, id");

    let rows = qb
        .build_query_as::<DbTrainingSession>()
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(TrainingSession::try_from).collect()
}

#[instrument(skip(conn))]
pub async fn get_session(conn: &mut SqliteConnection, id: i64) -> Result<TrainingSession, AppError> {
    let row = sqlx::query_as::<_, DbTrainingSession>(&format!(
        "SELECT {} FROM training_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => TrainingSession::try_from(row),
        None => Err(AppError::NotFound(format!(
            "Training session with id {} not found",
            id
        ))),
    }
}

#[instrument(skip(conn))]
pub async fn insert_session(
    conn: &mut SqliteConnection,
    row: &SessionRow,
) -> Result<TrainingSession, AppError> {
    info!(coach_id = row.coach_id, date = %row.date, "Inserting training session");

    let inserted = sqlx::query_as::<_, DbTrainingSession>(&format!(
        "INSERT INTO training_sessions
         (date, start_time, end_time, branch_id, coach_id, package_type, status, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {}",
        SESSION_COLUMNS
    ))
    .bind(row.date)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(row.branch_id)
    .bind(row.coach_id)
    .bind(row.package_type.map(|p| p.as_str()))
    .bind(row.status.as_str())
    .bind(row.notes.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    TrainingSession::try_from(inserted)
}

#[instrument(skip(conn))]
pub async fn update_session(
    conn: &mut SqliteConnection,
    id: i64,
    row: &SessionRow,
) -> Result<TrainingSession, AppError> {
    info!("Updating training session");

    let updated = sqlx::query_as::<_, DbTrainingSession>(&format!(
        "UPDATE training_sessions
         SET date = ?, start_time = ?, end_time = ?, branch_id = ?, coach_id = ?,
             package_type = ?, status = ?, notes = ?
         WHERE id = ?
         RETURNING {}",
        SESSION_COLUMNS
    ))
    .bind(row.date)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(row.branch_id)
    .bind(row.coach_id)
    .bind(row.package_type.map(|p| p.as_str()))
    .bind(row.status.as_str())
    .bind(row.notes.as_deref())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(row) => TrainingSession::try_from(row),
        None => Err(AppError::NotFound(format!(
            "Training session with id {} not found",
            id
        ))),
    }
}

#[instrument(skip(conn))]
pub async fn delete_session(conn: &mut SqliteConnection, id: i64) -> Result<u64, AppError> {
    info!("Deleting training session");
    let res = sqlx::query("DELETE FROM training_sessions WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected())
}

/// Marks scheduled sessions that ended at or before `now` as completed.
#[instrument(skip(pool))]
pub async fn complete_elapsed_sessions(
    pool: &Pool<Sqlite>,
    now: NaiveDateTime,
) -> Result<u64, AppError> {
    info!("Completing elapsed sessions");

    let cutoff = now.format("%Y-%m-%d %H:%M:%S").to_string();
    let res = sqlx::query(
        "UPDATE training_sessions SET status = 'completed'
         WHERE status = 'scheduled' AND (date || ' ' || end_time) <= ?",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(conn))]
pub async fn list_logical_sessions(
    conn: &mut SqliteConnection,
    filter: &SessionFilter,
) -> Result<Vec<LogicalSession>, AppError> {
    info!("Listing logical sessions");

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT ts.date, ts.start_time, ts.end_time, ts.branch_id, ts.package_type,
                group_concat(ts.id, ',' ORDER BY ts.coach_id) AS session_ids,
                group_concat(ts.coach_id, ',' ORDER BY ts.coach_id) AS coach_ids,
                group_concat(c.name, char(31) ORDER BY ts.coach_id) AS coach_names
         FROM training_sessions ts
         JOIN coaches c ON c.id = ts.coach_id
         WHERE ts.status != 'cancelled'",
    );

    if let Some(coach_id) = filter.coach_id {
        qb.push(" AND ts.coach_id = ").push_bind(coach_id);
    }
    if let Some(branch_id) = filter.branch_id {
        qb.push(" AND ts.branch_id = ").push_bind(branch_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND ts.date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND ts.date <= ").push_bind(to);
    }
    qb.push(
        " GROUP BY ts.date, ts.start_time, ts.end_time, ts.branch_id, ts.package_type
          ORDER BY ts.date, ts.start_time, ts.branch_id",
    );

    let rows = qb
        .build_query_as::<DbLogicalSession>()
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(LogicalSession::try_from).collect()
}

// Participants

#[instrument(skip(conn))]
pub async fn insert_participants(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_ids: &[i64],
) -> Result<(), AppError> {
    info!("Inserting session participants");
    for student_id in student_ids {
        sqlx::query("INSERT INTO session_participants (session_id, student_id) VALUES (?, ?)")
            .bind(session_id)
            .bind(student_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[instrument(skip(conn))]
pub async fn delete_participants(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<u64, AppError> {
    info!("Deleting session participants");
    let res = sqlx::query("DELETE FROM session_participants WHERE session_id = ?")
        .bind(session_id)
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(conn))]
pub async fn list_participant_ids(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT student_id FROM session_participants WHERE session_id = ? ORDER BY student_id",
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

// Attendance

#[instrument(skip(conn))]
pub async fn insert_attendance(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_ids: &[i64],
    status: AttendanceStatus,
) -> Result<(), AppError> {
    info!("Inserting attendance placeholders");
    for student_id in student_ids {
        sqlx::query(
            "INSERT INTO attendance_records (session_id, student_id, status) VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind(student_id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[instrument(skip(conn))]
pub async fn delete_attendance(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<u64, AppError> {
    info!("Deleting attendance records");
    let res = sqlx::query("DELETE FROM attendance_records WHERE session_id = ?")
        .bind(session_id)
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(conn))]
pub async fn upsert_attendance(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_id: i64,
    status: AttendanceStatus,
    marked_at: DateTime<Utc>,
    marked_by: Option<&str>,
) -> Result<(), AppError> {
    info!("Upserting attendance record");
    sqlx::query(
        "INSERT INTO attendance_records (session_id, student_id, status, marked_at, marked_by)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (session_id, student_id) DO UPDATE
         SET status = excluded.status,
             marked_at = excluded.marked_at,
             marked_by = excluded.marked_by",
    )
    .bind(session_id)
    .bind(student_id)
    .bind(status.as_str())
    .bind(marked_at)
    .bind(marked_by)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[instrument(skip(conn))]
pub async fn list_attendance(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<Vec<AttendanceRecord>, AppError> {
    let rows = sqlx::query_as::<_, DbAttendanceRecord>(
        "SELECT a.session_id, a.student_id, s.name AS student_name, a.status,
                a.marked_at, a.marked_by
         FROM attendance_records a
         JOIN students s ON s.id = a.student_id
         WHERE a.session_id = ?
         ORDER BY s.name, a.student_id",
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

#[instrument(skip(conn))]
pub async fn get_attendance(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_id: i64,
) -> Result<AttendanceRecord, AppError> {
    let row = sqlx::query_as::<_, DbAttendanceRecord>(
        "SELECT a.session_id, a.student_id, s.name AS student_name, a.status,
                a.marked_at, a.marked_by
         FROM attendance_records a
         JOIN students s ON s.id = a.student_id
         WHERE a.session_id = ? AND a.student_id = ?",
    )
    .bind(session_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => AttendanceRecord::try_from(row),
        None => Err(AppError::NotFound(format!(
            "No attendance for student {} in session {}",
            student_id, session_id
        ))),
    }
}
