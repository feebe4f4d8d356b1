use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::db::{
    delete_attendance, delete_participants, delete_session, find_missing_students, get_branch,
    get_coach, get_session, insert_attendance, insert_participants, insert_session,
    is_double_booking, list_sessions, update_session,
};
use crate::error::AppError;
use crate::models::{AttendanceStatus, SessionFilter, SessionRow, SessionStatus, TrainingSession};

use super::conflict::{Candidate, find_conflict};
use super::form::ValidatedBooking;

/// Bookings read before they write, so they take the write lock up front
/// and concurrent bookings wait on the busy timeout.
const WRITE_TRANSACTION: &str = "BEGIN IMMEDIATE";

/// Store errors raised by the overlap trigger are reported as the same
/// conflict the in-process check would have produced.
pub(crate) fn conflict_or(err: AppError, coach_name: &str, date: NaiveDate) -> AppError {
    match err {
        AppError::Database(ref db_err) if is_double_booking(db_err) => AppError::Conflict {
            coach_name: coach_name.to_string(),
            date,
        },
        other => other,
    }
}

/// A reference to a missing roster row is a problem with the submitted form,
/// not with the store.
fn unknown_reference(
    field: &'static str,
    message: String,
) -> impl FnOnce(AppError) -> AppError {
    move |err| match err {
        AppError::NotFound(_) => AppError::validation(field, message),
        other => other,
    }
}

async fn ensure_references(
    conn: &mut SqliteConnection,
    booking: &ValidatedBooking,
) -> Result<(), AppError> {
    get_branch(conn, booking.slot.branch_id)
        .await
        .map_err(unknown_reference(
            "branch_id",
            format!("Unknown branch {}", booking.slot.branch_id),
        ))?;

    let missing = find_missing_students(conn, &booking.student_ids).await?;
    if !missing.is_empty() {
        return Err(AppError::validation(
            "selected_students",
            format!("Unknown student ids: {:?}", missing),
        ));
    }

    Ok(())
}

/// Fails with a conflict naming the coach if the slot overlaps any of the
/// coach's existing sessions on that date.
async fn check_coach_free(
    conn: &mut SqliteConnection,
    coach_id: i64,
    coach_name: &str,
    booking: &ValidatedBooking,
    exclude_session_id: Option<i64>,
) -> Result<(), AppError> {
    let slot = booking.slot;
    let existing = list_sessions(conn, &SessionFilter::coach_on(coach_id, slot.date)).await?;
    let candidate = Candidate {
        coach_id,
        date: slot.date,
        start_time: slot.start_time,
        end_time: slot.end_time,
    };

    if let Some(clash) = find_conflict(&candidate, &existing, exclude_session_id) {
        warn!(
            coach_id,
            conflicting_session = clash.id,
            "Booking rejected, coach already booked"
        );
        return Err(AppError::Conflict {
            coach_name: coach_name.to_string(),
            date: slot.date,
        });
    }

    Ok(())
}

fn row_for(booking: &ValidatedBooking, coach_id: i64, status: SessionStatus) -> SessionRow {
    SessionRow {
        date: booking.slot.date,
        start_time: booking.slot.start_time,
        end_time: booking.slot.end_time,
        branch_id: booking.slot.branch_id,
        coach_id,
        package_type: Some(booking.package.package_type()),
        status,
        notes: booking.notes.clone(),
    }
}

/// Creates one session row per booked coach, each with its participants and
/// pending attendance. Every coach is checked before anything is written, and
/// all writes share one transaction.
#[instrument(skip(pool))]
pub async fn create_booking(
    pool: &Pool<Sqlite>,
    booking: &ValidatedBooking,
) -> Result<Vec<TrainingSession>, AppError> {
    info!("Creating booking");
    let mut tx = pool.begin_with(WRITE_TRANSACTION).await?;

    ensure_references(&mut tx, booking).await?;

    let mut coaches = Vec::new();
    for coach_id in booking.package.coach_ids() {
        let coach = get_coach(&mut tx, coach_id)
            .await
            .map_err(unknown_reference("coach_id", format!("Unknown coach {}", coach_id)))?;
        check_coach_free(&mut tx, coach.id, &coach.name, booking, None).await?;
        coaches.push(coach);
    }

    let mut created = Vec::with_capacity(coaches.len());
    for coach in &coaches {
        let row = row_for(booking, coach.id, SessionStatus::Scheduled);
        let session = insert_session(&mut tx, &row)
            .await
            .map_err(|e| conflict_or(e, &coach.name, row.date))?;

        insert_participants(&mut tx, session.id, &booking.student_ids).await?;
        insert_attendance(
            &mut tx,
            session.id,
            &booking.student_ids,
            AttendanceStatus::Pending,
        )
        .await?;

        created.push(session);
    }

    tx.commit().await?;
    info!(sessions = created.len(), "Booking created");

    Ok(created)
}

/// Rewrites one existing session row and replaces its participants and
/// attendance with the new selection.
#[instrument(skip(pool))]
pub async fn update_booking(
    pool: &Pool<Sqlite>,
    session_id: i64,
    booking: &ValidatedBooking,
) -> Result<TrainingSession, AppError> {
    info!("Updating booking");
    let mut tx = pool.begin_with(WRITE_TRANSACTION).await?;

    let current = get_session(&mut tx, session_id).await?;
    ensure_references(&mut tx, booking).await?;

    let coach_id = booking.package.coach_for_row(current.coach_id);
    let coach = get_coach(&mut tx, coach_id)
        .await
        .map_err(unknown_reference("coach_id", format!("Unknown coach {}", coach_id)))?;

    let status = booking.status.unwrap_or(current.status);
    if status.occupies_coach() {
        check_coach_free(&mut tx, coach.id, &coach.name, booking, Some(session_id)).await?;
    }

    let row = row_for(booking, coach.id, status);
    let session = update_session(&mut tx, session_id, &row)
        .await
        .map_err(|e| conflict_or(e, &coach.name, row.date))?;

    delete_attendance(&mut tx, session_id).await?;
    delete_participants(&mut tx, session_id).await?;
    insert_participants(&mut tx, session_id, &booking.student_ids).await?;
    insert_attendance(
        &mut tx,
        session_id,
        &booking.student_ids,
        AttendanceStatus::Pending,
    )
    .await?;

    tx.commit().await?;
    Ok(session)
}

/// Deletes a session together with its attendance and participant rows.
#[instrument(skip(pool))]
pub async fn delete_booking(pool: &Pool<Sqlite>, session_id: i64) -> Result<(), AppError> {
    info!("Deleting booking");
    let mut tx = pool.begin_with(WRITE_TRANSACTION).await?;

    get_session(&mut tx, session_id).await?;

    let attendance = delete_attendance(&mut tx, session_id).await?;
    let participants = delete_participants(&mut tx, session_id).await?;
    delete_session(&mut tx, session_id).await?;

    tx.commit().await?;
    info!(attendance, participants, "Booking deleted");

    Ok(())
}
