use rocket::FromForm;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::pool::PoolConnection;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;
use validator::Validate;

use crate::auth::Actor;
use crate::db::{
    create_branch, create_coach, create_student, get_branch, get_coach, get_session, get_student,
    list_attendance, list_branches, list_coaches, list_logical_sessions, list_participant_ids,
    list_sessions, list_students, set_coach_archived, set_student_archived, update_branch,
    update_coach, update_student,
};
use crate::error::AppError;
use crate::models::{
    AttendanceRecord, AttendanceStatus, Branch, Coach, LogicalSession, SessionDetail,
    SessionFilter, SessionStatus, Student, TrainingSession,
};
use crate::scheduling::{
    SessionForm, create_booking, delete_booking, parse_date, set_attendance, update_booking,
};
use crate::validation::{ApiResult, AppErrorExt, JsonValidateExt};

async fn connection(db: &Pool<Sqlite>) -> ApiResult<PoolConnection<Sqlite>> {
    db.acquire().await.map_err(AppError::from).validate_custom()
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[derive(FromForm)]
pub struct RosterQueryParams {
    include_archived: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ArchiveRequest {
    pub archived: bool,
}

// Branches

#[derive(Serialize, Deserialize, Validate, Debug, Clone)]
pub struct BranchRequest {
    #[validate(length(min = 1, max = 100, message = "Branch name must be 1-100 characters"))]
    pub name: String,
    pub address: Option<String>,
}

#[get("/branches")]
pub async fn api_get_branches(db: &State<Pool<Sqlite>>) -> ApiResult<Json<Vec<Branch>>> {
    let branches = list_branches(db).await.validate_custom()?;
    Ok(Json(branches))
}

#[post("/branches", data = "<branch>")]
pub async fn api_create_branch(
    branch: Json<BranchRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Branch>>> {
    let validated = branch.validate_custom()?;
    info!(actor = %actor.id, name = %validated.name, "Creating branch");

    let id = create_branch(db, validated.name.trim(), validated.address.as_deref())
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let created = get_branch(&mut conn, id).await.validate_custom()?;

    Ok(Custom(Status::Created, Json(created)))
}

#[get("/branches/<id>")]
pub async fn api_get_branch(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<Json<Branch>> {
    let mut conn = connection(db).await?;
    let branch = get_branch(&mut conn, id).await.validate_custom()?;
    Ok(Json(branch))
}

#[put("/branches/<id>", data = "<branch>")]
pub async fn api_update_branch(
    id: i64,
    branch: Json<BranchRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Branch>> {
    let validated = branch.validate_custom()?;
    info!(actor = %actor.id, branch_id = id, "Updating branch");

    update_branch(db, id, validated.name.trim(), validated.address.as_deref())
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let updated = get_branch(&mut conn, id).await.validate_custom()?;
    Ok(Json(updated))
}

// Coaches

#[derive(Serialize, Deserialize, Validate, Debug, Clone)]
pub struct CoachRequest {
    #[validate(length(min = 1, max = 100, message = "Coach name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
}

#[get("/coaches?<params..>")]
pub async fn api_get_coaches(
    params: RosterQueryParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Vec<Coach>>> {
    let coaches = list_coaches(db, params.include_archived.unwrap_or(false))
        .await
        .validate_custom()?;
    Ok(Json(coaches))
}

#[post("/coaches", data = "<coach>")]
pub async fn api_create_coach(
    coach: Json<CoachRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Coach>>> {
    let validated = coach.validate_custom()?;
    info!(actor = %actor.id, name = %validated.name, "Creating coach");

    let id = create_coach(db, validated.name.trim(), validated.email.as_deref())
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let created = get_coach(&mut conn, id).await.validate_custom()?;

    Ok(Custom(Status::Created, Json(created)))
}

#[get("/coaches/<id>")]
pub async fn api_get_coach(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<Json<Coach>> {
    let mut conn = connection(db).await?;
    let coach = get_coach(&mut conn, id).await.validate_custom()?;
    Ok(Json(coach))
}

#[put("/coaches/<id>", data = "<coach>")]
pub async fn api_update_coach(
    id: i64,
    coach: Json<CoachRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Coach>> {
    let validated = coach.validate_custom()?;
    info!(actor = %actor.id, coach_id = id, "Updating coach");

    update_coach(db, id, validated.name.trim(), validated.email.as_deref())
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let updated = get_coach(&mut conn, id).await.validate_custom()?;
    Ok(Json(updated))
}

#[put("/coaches/<id>/archive", data = "<request>")]
pub async fn api_archive_coach(
    id: i64,
    request: Json<ArchiveRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Coach>> {
    info!(actor = %actor.id, coach_id = id, archived = request.archived, "Archiving coach");

    set_coach_archived(db, id, request.archived)
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let updated = get_coach(&mut conn, id).await.validate_custom()?;
    Ok(Json(updated))
}

// Students

#[derive(Serialize, Deserialize, Validate, Debug, Clone)]
pub struct StudentRequest {
    #[validate(length(min = 1, max = 100, message = "Student name must be 1-100 characters"))]
    pub name: String,
    pub birth_date: Option<String>,
}

impl StudentRequest {
    fn birth_date(&self) -> Result<Option<chrono::NaiveDate>, AppError> {
        self.birth_date
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| parse_date("birth_date", v))
            .transpose()
    }
}

#[get("/students?<params..>")]
pub async fn api_get_students(
    params: RosterQueryParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Vec<Student>>> {
    let students = list_students(db, params.include_archived.unwrap_or(false))
        .await
        .validate_custom()?;
    Ok(Json(students))
}

#[post("/students", data = "<student>")]
pub async fn api_create_student(
    student: Json<StudentRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Student>>> {
    let validated = student.validate_custom()?;
    let birth_date = validated.birth_date().validate_custom()?;
    info!(actor = %actor.id, name = %validated.name, "Creating student");

    let id = create_student(db, validated.name.trim(), birth_date)
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let created = get_student(&mut conn, id).await.validate_custom()?;

    Ok(Custom(Status::Created, Json(created)))
}

#[get("/students/<id>")]
pub async fn api_get_student(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<Json<Student>> {
    let mut conn = connection(db).await?;
    let student = get_student(&mut conn, id).await.validate_custom()?;
    Ok(Json(student))
}

#[put("/students/<id>", data = "<student>")]
pub async fn api_update_student(
    id: i64,
    student: Json<StudentRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Student>> {
    let validated = student.validate_custom()?;
    let birth_date = validated.birth_date().validate_custom()?;
    info!(actor = %actor.id, student_id = id, "Updating student");

    update_student(db, id, validated.name.trim(), birth_date)
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let updated = get_student(&mut conn, id).await.validate_custom()?;
    Ok(Json(updated))
}

#[put("/students/<id>/archive", data = "<request>")]
pub async fn api_archive_student(
    id: i64,
    request: Json<ArchiveRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Student>> {
    info!(actor = %actor.id, student_id = id, archived = request.archived, "Archiving student");

    set_student_archived(db, id, request.archived)
        .await
        .validate_custom()?;

    let mut conn = connection(db).await?;
    let updated = get_student(&mut conn, id).await.validate_custom()?;
    Ok(Json(updated))
}

// Sessions

#[derive(FromForm, Debug)]
pub struct SessionQueryParams {
    coach_id: Option<i64>,
    branch_id: Option<i64>,
    from: Option<String>,
    to: Option<String>,
    status: Option<String>,
}

impl SessionQueryParams {
    fn filter(&self) -> Result<SessionFilter, AppError> {
        Ok(SessionFilter {
            coach_id: self.coach_id,
            branch_id: self.branch_id,
            from: self.from.as_deref().map(|v| parse_date("from", v)).transpose()?,
            to: self.to.as_deref().map(|v| parse_date("to", v)).transpose()?,
            status: self
                .status
                .as_deref()
                .map(SessionStatus::from_str)
                .transpose()?,
        })
    }
}

#[get("/sessions?<params..>")]
pub async fn api_get_sessions(
    params: SessionQueryParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Vec<TrainingSession>>> {
    let filter = params.filter().validate_custom()?;
    let mut conn = connection(db).await?;
    let sessions = list_sessions(&mut conn, &filter).await.validate_custom()?;
    Ok(Json(sessions))
}

#[get("/sessions/logical?<params..>")]
pub async fn api_get_logical_sessions(
    params: SessionQueryParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Vec<LogicalSession>>> {
    let filter = params.filter().validate_custom()?;
    let mut conn = connection(db).await?;
    let sessions = list_logical_sessions(&mut conn, &filter)
        .await
        .validate_custom()?;
    Ok(Json(sessions))
}

#[get("/sessions/<id>", rank = 2)]
pub async fn api_get_session(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<Json<SessionDetail>> {
    let mut conn = connection(db).await?;
    let session = get_session(&mut conn, id).await.validate_custom()?;
    let participant_ids = list_participant_ids(&mut conn, id).await.validate_custom()?;

    Ok(Json(SessionDetail {
        session,
        participant_ids,
    }))
}

#[post("/sessions", data = "<form>")]
pub async fn api_create_session(
    form: Json<SessionForm>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Custom<Json<Vec<TrainingSession>>>> {
    let booking = form.parse().validate_custom()?;
    info!(actor = %actor.id, package = %booking.package.package_type(), "Booking sessions");

    let created = create_booking(db, &booking).await.validate_custom()?;
    Ok(Custom(Status::Created, Json(created)))
}

#[put("/sessions/<id>", data = "<form>")]
pub async fn api_update_session(
    id: i64,
    form: Json<SessionForm>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<TrainingSession>> {
    let booking = form.parse().validate_custom()?;
    info!(actor = %actor.id, session_id = id, "Editing session");

    let updated = update_booking(db, id, &booking).await.validate_custom()?;
    Ok(Json(updated))
}

#[delete("/sessions/<id>")]
pub async fn api_delete_session(
    id: i64,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Status> {
    info!(actor = %actor.id, session_id = id, "Deleting session");
    delete_booking(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

// Attendance

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AttendanceRequest {
    pub status: String,
}

#[get("/sessions/<id>/attendance")]
pub async fn api_get_attendance(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<Vec<AttendanceRecord>>> {
    let mut conn = connection(db).await?;
    get_session(&mut conn, id).await.validate_custom()?;
    let records = list_attendance(&mut conn, id).await.validate_custom()?;
    Ok(Json(records))
}

#[put("/sessions/<id>/attendance/<student_id>", data = "<request>")]
pub async fn api_set_attendance(
    id: i64,
    student_id: i64,
    request: Json<AttendanceRequest>,
    actor: Actor,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Json<AttendanceRecord>> {
    let status = AttendanceStatus::from_str(request.status.trim()).validate_custom()?;

    let record = set_attendance(db, id, student_id, status, &actor)
        .await
        .validate_custom()?;
    Ok(Json(record))
}
