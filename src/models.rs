use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageType {
    #[serde(rename = "Camp Training")]
    CampTraining,
    #[serde(rename = "Personal Training")]
    PersonalTraining,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::CampTraining => "Camp Training",
            PackageType::PersonalTraining => "Personal Training",
        }
    }
}

impl FromStr for PackageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Camp Training" => Ok(PackageType::CampTraining),
            "Personal Training" => Ok(PackageType::PersonalTraining),
            _ => Err(AppError::validation(
                "package_type",
                format!("Unknown package type '{}'", s),
            )),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Cancelled sessions keep their row but no longer occupy the coach.
    pub fn occupies_coach(&self) -> bool {
        !matches!(self, SessionStatus::Cancelled)
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            _ => Err(AppError::validation(
                "status",
                format!("Unknown session status '{}'", s),
            )),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Pending => "pending",
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttendanceStatus::Pending),
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            _ => Err(AppError::validation(
                "status",
                format!("Unknown attendance status '{}'", s),
            )),
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Coach {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub archived: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub archived: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrainingSession {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub branch_id: i64,
    pub coach_id: i64,
    pub package_type: Option<PackageType>,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTrainingSession {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub branch_id: i64,
    pub coach_id: i64,
    pub package_type: Option<String>,
    pub status: String,
    pub notes: Option<String>,
}

impl TryFrom<DbTrainingSession> for TrainingSession {
    type Error = AppError;

    fn try_from(row: DbTrainingSession) -> Result<Self, Self::Error> {
        let package_type = row
            .package_type
            .as_deref()
            .map(PackageType::from_str)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Session {} has {}", row.id, e)))?;
        let status = SessionStatus::from_str(&row.status)
            .map_err(|e| AppError::Internal(format!("Session {} has {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            branch_id: row.branch_id,
            coach_id: row.coach_id,
            package_type,
            status,
            notes: row.notes,
        })
    }
}

/// Column values for inserting or rewriting one session row.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub branch_id: i64,
    pub coach_id: i64,
    pub package_type: Option<PackageType>,
    pub status: SessionStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: TrainingSession,
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Default, Clone)]
pub struct SessionFilter {
    pub coach_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    pub fn coach_on(coach_id: i64, date: NaiveDate) -> Self {
        Self {
            coach_id: Some(coach_id),
            from: Some(date),
            to: Some(date),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttendanceRecord {
    pub session_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub status: AttendanceStatus,
    pub marked_at: Option<DateTime<Utc>>,
    pub marked_by: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAttendanceRecord {
    pub session_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub status: String,
    pub marked_at: Option<DateTime<Utc>>,
    pub marked_by: Option<String>,
}

impl TryFrom<DbAttendanceRecord> for AttendanceRecord {
    type Error = AppError;

    fn try_from(row: DbAttendanceRecord) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_str(&row.status).map_err(|e| {
            AppError::Internal(format!(
                "Attendance for session {} student {} has {}",
                row.session_id, row.student_id, e
            ))
        })?;

        Ok(Self {
            session_id: row.session_id,
            student_id: row.student_id,
            student_name: row.student_name,
            status,
            marked_at: row.marked_at,
            marked_by: row.marked_by,
        })
    }
}

/// One logical session: every row sharing date, times, branch and package type.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogicalSession {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub branch_id: i64,
    pub package_type: Option<PackageType>,
    pub session_ids: Vec<i64>,
    pub coach_ids: Vec<i64>,
    pub coach_names: Vec<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbLogicalSession {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub branch_id: i64,
    pub package_type: Option<String>,
    pub session_ids: String,
    pub coach_ids: String,
    pub coach_names: String,
}

/// Separator used by the grouping query for names, which may contain commas.
pub const NAME_SEPARATOR: char = '\u{1f}';

fn split_ids(joined: &str) -> Result<Vec<i64>, AppError> {
    joined
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|e| AppError::Internal(format!("Bad id '{}' in grouping: {}", part, e)))
        })
        .collect()
}

impl TryFrom<DbLogicalSession> for LogicalSession {
    type Error = AppError;

    fn try_from(row: DbLogicalSession) -> Result<Self, Self::Error> {
        let package_type = row
            .package_type
            .as_deref()
            .map(PackageType::from_str)
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self {
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            branch_id: row.branch_id,
            package_type,
            session_ids: split_ids(&row.session_ids)?,
            coach_ids: split_ids(&row.coach_ids)?,
            coach_names: row
                .coach_names
                .split(NAME_SEPARATOR)
                .map(String::from)
                .collect(),
        })
    }
}
