use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{PackageType, SessionStatus};

/// Session form as submitted by the booking dialog. Every field is optional
/// until [`SessionForm::parse`] turns it into a [`ValidatedBooking`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionForm {
    pub branch_id: Option<i64>,
    pub package_type: Option<String>,
    pub coach_id: Option<i64>,
    #[serde(default)]
    pub selected_coaches: Vec<i64>,
    #[serde(default)]
    pub selected_students: Vec<i64>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSlot {
    pub branch_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Package {
    PersonalTraining { coach_id: i64 },
    /// Never empty; order follows the form with duplicates removed.
    CampTraining { coach_ids: Vec<i64> },
}

impl Package {
    pub fn package_type(&self) -> PackageType {
        match self {
            Package::PersonalTraining { .. } => PackageType::PersonalTraining,
            Package::CampTraining { .. } => PackageType::CampTraining,
        }
    }

    pub fn coach_ids(&self) -> Vec<i64> {
        match self {
            Package::PersonalTraining { coach_id } => vec![*coach_id],
            Package::CampTraining { coach_ids } => coach_ids.clone(),
        }
    }

    /// The coach owning a single edited row. Camp edits keep the row's
    /// current coach when it is still selected.
    pub fn coach_for_row(&self, current_coach_id: i64) -> i64 {
        match self {
            Package::PersonalTraining { coach_id } => *coach_id,
            Package::CampTraining { coach_ids } => {
                if coach_ids.contains(&current_coach_id) {
                    current_coach_id
                } else {
                    coach_ids.first().copied().unwrap_or(current_coach_id)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBooking {
    pub slot: SessionSlot,
    pub package: Package,
    pub student_ids: Vec<i64>,
    pub status: Option<SessionStatus>,
    pub notes: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::validation(field, format!("Invalid date '{}', expected YYYY-MM-DD", value))
    })
}

pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| {
            AppError::validation(field, format!("Invalid time '{}', expected HH:MM", value))
        })
}

impl SessionForm {
    /// Checks the form in a fixed order and reports the first failure.
    pub fn parse(&self) -> Result<ValidatedBooking, AppError> {
        let branch_id = self
            .branch_id
            .ok_or_else(|| AppError::validation("branch_id", "Branch is required"))?;

        let package_type = match present(&self.package_type) {
            Some(raw) => PackageType::from_str(raw)?,
            None => return Err(AppError::validation("package_type", "Package type is required")),
        };

        let package = match package_type {
            PackageType::PersonalTraining => match self.coach_id {
                Some(coach_id) => Package::PersonalTraining { coach_id },
                None => {
                    return Err(AppError::validation(
                        "coach_id",
                        "A coach is required for Personal Training",
                    ));
                }
            },
            PackageType::CampTraining => {
                if self.selected_coaches.is_empty() {
                    return Err(AppError::validation(
                        "selected_coaches",
                        "Select at least one coach for Camp Training",
                    ));
                }
                Package::CampTraining {
                    coach_ids: dedup(&self.selected_coaches),
                }
            }
        };

        let date = present(&self.date)
            .ok_or_else(|| AppError::validation("date", "Date is required"))?;

        let (start, end) = match (present(&self.start_time), present(&self.end_time)) {
            (Some(start), Some(end)) => (start, end),
            (None, _) => {
                return Err(AppError::validation(
                    "start_time",
                    "Start and end time are required",
                ));
            }
            (_, None) => {
                return Err(AppError::validation(
                    "end_time",
                    "Start and end time are required",
                ));
            }
        };

        let date = parse_date("date", date)?;
        let start_time = parse_time("start_time", start)?;
        let end_time = parse_time("end_time", end)?;

        if start_time >= end_time {
            return Err(AppError::validation(
                "end_time",
                "End time must be after start time",
            ));
        }

        let status = present(&self.status)
            .map(SessionStatus::from_str)
            .transpose()?;

        Ok(ValidatedBooking {
            slot: SessionSlot {
                branch_id,
                date,
                start_time,
                end_time,
            },
            package,
            student_ids: dedup(&self.selected_students),
            status,
            notes: present(&self.notes).map(String::from),
        })
    }
}
