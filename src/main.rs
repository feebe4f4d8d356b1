#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod scheduling;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;
use std::sync::Mutex;

use api::{
    api_archive_coach, api_archive_student, api_create_branch, api_create_coach,
    api_create_session, api_create_student, api_delete_session, api_get_attendance,
    api_get_branch, api_get_branches, api_get_coach, api_get_coaches, api_get_logical_sessions,
    api_get_session, api_get_sessions, api_get_student, api_get_students, api_set_attendance,
    api_update_branch, api_update_coach, api_update_session, api_update_student, health,
};
use auth::{bad_request_api, not_found_api, unauthorized_api, unprocessable_api};
use chrono::Utc;
use db::complete_elapsed_sessions;
use env::{AppConfig, load_environment};
use once_cell::sync::Lazy;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use telemetry::{OtelGuard, TelemetryFairing, init_tracing, shutdown_telemetry};
use tracing::{error, info};

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

async fn connect(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    Ok(pool)
}

fn spawn_session_sweep(pool: SqlitePool, config: &AppConfig) {
    let interval = config.sweep_interval;

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match complete_elapsed_sessions(&pool, Utc::now().naive_utc()).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Marked {} elapsed sessions as completed", count);
                    }
                }
                Err(e) => {
                    error!("Failed to complete elapsed sessions: {}", e);
                }
            }

            tokio::time::sleep(interval).await;
        }
    });
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        panic!("Failed to load environment: {:#}", e);
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => panic!("Invalid configuration: {:#}", e),
    };

    match init_tracing(&config) {
        Ok(guard) => {
            if let Ok(mut slot) = TELEMETRY_GUARD.lock() {
                *slot = guard;
            }
        }
        Err(e) => eprintln!("Failed to initialise tracing: {:#}", e),
    }

    let pool = match connect(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to prepare database: {:#}", e);
            panic!("Database setup failed: {:#}", e);
        }
    };

    spawn_session_sweep(pool.clone(), &config);

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting academy scheduler");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_get_branches,
                api_create_branch,
                api_get_branch,
                api_update_branch,
                api_get_coaches,
                api_create_coach,
                api_get_coach,
                api_update_coach,
                api_archive_coach,
                api_get_students,
                api_create_student,
                api_get_student,
                api_update_student,
                api_archive_student,
                api_get_sessions,
                api_get_logical_sessions,
                api_get_session,
                api_create_session,
                api_update_session,
                api_delete_session,
                api_get_attendance,
                api_set_attendance,
            ],
        )
        .register(
            "/api",
            catchers![
                unauthorized_api,
                not_found_api,
                unprocessable_api,
                bad_request_api
            ],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async move { shutdown_telemetry() })
        }))
}
