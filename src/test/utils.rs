#[cfg(test)]
pub mod test_utils {
    use chrono::{NaiveDate, NaiveTime};
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Once;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::db::{
        create_branch, create_coach, create_student, insert_attendance, insert_participants,
        insert_session,
    };
    use crate::error::AppError;
    use crate::models::{AttendanceStatus, PackageType, SessionRow, SessionStatus};
    use crate::scheduling::SessionForm;

    static INIT: Once = Once::new();
    static DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn init_logging() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter("debug")
                .try_init();
        });
    }

    pub const ACTOR: &str = "front-desk@academy.test";

    pub fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    pub fn time(value: &str) -> NaiveTime {
        NaiveTime::parse_from_str(value, "%H:%M").unwrap()
    }

    pub struct TestSession {
        pub coach: String,
        pub branch: String,
        pub date: String,
        pub start_time: String,
        pub end_time: String,
        pub package_type: PackageType,
        pub status: SessionStatus,
        pub students: Vec<String>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        branches: Vec<String>,
        coaches: Vec<String>,
        students: Vec<String>,
        sessions: Vec<TestSession>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn branch(mut self, name: &str) -> Self {
            self.branches.push(name.to_string());
            self
        }

        pub fn coach(mut self, name: &str) -> Self {
            self.coaches.push(name.to_string());
            self
        }

        pub fn student(mut self, name: &str) -> Self {
            self.students.push(name.to_string());
            self
        }

        /// Seeds a scheduled Personal Training row directly in the store.
        pub fn session(
            self,
            coach: &str,
            branch: &str,
            date: &str,
            start_time: &str,
            end_time: &str,
            students: &[&str],
        ) -> Self {
            self.session_with_status(
                coach,
                branch,
                date,
                start_time,
                end_time,
                students,
                SessionStatus::Scheduled,
            )
        }

        #[allow(clippy::too_many_arguments)]
        pub fn session_with_status(
            mut self,
            coach: &str,
            branch: &str,
            date: &str,
            start_time: &str,
            end_time: &str,
            students: &[&str],
            status: SessionStatus,
        ) -> Self {
            self.sessions.push(TestSession {
                coach: coach.to_string(),
                branch: branch.to_string(),
                date: date.to_string(),
                start_time: start_time.to_string(),
                end_time: end_time.to_string(),
                package_type: PackageType::PersonalTraining,
                status,
                students: students.iter().map(|s| s.to_string()).collect(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_logging();

            // A single long-lived connection keeps the in-memory database alive.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            self.seed(pool, None).await
        }

        /// Builds on a temporary database file behind a multi-connection
        /// pool, so that bookings can genuinely run side by side.
        pub async fn build_on_disk(self) -> Result<TestDb, AppError> {
            init_logging();

            let path = std::env::temp_dir().join(format!(
                "academy-scheduler-test-{}-{}.db",
                std::process::id(),
                DB_COUNTER.fetch_add(1, Ordering::SeqCst)
            ));

            let options = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(10));

            let pool = SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?;

            self.seed(pool, Some(path)).await
        }

        async fn seed(
            self,
            pool: Pool<Sqlite>,
            db_path: Option<PathBuf>,
        ) -> Result<TestDb, AppError> {
            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut branch_id_map = HashMap::new();
            let mut coach_id_map = HashMap::new();
            let mut student_id_map = HashMap::new();
            let mut session_ids = Vec::new();

            for name in &self.branches {
                let id = create_branch(&pool, name, None).await?;
                branch_id_map.insert(name.clone(), id);
            }

            for name in &self.coaches {
                let id = create_coach(&pool, name, None).await?;
                coach_id_map.insert(name.clone(), id);
            }

            for name in &self.students {
                let id = create_student(&pool, name, None).await?;
                student_id_map.insert(name.clone(), id);
            }

            let mut conn = pool.acquire().await?;
            for session in &self.sessions {
                let row = SessionRow {
                    date: date(&session.date),
                    start_time: time(&session.start_time),
                    end_time: time(&session.end_time),
                    branch_id: branch_id_map[&session.branch],
                    coach_id: coach_id_map[&session.coach],
                    package_type: Some(session.package_type),
                    status: session.status,
                    notes: None,
                };
                let inserted = insert_session(&mut conn, &row).await?;

                let students: Vec<i64> = session
                    .students
                    .iter()
                    .map(|name| student_id_map[name])
                    .collect();
                insert_participants(&mut conn, inserted.id, &students).await?;
                insert_attendance(&mut conn, inserted.id, &students, AttendanceStatus::Pending)
                    .await?;

                session_ids.push(inserted.id);
            }
            drop(conn);

            Ok(TestDb {
                pool,
                branch_id_map,
                coach_id_map,
                student_id_map,
                session_ids,
                db_path,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub branch_id_map: HashMap<String, i64>,
        pub coach_id_map: HashMap<String, i64>,
        pub student_id_map: HashMap<String, i64>,
        /// Seeded session ids in insertion order.
        pub session_ids: Vec<i64>,
        db_path: Option<PathBuf>,
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            if let Some(path) = &self.db_path {
                for suffix in ["", "-wal", "-shm"] {
                    let mut file = path.clone().into_os_string();
                    file.push(suffix);
                    let _ = std::fs::remove_file(file);
                }
            }
        }
    }

    impl TestDb {
        pub fn branch_id(&self, name: &str) -> i64 {
            self.branch_id_map[name]
        }

        pub fn coach_id(&self, name: &str) -> i64 {
            self.coach_id_map[name]
        }

        pub fn student_id(&self, name: &str) -> i64 {
            self.student_id_map[name]
        }

        pub async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .unwrap()
        }
    }

    /// One branch, two coaches, two students, and C1 busy 09:00-10:00 on
    /// 2024-06-01.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .branch("Downtown")
            .coach("C1")
            .coach("C2")
            .student("Alice")
            .student("Ben")
            .session("C1", "Downtown", "2024-06-01", "09:00", "10:00", &["Alice"])
            .build()
            .await
            .unwrap()
    }

    pub fn personal_form(
        branch_id: i64,
        coach_id: i64,
        date: &str,
        start_time: &str,
        end_time: &str,
        students: &[i64],
    ) -> SessionForm {
        SessionForm {
            branch_id: Some(branch_id),
            package_type: Some("Personal Training".to_string()),
            coach_id: Some(coach_id),
            selected_students: students.to_vec(),
            date: Some(date.to_string()),
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
            ..SessionForm::default()
        }
    }

    pub fn camp_form(
        branch_id: i64,
        coach_ids: &[i64],
        date: &str,
        start_time: &str,
        end_time: &str,
        students: &[i64],
    ) -> SessionForm {
        SessionForm {
            branch_id: Some(branch_id),
            package_type: Some("Camp Training".to_string()),
            selected_coaches: coach_ids.to_vec(),
            selected_students: students.to_vec(),
            date: Some(date.to_string()),
            start_time: Some(start_time.to_string()),
            end_time: Some(end_time.to_string()),
            ..SessionForm::default()
        }
    }

    pub async fn setup_test_client(test_db: &TestDb) -> Client {
        let rocket = crate::init_rocket(test_db.pool.clone()).await;
        Client::tracked(rocket)
            .await
            .expect("valid rocket instance")
    }
}
