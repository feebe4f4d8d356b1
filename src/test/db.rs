#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use crate::db::{
        complete_elapsed_sessions, create_branch, get_coach, get_session, list_coaches,
        list_logical_sessions, list_sessions, list_students, set_coach_archived,
        set_student_archived, update_branch, update_coach,
    };
    use crate::error::AppError;
    use crate::models::{PackageType, SessionFilter, SessionStatus};
    use crate::scheduling::create_booking;
    use crate::test::test_utils::{TestDbBuilder, camp_form, date, time};

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
    }

    #[rocket::async_test]
    async fn test_archived_roster_entries_are_hidden_by_default() {
        let test_db = TestDbBuilder::new()
            .coach("Active Coach")
            .coach("Retired Coach")
            .student("Current")
            .student("Graduated")
            .build()
            .await
            .unwrap();

        set_coach_archived(&test_db.pool, test_db.coach_id("Retired Coach"), true)
            .await
            .unwrap();
        set_student_archived(&test_db.pool, test_db.student_id("Graduated"), true)
            .await
            .unwrap();

        let coaches = list_coaches(&test_db.pool, false).await.unwrap();
        assert_eq!(coaches.len(), 1);
        assert_eq!(coaches[0].name, "Active Coach");
        assert_eq!(list_coaches(&test_db.pool, true).await.unwrap().len(), 2);

        let students = list_students(&test_db.pool, false).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Current");
        assert_eq!(list_students(&test_db.pool, true).await.unwrap().len(), 2);

        let result = set_coach_archived(&test_db.pool, 999, true).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[rocket::async_test]
    async fn test_roster_updates() {
        let test_db = TestDbBuilder::new()
            .branch("Downtown")
            .coach("C1")
            .build()
            .await
            .unwrap();

        update_coach(&test_db.pool, test_db.coach_id("C1"), "Coach One", Some("one@academy.test"))
            .await
            .unwrap();
        let mut conn = test_db.pool.acquire().await.unwrap();
        let coach = get_coach(&mut conn, test_db.coach_id("C1")).await.unwrap();
        drop(conn);
        assert_eq!(coach.name, "Coach One");
        assert_eq!(coach.email.as_deref(), Some("one@academy.test"));

        let result = update_branch(&test_db.pool, 999, "Nowhere", None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = create_branch(&test_db.pool, "Downtown", None).await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[rocket::async_test]
    async fn test_session_listing_filters_and_orders() {
        let test_db = TestDbBuilder::new()
            .branch("Downtown")
            .branch("Uptown")
            .coach("C1")
            .coach("C2")
            .session("C1", "Downtown", "2024-06-02", "09:00", "10:00", &[])
            .session("C2", "Uptown", "2024-06-01", "15:00", "16:00", &[])
            .session("C1", "Uptown", "2024-06-01", "08:00", "09:00", &[])
            .session_with_status(
                "C2",
                "Downtown",
                "2024-06-03",
                "09:00",
                "10:00",
                &[],
                SessionStatus::Cancelled,
            )
            .build()
            .await
            .unwrap();
        let mut conn = test_db.pool.acquire().await.unwrap();

        let all = list_sessions(&mut conn, &SessionFilter::default())
            .await
            .unwrap();
        assert_eq!(
            all.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![
                test_db.session_ids[2],
                test_db.session_ids[1],
                test_db.session_ids[0],
                test_db.session_ids[3]
            ]
        );

        let filter = SessionFilter {
            branch_id: Some(test_db.branch_id("Uptown")),
            ..SessionFilter::default()
        };
        assert_eq!(list_sessions(&mut conn, &filter).await.unwrap().len(), 2);

        let filter = SessionFilter {
            from: Some(date("2024-06-02")),
            to: Some(date("2024-06-03")),
            status: Some(SessionStatus::Scheduled),
            ..SessionFilter::default()
        };
        let rows = list_sessions(&mut conn, &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, test_db.session_ids[0]);

        let rows = list_sessions(
            &mut conn,
            &SessionFilter::coach_on(test_db.coach_id("C1"), date("2024-06-01")),
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_time, time("08:00"));
    }

    #[rocket::async_test]
    async fn test_camp_rows_group_into_one_logical_session() {
        let test_db = TestDbBuilder::new()
            .branch("Downtown")
            .coach("Smith, J.")
            .coach("Lee")
            .coach("Solo")
            .session("Solo", "Downtown", "2024-06-01", "07:00", "08:00", &[])
            .build()
            .await
            .unwrap();
        let branch = test_db.branch_id("Downtown");
        let smith = test_db.coach_id("Smith, J.");
        let lee = test_db.coach_id("Lee");

        let booking = camp_form(branch, &[lee, smith], "2024-06-01", "09:00", "11:00", &[])
            .parse()
            .unwrap();
        let created = create_booking(&test_db.pool, &booking).await.unwrap();

        let mut conn = test_db.pool.acquire().await.unwrap();
        let logical = list_logical_sessions(&mut conn, &SessionFilter::default())
            .await
            .unwrap();

        assert_eq!(logical.len(), 2);
        assert_eq!(logical[0].coach_ids, vec![test_db.coach_id("Solo")]);

        let camp = &logical[1];
        assert_eq!(camp.package_type, Some(PackageType::CampTraining));
        assert_eq!(camp.start_time, time("09:00"));
        assert_eq!(camp.coach_ids, vec![smith, lee]);
        assert_eq!(camp.coach_names, vec!["Smith, J.", "Lee"]);

        let mut created_ids: Vec<i64> = created.iter().map(|s| s.id).collect();
        created_ids.sort();
        let mut grouped_ids = camp.session_ids.clone();
        grouped_ids.sort();
        assert_eq!(grouped_ids, created_ids);
    }

    #[rocket::async_test]
    async fn test_sweep_completes_only_elapsed_scheduled_sessions() {
        let test_db = TestDbBuilder::new()
            .branch("Downtown")
            .coach("C1")
            .session("C1", "Downtown", "2024-06-01", "09:00", "10:00", &[])
            .session("C1", "Downtown", "2024-06-01", "10:00", "11:00", &[])
            .session_with_status(
                "C1",
                "Downtown",
                "2024-05-31",
                "09:00",
                "10:00",
                &[],
                SessionStatus::Cancelled,
            )
            .build()
            .await
            .unwrap();

        let completed = complete_elapsed_sessions(&test_db.pool, at("2024-06-01 10:00"))
            .await
            .unwrap();
        assert_eq!(completed, 1);

        let mut conn = test_db.pool.acquire().await.unwrap();
        let first = get_session(&mut conn, test_db.session_ids[0]).await.unwrap();
        let second = get_session(&mut conn, test_db.session_ids[1]).await.unwrap();
        let cancelled = get_session(&mut conn, test_db.session_ids[2]).await.unwrap();
        drop(conn);

        assert_eq!(first.status, SessionStatus::Completed);
        assert_eq!(second.status, SessionStatus::Scheduled);
        assert_eq!(cancelled.status, SessionStatus::Cancelled);

        let completed = complete_elapsed_sessions(&test_db.pool, at("2024-06-01 10:00"))
            .await
            .unwrap();
        assert_eq!(completed, 0);
    }
}
