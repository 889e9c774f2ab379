#[cfg(test)]
mod tests {
    use crate::catalog::{
        create_behavior, create_exercise, create_skill, delete_behavior, delete_exercise,
        delete_skill, link_behavior_exercise, list_behaviors, list_exercises, list_links,
        list_skills, unlink_behavior_exercise, update_behavior, update_skill,
    };
    use crate::dogs::{create_dog, delete_dog, get_dog, update_dog};
    use crate::error::AppError;
    use crate::rounds::{RecordRound, list_rounds, record_round};
    use crate::test::utils::TestDbBuilder;
    use rocket::tokio;

    #[tokio::test]
    async fn test_skills_are_unique_and_sorted() {
        let test_db = TestDbBuilder::new().build().await.unwrap();

        create_skill(&test_db.pool, "Trailing", None).await.unwrap();
        create_skill(&test_db.pool, "Area Search", Some("  ".into()))
            .await
            .unwrap();

        let err = create_skill(&test_db.pool, " Trailing ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let skills = list_skills(&test_db.pool).await.unwrap();
        let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Area Search", "Trailing"]);
        assert_eq!(skills[0].description, None);
    }

    #[tokio::test]
    async fn test_update_skill() {
        let test_db = TestDbBuilder::new()
            .skill("Trailing")
            .skill("Rubble")
            .build()
            .await
            .unwrap();
        let id = test_db.skill_id("Trailing");

        let updated = update_skill(&test_db.pool, id, "Mantrailing", Some("scent".into()))
            .await
            .unwrap();
        assert_eq!(updated.name, "Mantrailing");
        assert!(updated.updated_at >= updated.created_at);

        assert!(matches!(
            update_skill(&test_db.pool, id, "Rubble", None).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            update_skill(&test_db.pool, 999, "Anything", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_referenced_skill_conflicts() {
        let test_db = TestDbBuilder::new()
            .skill("Trailing")
            .behavior("Trailing", "Start")
            .build()
            .await
            .unwrap();
        let skill_id = test_db.skill_id("Trailing");

        assert!(matches!(
            delete_skill(&test_db.pool, skill_id).await,
            Err(AppError::Conflict(_))
        ));

        delete_behavior(&test_db.pool, test_db.behavior_id("Start"))
            .await
            .unwrap();
        delete_skill(&test_db.pool, skill_id).await.unwrap();

        assert!(matches!(
            delete_skill(&test_db.pool, skill_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_behaviors_need_an_existing_skill() {
        let test_db = TestDbBuilder::new()
            .skill("Trailing")
            .skill("Rubble")
            .behavior("Trailing", "Start")
            .build()
            .await
            .unwrap();
        let trailing = test_db.skill_id("Trailing");
        let rubble = test_db.skill_id("Rubble");

        assert!(matches!(
            create_behavior(&test_db.pool, 999, "Start", None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_behavior(&test_db.pool, trailing, "Start", None).await,
            Err(AppError::Conflict(_))
        ));

        create_behavior(&test_db.pool, rubble, "Start", None).await.unwrap();
        let moved = update_behavior(
            &test_db.pool,
            test_db.behavior_id("Start"),
            trailing,
            "Fast start",
            None,
        )
        .await
        .unwrap();
        assert_eq!(moved.name, "Fast start");

        assert_eq!(list_behaviors(&test_db.pool, None).await.unwrap().len(), 2);
        let filtered = list_behaviors(&test_db.pool, Some(rubble)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].skill_id, rubble);
    }

    #[tokio::test]
    async fn test_links_upsert_filter_and_cascade() {
        let test_db = TestDbBuilder::new()
            .skill("Trailing")
            .behavior("Trailing", "Start")
            .behavior("Trailing", "Indication")
            .exercise("Runaway")
            .exercise("Blind start")
            .build()
            .await
            .unwrap();
        let start = test_db.behavior_id("Start");
        let indication = test_db.behavior_id("Indication");
        let runaway = test_db.exercise_id("Runaway");
        let blind = test_db.exercise_id("Blind start");

        for strength in [0, 6] {
            assert!(matches!(
                link_behavior_exercise(&test_db.pool, start, runaway, strength).await,
                Err(AppError::Validation(_))
            ));
        }
        assert!(matches!(
            link_behavior_exercise(&test_db.pool, start, 999, 3).await,
            Err(AppError::Validation(_))
        ));

        link_behavior_exercise(&test_db.pool, start, runaway, 1).await.unwrap();
        let relinked = link_behavior_exercise(&test_db.pool, start, runaway, 4)
            .await
            .unwrap();
        assert_eq!(relinked.strength, 4);
        link_behavior_exercise(&test_db.pool, indication, runaway, 2)
            .await
            .unwrap();
        link_behavior_exercise(&test_db.pool, start, blind, 5).await.unwrap();

        assert_eq!(list_links(&test_db.pool, None, None).await.unwrap().len(), 3);
        assert_eq!(list_links(&test_db.pool, Some(start), None).await.unwrap().len(), 2);
        let exact = list_links(&test_db.pool, Some(start), Some(runaway)).await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].strength, 4);

        let for_start: Vec<String> = list_exercises(&test_db.pool, Some(start))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(for_start, vec!["Blind start".to_string(), "Runaway".to_string()]);

        unlink_behavior_exercise(&test_db.pool, start, blind).await.unwrap();
        assert!(matches!(
            unlink_behavior_exercise(&test_db.pool, start, blind).await,
            Err(AppError::NotFound(_))
        ));

        delete_exercise(&test_db.pool, runaway).await.unwrap();
        assert!(list_links(&test_db.pool, None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exercise_and_dog_in_use_cannot_be_deleted() {
        let test_db = TestDbBuilder::new()
            .skill("Trailing")
            .behavior("Trailing", "Start")
            .exercise("Runaway")
            .dog("Rex")
            .session()
            .build()
            .await
            .unwrap();

        record_round(
            &test_db.pool,
            RecordRound {
                session_id: test_db.session_id(),
                dog_id: test_db.dog_id("Rex"),
                exercise_id: test_db.exercise_id("Runaway"),
                planned_behavior_id: test_db.behavior_id("Start"),
                outcome: "fail".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            delete_exercise(&test_db.pool, test_db.exercise_id("Runaway")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            delete_behavior(&test_db.pool, test_db.behavior_id("Start")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            delete_dog(&test_db.pool, test_db.dog_id("Rex")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            delete_dog(&test_db.pool, 999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exhibited_behavior_cannot_be_deleted() {
        let test_db = TestDbBuilder::new()
            .skill("Trailing")
            .behavior("Trailing", "Start")
            .behavior("Trailing", "Indication")
            .exercise("Runaway")
            .dog("Rex")
            .session()
            .build()
            .await
            .unwrap();
        let indication = test_db.behavior_id("Indication");

        let round = record_round(
            &test_db.pool,
            RecordRound {
                session_id: test_db.session_id(),
                dog_id: test_db.dog_id("Rex"),
                exercise_id: test_db.exercise_id("Runaway"),
                planned_behavior_id: test_db.behavior_id("Start"),
                exhibited_behavior_id: Some(indication),
                outcome: "partial".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            delete_behavior(&test_db.pool, indication).await,
            Err(AppError::Conflict(_))
        ));

        let rounds = list_rounds(&test_db.pool, test_db.session_id()).await.unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].id, round.id);
        assert_eq!(rounds[0].exhibited_behavior_id, Some(indication));
    }

    #[tokio::test]
    async fn test_dog_fields() {
        let test_db = TestDbBuilder::new().build().await.unwrap();

        let dog = create_dog(&test_db.pool, "Bolt", Some("Bo".into()), Some("2021-06-15"))
            .await
            .unwrap();
        assert_eq!(dog.birthdate.map(|d| d.to_string()), Some("2021-06-15".into()));

        let updated = update_dog(&test_db.pool, dog.id, "Bolt", None, None)
            .await
            .unwrap();
        assert_eq!(updated.callname, None);
        assert_eq!(updated.birthdate, None);

        assert!(matches!(
            create_dog(&test_db.pool, "  ", None, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_dog(&test_db.pool, "Nova", None, Some("2021-13-01")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            get_dog(&test_db.pool, 999).await,
            Err(AppError::NotFound(_))
        ));
        assert!(
            create_exercise(&test_db.pool, "", None).await.is_err(),
            "blank exercise names are rejected"
        );
    }
}
