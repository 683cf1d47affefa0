use notifold_core::db::open_db_in_memory;
use notifold_core::{
    ActivityPayload, EngineConfig, NotificationService, NotificationServiceError,
    NotificationStatus, RepoError, SqliteNotificationRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
// 2018-11-10T00:00:00Z
const DAY_ZERO: i64 = 1_541_808_000_000;
const WINDOW_MS: i64 = 7 * DAY_MS;

fn activity_on(target: Uuid, action: &str) -> ActivityPayload {
    ActivityPayload {
        id: Some(Uuid::new_v4().to_string()),
        actor: Some(Uuid::new_v4().to_string()),
        target_model: Some("Page".to_string()),
        target: Some(target.to_string()),
        action: Some(action.to_string()),
        created_at: None,
    }
}

fn comment_on(target: Uuid) -> ActivityPayload {
    activity_on(target, "COMMENT")
}

fn total_notifications(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM notifications;", [], |row| row.get(0))
        .unwrap()
}

fn total_activities(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM activities;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn first_activity_creates_unread_notification() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();
    let payload = comment_on(target);

    let notification = service
        .upsert_by_activity(recipient, &payload, Some(DAY_ZERO))
        .unwrap();

    assert_eq!(notification.user, recipient);
    assert_eq!(notification.target, target);
    assert_eq!(notification.target_model.as_str(), "Page");
    assert_eq!(notification.action.as_str(), "COMMENT");
    assert_eq!(notification.status, NotificationStatus::Unread);
    assert_eq!(notification.activities.len(), 1);
    assert_eq!(
        notification.activities[0].id.to_string(),
        payload.id.clone().unwrap()
    );
    assert_eq!(notification.created_at, DAY_ZERO);
    assert_eq!(notification.updated_at, DAY_ZERO);
    assert_eq!(notification.activities[0].created_at, DAY_ZERO);
}

#[test]
fn activity_within_window_folds_into_same_notification() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();
    let first = comment_on(target);
    let second = comment_on(target);

    let created = service
        .upsert_by_activity(recipient, &first, Some(DAY_ZERO))
        .unwrap();
    let folded = service
        .upsert_by_activity(recipient, &second, Some(DAY_ZERO + DAY_MS))
        .unwrap();

    assert_eq!(folded.id, created.id);
    assert_eq!(folded.created_at, DAY_ZERO);
    assert_eq!(folded.updated_at, DAY_ZERO + DAY_MS);
    let ids: Vec<String> = folded
        .activities
        .iter()
        .map(|activity| activity.id.to_string())
        .collect();
    assert_eq!(ids, vec![first.id.unwrap(), second.id.unwrap()]);

    let stored = service.get_notification(created.id).unwrap().unwrap();
    assert_eq!(stored, folded);
}

#[test]
fn six_days_later_still_one_notification() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
        let mut service = NotificationService::new(repo);
        let recipient = Uuid::new_v4();
        let target = Uuid::new_v4();
        service
            .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
            .unwrap();
        service
            .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + 6 * DAY_MS))
            .unwrap();
    }
    assert_eq!(total_notifications(&conn), 1);
}

#[test]
fn seven_days_later_starts_second_notification() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
        let mut service = NotificationService::new(repo);
        let recipient = Uuid::new_v4();
        let target = Uuid::new_v4();
        let first = service
            .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
            .unwrap();
        let second = service
            .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + 7 * DAY_MS))
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.activities.len(), 1);
    }
    assert_eq!(total_notifications(&conn), 2);
}

#[test]
fn window_boundary_is_exclusive_at_exact_window_length() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let inside_target = Uuid::new_v4();
    let edge_target = Uuid::new_v4();

    let inside = service
        .upsert_by_activity(recipient, &comment_on(inside_target), Some(DAY_ZERO))
        .unwrap();
    let inside_again = service
        .upsert_by_activity(
            recipient,
            &comment_on(inside_target),
            Some(DAY_ZERO + WINDOW_MS - 1),
        )
        .unwrap();
    assert_eq!(inside_again.id, inside.id);

    let edge = service
        .upsert_by_activity(recipient, &comment_on(edge_target), Some(DAY_ZERO))
        .unwrap();
    let edge_again = service
        .upsert_by_activity(recipient, &comment_on(edge_target), Some(DAY_ZERO + WINDOW_MS))
        .unwrap();
    assert_ne!(edge_again.id, edge.id);
}

#[test]
fn window_slides_from_most_recent_fold() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();

    let first = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
        .unwrap();
    service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + 6 * DAY_MS))
        .unwrap();
    // 12 days after creation but only 6 after the last fold.
    let third = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + 12 * DAY_MS))
        .unwrap();

    assert_eq!(third.id, first.id);
    assert_eq!(third.activities.len(), 3);
    assert_eq!(
        service.find_latest_by_user(recipient, None, 0).unwrap().total,
        1
    );
}

#[test]
fn configured_window_replaces_one_week_default() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let config = EngineConfig {
        aggregation_window_ms: DAY_MS,
        ..EngineConfig::default()
    };
    let mut service = NotificationService::with_config(repo, config).unwrap();
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();

    let first = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
        .unwrap();
    let second = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + 2 * DAY_MS))
        .unwrap();
    assert_ne!(first.id, second.id);
}

#[test]
fn unsupported_target_model_is_rejected_without_side_effects() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
        let mut service = NotificationService::new(repo);
        let recipient = Uuid::new_v4();
        let mut payload = comment_on(Uuid::new_v4());
        payload.target_model = Some("Page2".to_string());

        let err = service
            .upsert_by_activity(recipient, &payload, Some(DAY_ZERO))
            .unwrap_err();
        assert!(matches!(err, NotificationServiceError::Validation(_)));
        assert!(err.to_string().starts_with("Validation failed"));
    }
    assert_eq!(total_notifications(&conn), 0);
    assert_eq!(total_activities(&conn), 0);
}

#[test]
fn invalid_activity_does_not_touch_open_notification() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();

    let created = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
        .unwrap();
    service.read(recipient).unwrap();

    let mut missing_actor = comment_on(target);
    missing_actor.actor = None;
    let err = service
        .upsert_by_activity(recipient, &missing_actor, Some(DAY_ZERO + DAY_MS))
        .unwrap_err();
    assert!(matches!(err, NotificationServiceError::Validation(_)));

    let stored = service.get_notification(created.id).unwrap().unwrap();
    assert_eq!(stored.status, NotificationStatus::Read);
    assert_eq!(stored.updated_at, DAY_ZERO);
    assert_eq!(stored.activities.len(), 1);
}

#[test]
fn different_action_or_recipient_gets_separate_notification() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let target = Uuid::new_v4();

    let comment = service
        .upsert_by_activity(alice, &comment_on(target), Some(DAY_ZERO))
        .unwrap();
    let like = service
        .upsert_by_activity(alice, &activity_on(target, "LIKE"), Some(DAY_ZERO))
        .unwrap();
    let for_bob = service
        .upsert_by_activity(bob, &comment_on(target), Some(DAY_ZERO))
        .unwrap();

    assert_ne!(comment.id, like.id);
    assert_ne!(comment.id, for_bob.id);
    assert_eq!(service.find_latest_by_user(alice, None, 0).unwrap().total, 2);
    assert_eq!(service.find_latest_by_user(bob, None, 0).unwrap().total, 1);
}

#[test]
fn fold_resets_read_notification_to_unread() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();

    service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
        .unwrap();
    service.read(recipient).unwrap();
    assert_eq!(service.get_unread_count_by_user(recipient).unwrap(), 0);

    let folded = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + DAY_MS))
        .unwrap();
    assert_eq!(folded.status, NotificationStatus::Unread);
    assert_eq!(service.get_unread_count_by_user(recipient).unwrap(), 1);
}

#[test]
fn fold_resets_opened_notification_to_unread() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();

    let created = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO))
        .unwrap();
    service.open(recipient, created.id).unwrap();

    let folded = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + DAY_MS))
        .unwrap();
    assert_eq!(folded.id, created.id);
    assert_eq!(folded.status, NotificationStatus::Unread);
}

#[test]
fn backdated_activity_folds_without_rewinding_updated_at() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();

    service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + 3 * DAY_MS))
        .unwrap();
    let folded = service
        .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + DAY_MS))
        .unwrap();

    assert_eq!(folded.activities.len(), 2);
    assert_eq!(folded.updated_at, DAY_ZERO + 3 * DAY_MS);
}

#[test]
fn activity_list_is_bounded_and_keeps_newest() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let config = EngineConfig {
        max_activities_per_notification: 2,
        ..EngineConfig::default()
    };
    let mut service = NotificationService::with_config(repo, config).unwrap();
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();
    let payloads: Vec<ActivityPayload> = (0..4).map(|_| comment_on(target)).collect();

    let mut last = None;
    for (idx, payload) in payloads.iter().enumerate() {
        last = Some(
            service
                .upsert_by_activity(recipient, payload, Some(DAY_ZERO + idx as i64))
                .unwrap(),
        );
    }
    let last = last.unwrap();

    let kept: Vec<String> = last
        .activities
        .iter()
        .map(|activity| activity.id.to_string())
        .collect();
    assert_eq!(
        kept,
        vec![
            payloads[2].id.clone().unwrap(),
            payloads[3].id.clone().unwrap()
        ]
    );
    let stored = service.get_notification(last.id).unwrap().unwrap();
    assert_eq!(stored.activities, last.activities);
}

#[test]
fn trimmed_activities_are_deleted_unless_still_linked() {
    let mut conn = open_db_in_memory().unwrap();
    let recipient = Uuid::new_v4();
    let other = Uuid::new_v4();
    let target = Uuid::new_v4();
    let shared = comment_on(target);
    {
        let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
        let config = EngineConfig {
            max_activities_per_notification: 2,
            ..EngineConfig::default()
        };
        let mut service = NotificationService::with_config(repo, config).unwrap();

        service
            .upsert_by_activity(other, &shared, Some(DAY_ZERO))
            .unwrap();
        service
            .upsert_by_activity(recipient, &shared, Some(DAY_ZERO))
            .unwrap();
        for idx in 1..=5 {
            service
                .upsert_by_activity(recipient, &comment_on(target), Some(DAY_ZERO + idx))
                .unwrap();
        }
    }

    // Two kept for the recipient, plus the shared one still linked to `other`.
    assert_eq!(total_activities(&conn), 3);
    let shared_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM activities WHERE id = ?1;",
            [shared.id.as_deref().unwrap()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(shared_rows, 1);
}

#[test]
fn replayed_activity_id_with_different_fields_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let original = comment_on(Uuid::new_v4());
    let mut altered = activity_on(Uuid::new_v4(), "LIKE");
    altered.id = original.id.clone();
    altered.actor = original.actor.clone();
    let activity_id = Uuid::parse_str(original.id.as_deref().unwrap()).unwrap();

    let created = service
        .upsert_by_activity(recipient, &original, Some(DAY_ZERO))
        .unwrap();
    let err = service
        .upsert_by_activity(recipient, &altered, Some(DAY_ZERO + 1))
        .unwrap_err();
    assert!(matches!(
        err,
        NotificationServiceError::Repo(RepoError::ConflictingActivity(id)) if id == activity_id
    ));

    let latest = service.find_latest_by_user(recipient, None, 0).unwrap();
    assert_eq!(latest.total, 1);
    assert_eq!(latest.items, vec![created]);
}

#[test]
fn identical_replay_folds_into_open_notification() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let mut payload = comment_on(Uuid::new_v4());
    payload.created_at = Some(DAY_ZERO);

    let created = service
        .upsert_by_activity(recipient, &payload, Some(DAY_ZERO))
        .unwrap();
    let replayed = service
        .upsert_by_activity(recipient, &payload, Some(DAY_ZERO + 1))
        .unwrap();

    assert_eq!(replayed.id, created.id);
    assert_eq!(replayed.activities.len(), 2);
    assert_eq!(replayed.activities[0], replayed.activities[1]);
}

#[test]
fn invalid_config_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let config = EngineConfig {
        max_activities_per_notification: 0,
        ..EngineConfig::default()
    };
    let err = NotificationService::with_config(repo, config)
        .err()
        .expect("zero activity bound must be rejected");
    assert!(matches!(err, NotificationServiceError::InvalidConfig(_)));
}

#[test]
fn actors_list_distinct_users_newest_first() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let recipient = Uuid::new_v4();
    let target = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    for (offset, actor) in [alice, bob, alice].into_iter().enumerate() {
        let mut payload = comment_on(target);
        payload.actor = Some(actor.to_string());
        service
            .upsert_by_activity(recipient, &payload, Some(DAY_ZERO + offset as i64))
            .unwrap();
    }

    let page = service.find_latest_by_user(recipient, None, 0).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].actors(), vec![alice, bob]);
}

#[test]
fn removing_activity_prunes_notifications_left_empty() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteNotificationRepository::try_new(&mut conn).unwrap();
    let mut service = NotificationService::new(repo);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let target = Uuid::new_v4();
    let shared = comment_on(target);
    let shared_id = Uuid::parse_str(shared.id.as_deref().unwrap()).unwrap();

    let for_alice = service
        .upsert_by_activity(alice, &shared, Some(DAY_ZERO))
        .unwrap();
    service
        .upsert_by_activity(alice, &comment_on(target), Some(DAY_ZERO + 1))
        .unwrap();
    let for_bob = service
        .upsert_by_activity(bob, &shared, Some(DAY_ZERO))
        .unwrap();

    let summary = service.remove_activity(shared_id).unwrap();
    assert_eq!(summary.detached, 2);
    assert_eq!(summary.removed_notifications, 1);

    assert!(service.get_notification(for_bob.id).unwrap().is_none());
    let remaining = service.get_notification(for_alice.id).unwrap().unwrap();
    assert_eq!(remaining.activities.len(), 1);
    assert_ne!(remaining.activities[0].id, shared_id);
}
