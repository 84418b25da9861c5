//! Manager-level lifecycle tests: policy enforcement, rotation chains,
//! reuse containment, logout, and the expiry sweep.
//!
//! All tests skip unless `TEST_DATABASE_URL` points at a Postgres
//! database.

use std::sync::Arc;

use advisory_backend::{
    models::session::{RevocationReason, SessionStatus},
    models::user::UserRole,
    services::session::SessionError,
    services::session_cleanup::SessionCleanup,
    utils::device::RequestMeta,
    utils::jwt,
};
use chrono::Duration;
use uuid::Uuid;

mod support;

use support::{
    backdate_session, count_active_sessions, manager, seed_user, try_test_pool, TEST_JWT_SECRET,
    UA_CHROME, UA_FIREFOX, UA_SAFARI,
};

async fn integration_guard() -> tokio::sync::MutexGuard<'static, ()> {
    static GUARD: std::sync::OnceLock<tokio::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD
        .get_or_init(|| tokio::sync::Mutex::new(()))
        .lock()
        .await
}

#[tokio::test]
async fn single_policy_replaces_previous_session() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);

    let s1 = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.1", UA_CHROME),
            &user.role,
        )
        .await
        .expect("create first session");
    let s2 = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.2", UA_FIREFOX),
            &user.role,
        )
        .await
        .expect("create second session");

    match mgr.validate_session(&s1.session_id).await.unwrap_err() {
        SessionError::Revoked {
            reason,
            replaced_by,
            revoked_at,
        } => {
            assert_eq!(reason, Some(RevocationReason::Replaced));
            assert_eq!(replaced_by.as_deref(), Some(s2.session_id.as_str()));
            assert!(revoked_at.is_some());
        }
        other => panic!("expected SESSION_REVOKED, got {other:?}"),
    }

    assert!(mgr.validate_session(&s2.session_id).await.is_ok());
    assert_eq!(count_active_sessions(&pool, user.id).await, 1);
}

#[tokio::test]
async fn unlimited_policy_keeps_all_sessions_active() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, Some("unlimited")).await;
    let mgr = manager(&pool);

    for (addr, agent) in [
        ("198.51.100.1", UA_CHROME),
        ("198.51.100.2", UA_FIREFOX),
        ("198.51.100.3", UA_SAFARI),
    ] {
        let issued = mgr
            .create_session(user.id, &user.email, &RequestMeta::new(addr, agent), &user.role)
            .await
            .expect("create session");
        assert!(mgr.validate_session(&issued.session_id).await.is_ok());
    }

    assert_eq!(count_active_sessions(&pool, user.id).await, 3);
}

#[tokio::test]
async fn bounded_two_policy_displaces_only_the_oldest() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, Some("bounded_two")).await;
    let mgr = manager(&pool);

    let s1 = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.1", UA_CHROME),
            &user.role,
        )
        .await
        .expect("create s1");
    assert_eq!(count_active_sessions(&pool, user.id).await, 1);

    let s2 = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.2", UA_FIREFOX),
            &user.role,
        )
        .await
        .expect("create s2");
    assert_eq!(count_active_sessions(&pool, user.id).await, 2);

    let s3 = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.3", UA_SAFARI),
            &user.role,
        )
        .await
        .expect("create s3");
    assert_eq!(count_active_sessions(&pool, user.id).await, 2);

    // Oldest displaced, newer two alive.
    match mgr.validate_session(&s1.session_id).await.unwrap_err() {
        SessionError::Revoked {
            reason, replaced_by, ..
        } => {
            assert_eq!(reason, Some(RevocationReason::Replaced));
            assert_eq!(replaced_by.as_deref(), Some(s3.session_id.as_str()));
        }
        other => panic!("expected SESSION_REVOKED, got {other:?}"),
    }
    assert!(mgr.validate_session(&s2.session_id).await.is_ok());
    assert!(mgr.validate_session(&s3.session_id).await.is_ok());
}

#[tokio::test]
async fn refresh_rotates_and_builds_an_append_only_chain() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);
    let meta = RequestMeta::new("198.51.100.1", UA_CHROME);

    let issued = mgr
        .create_session(user.id, &user.email, &meta, &user.role)
        .await
        .expect("create session");
    let refreshed = mgr
        .refresh_session(&issued.refresh_token, &meta)
        .await
        .expect("refresh");

    let predecessor = mgr
        .get_session(&issued.session_id)
        .await
        .expect("lookup")
        .expect("predecessor exists");
    let successor = mgr
        .get_session(&refreshed.session_id)
        .await
        .expect("lookup")
        .expect("successor exists");

    assert_eq!(predecessor.status, SessionStatus::Rotated);
    assert!(predecessor.rotated_at.is_some());
    assert_eq!(
        successor.rotated_from.as_deref(),
        Some(issued.session_id.as_str())
    );
    assert_eq!(successor.device_id, predecessor.device_id);
    assert!(predecessor.created_at < successor.created_at);

    // The new pair keeps working.
    assert!(mgr.validate_session(&refreshed.session_id).await.is_ok());
}

#[tokio::test]
async fn reused_refresh_token_locks_out_the_device_family() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);
    let meta = RequestMeta::new("198.51.100.1", UA_CHROME);

    let issued = mgr
        .create_session(user.id, &user.email, &meta, &user.role)
        .await
        .expect("create session");
    let refreshed = mgr
        .refresh_session(&issued.refresh_token, &meta)
        .await
        .expect("first refresh");

    // Replay of the consumed token fails and burns the family, including
    // the session created after the reused token.
    let err = mgr
        .refresh_session(&issued.refresh_token, &meta)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Rotated), "got {err:?}");

    match mgr.validate_session(&refreshed.session_id).await.unwrap_err() {
        SessionError::Revoked { reason, .. } => {
            assert_eq!(reason, Some(RevocationReason::Reuse));
        }
        other => panic!("expected family revocation, got {other:?}"),
    }
    assert_eq!(count_active_sessions(&pool, user.id).await, 0);
}

#[tokio::test]
async fn well_signed_token_for_unknown_session_revokes_family() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);
    let meta = RequestMeta::new("198.51.100.1", UA_CHROME);

    let issued = mgr
        .create_session(user.id, &user.email, &meta, &user.role)
        .await
        .expect("create session");

    let forged = jwt::issue_refresh_token(
        user.id,
        &user.email,
        &Uuid::new_v4().to_string(),
        &issued.device_id,
        TEST_JWT_SECRET,
        7,
    )
    .expect("forge token");

    let err = mgr.refresh_session(&forged, &meta).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound), "got {err:?}");

    match mgr.validate_session(&issued.session_id).await.unwrap_err() {
        SessionError::Revoked { reason, .. } => {
            assert_eq!(reason, Some(RevocationReason::Reuse));
        }
        other => panic!("expected family revocation, got {other:?}"),
    }
}

#[tokio::test]
async fn logout_marks_device_sessions_logged_out() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);

    let issued = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.1", UA_CHROME),
            &user.role,
        )
        .await
        .expect("create session");

    let count = mgr
        .logout_user(user.id, &issued.device_id)
        .await
        .expect("logout");
    assert_eq!(count, 1);

    match mgr.validate_session(&issued.session_id).await.unwrap_err() {
        SessionError::Invalid { reason } => assert_eq!(reason, "session_logged_out"),
        other => panic!("expected SESSION_INVALID, got {other:?}"),
    }
}

#[tokio::test]
async fn tampered_refresh_token_is_rejected_without_side_effects() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);
    let meta = RequestMeta::new("198.51.100.1", UA_CHROME);

    let issued = mgr
        .create_session(user.id, &user.email, &meta, &user.role)
        .await
        .expect("create session");

    let signed_elsewhere =
        jwt::issue_refresh_token(user.id, &user.email, &issued.session_id, &issued.device_id,
            "some-other-secret", 7)
        .expect("issue");
    let err = mgr.refresh_session(&signed_elsewhere, &meta).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidToken), "got {err:?}");

    // A signature failure is not reuse; the session survives.
    assert!(mgr.validate_session(&issued.session_id).await.is_ok());
}

#[tokio::test]
async fn cleanup_deletes_rows_past_retention_and_is_idempotent() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);

    let issued = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.1", UA_CHROME),
            &user.role,
        )
        .await
        .expect("create session");
    backdate_session(&pool, &issued.session_id, 8).await;

    let deleted = mgr
        .cleanup_expired(Duration::days(7))
        .await
        .expect("first sweep");
    assert!(deleted >= 1);

    let err = mgr.validate_session(&issued.session_id).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound), "got {err:?}");

    let deleted_again = mgr
        .cleanup_expired(Duration::days(7))
        .await
        .expect("second sweep");
    assert_eq!(deleted_again, 0);
}

#[tokio::test]
async fn sweep_marks_lapsed_sessions_expired_inside_retention() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);

    let issued = mgr
        .create_session(
            user.id,
            &user.email,
            &RequestMeta::new("198.51.100.1", UA_CHROME),
            &user.role,
        )
        .await
        .expect("create session");
    // Older than the 7-day refresh lifetime, younger than retention.
    backdate_session(&pool, &issued.session_id, 10).await;

    mgr.cleanup_expired(Duration::days(30)).await.expect("sweep");

    let session = mgr
        .get_session(&issued.session_id)
        .await
        .expect("lookup")
        .expect("row kept inside retention");
    assert_eq!(session.status, SessionStatus::Revoked);
    assert_eq!(session.reason, Some(RevocationReason::Expired));
}

#[tokio::test]
async fn cleanup_scheduler_runs_on_demand() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let mgr = Arc::new(manager(&pool));
    let cleanup = SessionCleanup::new(mgr, 3600, 30);

    let first = cleanup.run_once().await.expect("run");
    assert!(first.is_some(), "an idle scheduler must accept a run");
}

#[tokio::test]
async fn concurrent_logins_never_violate_single_policy() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);

    let meta_a = RequestMeta::new("198.51.100.1", UA_CHROME);
    let meta_b = RequestMeta::new("198.51.100.2", UA_FIREFOX);
    let (a, b) = tokio::join!(
        mgr.create_session(
            user.id,
            &user.email,
            &meta_a,
            &user.role,
        ),
        mgr.create_session(
            user.id,
            &user.email,
            &meta_b,
            &user.role,
        ),
    );
    a.expect("first concurrent login");
    b.expect("second concurrent login");

    assert_eq!(count_active_sessions(&pool, user.id).await, 1);
}

#[tokio::test]
async fn concurrent_refreshes_of_one_token_let_exactly_one_win() {
    let _guard = integration_guard().await;
    let Some(pool) = try_test_pool().await else { return };
    let user = seed_user(&pool, UserRole::Client, None).await;
    let mgr = manager(&pool);
    let meta = RequestMeta::new("198.51.100.1", UA_CHROME);

    let issued = mgr
        .create_session(user.id, &user.email, &meta, &user.role)
        .await
        .expect("create session");

    let (a, b) = tokio::join!(
        mgr.refresh_session(&issued.refresh_token, &meta),
        mgr.refresh_session(&issued.refresh_token, &meta),
    );
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one refresh must win the CAS");

    // The loser treated the race as reuse and burned the family, so not
    // even the winner's successor stays active.
    assert_eq!(count_active_sessions(&pool, user.id).await, 0);
}
