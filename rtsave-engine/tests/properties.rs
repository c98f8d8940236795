//! Coordination guarantees of a single save attempt.

mod support;

use rtsave_engine::collab::ErrorKind;
use rtsave_engine::record::now_millis;
use rtsave_engine::scheduler::{check, save_routine, Check, SkipReason};
use rtsave_engine::{MergeResult, SaveOutcome, SaverConfig, SaverError};
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::*;

#[tokio::test]
async fn test_at_most_one_attempt_in_flight() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.mark_edited().await;
    let gate = rig.backend.gate_merges();

    let Check::Started(first) = check(rig.session()).await else {
        panic!("first check should start an attempt");
    };
    gate.entered.notified().await;

    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::Busy)
    ));

    gate.release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), SaveOutcome::SaveNeeded);
    assert_eq!(rig.backend.merges(), 1);
    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::NotEdited)
    ));
}

#[tokio::test]
async fn test_manual_save_waits_for_running_attempt() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.mark_edited().await;
    let gate = rig.backend.gate_merges();

    let Check::Started(autosave) = check(rig.session()).await else {
        panic!("check should start an attempt");
    };
    gate.entered.notified().await;
    assert!(rig.session().guards.lock().await.attempt_in_flight);

    let driver = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.backend.merges(), 1, "manual save started a second merge");

        gate.release.notify_one();
        assert_eq!(autosave.await.unwrap().unwrap(), SaveOutcome::SaveNeeded);

        gate.entered.notified().await;
        assert_eq!(rig.backend.merges(), 2);
        gate.release.notify_one();
    };
    let (manual, ()) = tokio::join!(rig.saver.save_and_continue(), driver);

    assert!(manual.is_ok());
    assert!(!rig.session().guards.lock().await.attempt_in_flight);
    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::NotEdited)
    ));
}

#[tokio::test]
async fn test_save_gap_counts_from_start() {
    let config = SaverConfig {
        save_interval_ms: 60_000,
        ..test_config()
    };
    let rig = Rig::started(config, "v1", "v1 edited").await;
    rig.mark_edited().await;

    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::TooSoon { .. })
    ));
    assert_eq!(rig.backend.merges(), 0);
}

#[tokio::test]
async fn test_interrupt_discards_merge_result() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    let gate = rig.backend.gate_merges();
    rig.backend.script_merge(merge_result("server merged", true, true));

    let session = rig.session().clone();
    let attempt = tokio::spawn(async move { save_routine(&session, false, true).await });
    gate.entered.notified().await;

    // A peer with our editor type saves while the merge is on the wire.
    let _peer = announce(&rig.hub, "Main.WebHome-wiki", "wiki", peer_state("3.1", "bob")).await;
    let session = rig.session().clone();
    wait_for("peer save received", || {
        let session = session.clone();
        async move { session.record.read().await.version() == "3.1" }
    })
    .await;
    gate.release.notify_one();

    assert_eq!(attempt.await.unwrap().unwrap(), SaveOutcome::Interrupted);
    assert!(rig.surface.writes().is_empty());
    assert_eq!(rig.backend.saves(), 0);
    // The flag is consumed by the aborted attempt.
    assert!(!rig.session().record.read().await.received_isave);
}

#[tokio::test]
async fn test_interrupt_is_cleared_when_attempt_starts() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.session().record.write().await.received_isave = true;

    let outcome = save_routine(rig.session(), false, true).await.unwrap();
    assert_eq!(outcome, SaveOutcome::SaveNeeded);
}

#[tokio::test]
async fn test_edits_during_merge_make_result_stale() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    let gate = rig.backend.gate_merges();
    rig.backend.script_merge(merge_result("server merged", true, true));

    let session = rig.session().clone();
    let attempt = tokio::spawn(async move { save_routine(&session, false, true).await });
    gate.entered.notified().await;
    rig.surface.type_text("v1 edited again");
    gate.release.notify_one();

    assert_eq!(attempt.await.unwrap().unwrap(), SaveOutcome::Stale);
    assert_eq!(rig.surface.text(), "v1 edited again");
    assert!(rig.surface.writes().is_empty());
}

#[tokio::test]
async fn test_known_ancestor_is_not_reapplied() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.history.remember("ancestor");
    rig.backend.script_merge(MergeResult {
        previous_version_content: Some("ancestor".into()),
        ..merge_result("server merged", true, false)
    });

    let outcome = save_routine(rig.session(), false, true).await.unwrap();
    assert_eq!(outcome, SaveOutcome::NoSaveNeeded);
    assert!(rig.surface.writes().is_empty());
    assert_eq!(rig.surface.text(), "v1 edited");
}

#[tokio::test]
async fn test_new_merge_is_applied() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.backend.script_merge(MergeResult {
        previous_version_content: Some("unseen".into()),
        ..merge_result("server merged", true, true)
    });

    let outcome = save_routine(rig.session(), false, true).await.unwrap();
    assert_eq!(outcome, SaveOutcome::SaveNeeded);
    assert_eq!(rig.surface.writes(), vec![("server merged".to_string(), false)]);
}

#[tokio::test]
async fn test_repeated_save_is_a_no_op() {
    let rig = Rig::started(test_config(), "A", "A").await;
    rig.backend.script_merge(merge_result("A", false, false));
    rig.mark_edited().await;

    let Check::Started(attempt) = check(rig.session()).await else {
        panic!("attempt should start");
    };
    assert_eq!(attempt.await.unwrap().unwrap(), SaveOutcome::NoSaveNeeded);

    for _ in 0..2 {
        let outcome = save_routine(rig.session(), false, true).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Unchanged);
    }
    assert_eq!(rig.backend.merges(), 1);
}

#[tokio::test]
async fn test_unchanged_content_never_hits_network() {
    let rig = Rig::started(test_config(), "A", "A").await;
    rig.saver.set_last_saved_content("A").await;

    for _ in 0..2 {
        let outcome = save_routine(rig.session(), false, true).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Unchanged);
    }
    assert_eq!(rig.backend.merges(), 0);
}

#[tokio::test]
async fn test_guards_in_order() {
    let rig = Rig::started(
        SaverConfig {
            save_interval_ms: 60_000,
            ..test_config()
        },
        "v1",
        "v1 edited",
    )
    .await;

    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::NotEdited)
    ));

    rig.mark_edited().await;
    rig.session().record.write().await.time = now_millis();
    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::TooSoon { .. })
    ));

    rig.session().record.write().await.time = 0;
    let _prompt = rig.session().guards.lock().await.open_dialog();
    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::DialogOpen)
    ));
}

#[tokio::test]
async fn test_demo_mode_never_saves() {
    let config = SaverConfig {
        demo_mode: true,
        ..test_config()
    };
    let rig = Rig::started(config, "v1", "v1 edited").await;
    rig.mark_edited().await;

    assert!(matches!(
        check(rig.session()).await,
        Check::Skipped(SkipReason::DemoMode)
    ));
    assert_eq!(rig.backend.merges(), 0);
}

#[tokio::test]
async fn test_merge_failure_is_reported() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.backend
        .script_merge_error(SaverError::Transport("connection refused".into()));
    rig.backend
        .script_merge_error(SaverError::Parse("expected value".into()));

    assert!(save_routine(rig.session(), false, true).await.is_err());
    assert!(save_routine(rig.session(), false, true).await.is_err());

    assert_eq!(rig.reporter.kinds(), vec![ErrorKind::Merge, ErrorKind::Parse]);
    assert_eq!(rig.backend.saves(), 0);
    assert_eq!(rig.version().await, "1.1");
}

#[tokio::test]
async fn test_missing_content_aborts() {
    let rig = Rig::started(test_config(), "v1", "v1 edited").await;
    rig.surface.break_content();

    assert_eq!(
        save_routine(rig.session(), false, true).await,
        Err(SaverError::ContentUnavailable)
    );
    assert_eq!(rig.backend.merges(), 0);
}

#[tokio::test]
async fn test_safe_save_without_merge() {
    let config = SaverConfig {
        merge_content: false,
        ..test_config()
    };
    let rig = Rig::started(config, "v1", "v1 edited").await;

    let outcome = save_routine(rig.session(), false, true).await.unwrap();
    assert_eq!(outcome, SaveOutcome::SaveNeeded);
    assert_eq!(rig.backend.merges(), 0);

    let requests = rig.surface.safe_saves.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].force);
    assert!(requests[0].autosave);
    assert_eq!(requests[0].version, "1.1");
}

#[tokio::test]
async fn test_html_content_requests_conversion() {
    let config = SaverConfig {
        is_html: true,
        ..test_config()
    };
    let rig = Rig::started(config, "v1", "<p>v1</p>").await;
    save_routine(rig.session(), false, true).await.unwrap();

    let request = rig.backend.last_merge.lock().unwrap().clone().unwrap();
    assert_eq!(request.convert_html, Some(1));
    assert_eq!(request.doc.document, "Main.WebHome");
    assert_eq!(rig.backend.version_calls.load(Ordering::SeqCst), 0);
}
