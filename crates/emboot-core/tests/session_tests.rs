//! Integration tests for the bootstrap Session
//!
//! These tests drive the whole lifecycle against the recording MockHal:
//! - Provisioning, pre-run hook ordering and guest release
//! - Sync requests, queued behind the initial load and matched by handle
//! - Progress reporting and the first-frame gate
//! - Audio unlock on user gestures
//! - Fatal errors and context loss

use emboot_core::constants::{
    CONTEXT_LOST_MESSAGE, CONTEXT_UNAVAILABLE_MESSAGE, DOWNLOADS_COMPLETE_TEXT, GUEST_ENV,
    MOUNT_PATH, STORAGE_RUN_DEPENDENCY,
};
use emboot_core::testing::{MockEvent, MockHal, RecordingGuest, RunDependencyEvent};
use emboot_core::{
    AudioState, BootConfig, BootError, BootPhase, Completion, CorrelationHandle, GateAction,
    HalError, LoadPhase, Session, SyncDirection, SyncError,
};
use futures_util::FutureExt;

fn session(hal: MockHal) -> Session<MockHal> {
    Session::new(hal, BootConfig::default()).unwrap()
}

/// Provisioned and pre-run session whose initial load is still in flight
fn mounted(hal: MockHal) -> (Session<MockHal>, RecordingGuest) {
    let guest = RecordingGuest::new();
    let mut session = session(hal);
    session.provision_context().unwrap();
    session.pre_run(Box::new(guest.clone())).unwrap();
    (session, guest)
}

/// Session with the initial load completed and the guest released
fn running(hal: MockHal) -> (Session<MockHal>, RecordingGuest) {
    let (mut session, guest) = mounted(hal);
    let (initial_id, _) = session.hal().sync_starts()[0];
    session.notify_sync_complete(initial_id, None);
    (session, guest)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_full_bootstrap_lifecycle() {
    let (mut session, guest) = mounted(MockHal::new().with_extensions(&["EXT_color_buffer_float"]));

    assert_eq!(session.phase(), BootPhase::Mounted);
    for (key, value) in GUEST_ENV {
        assert_eq!(session.hal().env(key).as_deref(), Some(*value));
    }
    assert!(session.hal().has_dir(MOUNT_PATH));
    assert_eq!(session.hal().mount_calls(), 1);

    // Guest held back until the initial load completes
    assert_eq!(
        session.hal().outstanding_run_dependencies(),
        vec![STORAGE_RUN_DEPENDENCY.to_string()]
    );
    assert_eq!(session.hal().sync_starts(), vec![(1, SyncDirection::Load)]);

    let completion = session.notify_sync_complete(1, None);
    assert!(matches!(completion, Completion::InitialLoad(ref o) if o.success()));
    assert_eq!(session.phase(), BootPhase::Running);
    assert!(session.hal().outstanding_run_dependencies().is_empty());
    assert_eq!(
        session.hal().run_dependency_events(),
        vec![
            RunDependencyEvent::Added(STORAGE_RUN_DEPENDENCY.to_string()),
            RunDependencyEvent::Removed(STORAGE_RUN_DEPENDENCY.to_string()),
        ]
    );

    // The initial load is internal to the shell
    assert!(guest.calls().is_empty());
}

#[test]
fn test_pre_run_requires_context() {
    let mut session = session(MockHal::new());
    let err = session.pre_run(Box::new(RecordingGuest::new())).unwrap_err();
    assert!(matches!(err, BootError::OutOfOrder { step: "pre_run", .. }));
    assert_eq!(session.hal().mount_calls(), 0);
}

#[test]
fn test_pre_run_is_idempotent() {
    let (mut session, _guest) = mounted(MockHal::new());
    session.pre_run(Box::new(RecordingGuest::new())).unwrap();

    assert_eq!(session.hal().mount_calls(), 1);
    assert_eq!(session.hal().sync_starts().len(), 1);
    assert_eq!(session.hal().outstanding_run_dependencies().len(), 1);
}

#[test]
fn test_failed_initial_load_still_releases_guest() {
    let (mut session, guest) = mounted(MockHal::new());
    let completion = session.notify_sync_complete(1, Some("InvalidStateError".into()));

    assert!(matches!(completion, Completion::InitialLoad(ref o) if !o.success()));
    assert_eq!(session.phase(), BootPhase::Running);
    assert!(session.hal().outstanding_run_dependencies().is_empty());
    assert!(guest.calls().is_empty());
}

#[test]
fn test_mount_failure_is_fatal() {
    let guest = RecordingGuest::new();
    let mut session = session(MockHal::new().with_fs_failure(HalError::Host("SecurityError".into())));
    session.provision_context().unwrap();

    assert!(matches!(session.pre_run(Box::new(guest.clone())), Err(BootError::Mount(_))));
    assert_eq!(session.phase(), BootPhase::Failed);
    assert!(session.hal().sync_starts().is_empty());
    assert!(session.hal().run_dependency_events().is_empty());
}

#[test]
fn test_guest_env_failure_is_fatal() {
    let mut session = session(MockHal::new().with_env_failure(HalError::Unavailable("ENV".into())));
    session.provision_context().unwrap();

    assert!(matches!(
        session.pre_run(Box::new(RecordingGuest::new())),
        Err(BootError::Hal(HalError::Unavailable(_)))
    ));
    assert_eq!(session.phase(), BootPhase::Failed);
    assert!(session.progress().is_failed());
    assert_eq!(session.hal().mount_calls(), 0);
    assert!(session.hal().run_dependency_events().is_empty());
    assert_eq!(session.hal().failure_shown(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let config = BootConfig {
        canvas_id: String::new(),
        ..BootConfig::default()
    };
    assert!(matches!(
        Session::new(MockHal::new(), config),
        Err(BootError::Config(_))
    ));
}

// =============================================================================
// Provisioning Tests
// =============================================================================

#[test]
fn test_unavailable_context_is_fatal() {
    let mut session = session(MockHal::new().without_context());

    assert!(matches!(session.provision_context(), Err(BootError::Provision(_))));
    assert_eq!(session.phase(), BootPhase::Failed);
    assert_eq!(
        session.hal().status_texts(),
        vec![CONTEXT_UNAVAILABLE_MESSAGE.to_string()]
    );

    // Nothing else may run
    assert!(matches!(
        session.pre_run(Box::new(RecordingGuest::new())),
        Err(BootError::Failed)
    ));
    assert!(matches!(session.provision_context(), Err(BootError::Failed)));
    assert_eq!(session.hal().requested_attributes().len(), 1);
    assert_eq!(session.hal().mount_calls(), 0);
}

#[test]
fn test_provision_is_idempotent() {
    let mut session = session(MockHal::new().with_extensions(&["A"]));
    let first = session.provision_context().unwrap().clone();
    let second = session.provision_context().unwrap().clone();

    assert_eq!(first, second);
    assert_eq!(session.hal().requested_attributes().len(), 1);
    assert_eq!(session.hal().enabled_extensions(), vec!["A"]);
}

// =============================================================================
// Sync Tests
// =============================================================================

#[test]
fn test_sync_before_pre_run_not_mounted() {
    let mut session = session(MockHal::new());
    session.provision_context().unwrap();

    let err = session
        .request_sync(SyncDirection::Save, CorrelationHandle(1))
        .unwrap_err();
    assert!(matches!(err, BootError::Sync(SyncError::NotMounted)));
    assert!(session.hal().sync_starts().is_empty());
}

#[test]
fn test_requests_during_initial_load_start_afterwards() {
    let (mut session, guest) = mounted(MockHal::new());

    let ticket = session
        .request_sync(SyncDirection::Save, CorrelationHandle(0x1000))
        .unwrap();
    assert_eq!(session.hal().sync_starts().len(), 1);

    session.notify_sync_complete(1, None);
    assert_eq!(
        session.hal().sync_starts(),
        vec![(1, SyncDirection::Load), (ticket.request_id(), SyncDirection::Save)]
    );

    session.notify_sync_complete(ticket.request_id(), None);
    assert_eq!(guest.calls(), vec![(false, None, CorrelationHandle(0x1000))]);
    assert!(ticket.now_or_never().unwrap().unwrap().success());
}

#[test]
fn test_each_handle_gets_exactly_one_callback() {
    let (mut session, guest) = running(MockHal::new());

    let handles = [CorrelationHandle(1), CorrelationHandle(2), CorrelationHandle(3)];
    let tickets: Vec<_> = handles
        .iter()
        .map(|h| session.request_sync(SyncDirection::Save, *h).unwrap())
        .collect();

    // Complete in reverse order, the middle one failing
    session.notify_sync_complete(tickets[2].request_id(), None);
    session.notify_sync_complete(tickets[1].request_id(), Some("QuotaExceededError".into()));
    session.notify_sync_complete(tickets[0].request_id(), None);
    // Repeated host completion is dropped
    assert_eq!(
        session.notify_sync_complete(tickets[0].request_id(), None),
        Completion::Orphan
    );

    assert_eq!(
        guest.calls(),
        vec![
            (false, None, CorrelationHandle(3)),
            (false, Some("QuotaExceededError".to_string()), CorrelationHandle(2)),
            (false, None, CorrelationHandle(1)),
        ]
    );
    assert_eq!(session.bridge().map(|b| b.pending_count()), Some(0));
}

#[test]
fn test_load_direction_reported_to_guest() {
    let (mut session, guest) = running(MockHal::new());
    let ticket = session
        .request_sync(SyncDirection::Load, CorrelationHandle(CorrelationHandle::MAX_JS_SAFE))
        .unwrap();
    session.notify_sync_complete(ticket.request_id(), None);

    assert_eq!(
        guest.calls(),
        vec![(true, None, CorrelationHandle(CorrelationHandle::MAX_JS_SAFE))]
    );
}

#[test]
fn test_duplicate_handle_rejected_without_callback() {
    let (mut session, guest) = running(MockHal::new());

    let first = session
        .request_sync(SyncDirection::Save, CorrelationHandle(9))
        .unwrap();
    let err = session
        .request_sync(SyncDirection::Save, CorrelationHandle(9))
        .unwrap_err();
    assert!(matches!(err, BootError::Sync(SyncError::HandleInFlight(CorrelationHandle(9)))));

    session.notify_sync_complete(first.request_id(), None);
    assert_eq!(guest.calls().len(), 1);
}

#[test]
fn test_orphan_completion_before_mount() {
    let mut session = session(MockHal::new());
    assert_eq!(session.notify_sync_complete(1, None), Completion::Orphan);
}

// =============================================================================
// Progress Tests
// =============================================================================

#[test]
fn test_dependency_signals_drive_status() {
    let mut session = session(MockHal::new());

    for remaining in [5, 5, 4, 3, 3, 0] {
        session.monitor_run_dependencies(remaining);
        session.hal().advance_ms(100.0);
    }

    assert_eq!(
        session.hal().progress_updates(),
        vec![Some((0, 500)), Some((100, 500)), Some((200, 500)), None]
    );
    assert_eq!(
        session.hal().status_texts().last().map(String::as_str),
        Some(DOWNLOADS_COMPLETE_TEXT)
    );
    assert_eq!(session.progress().phase(), LoadPhase::Complete);

    // No second loading phase
    session.monitor_run_dependencies(2);
    assert_eq!(session.progress().phase(), LoadPhase::Complete);
    assert_eq!(session.hal().progress_updates().len(), 4);
}

#[test]
fn test_first_frame_shown_once() {
    let mut session = session(MockHal::new());
    session.first_frame();
    session.monitor_run_dependencies(1);
    assert_eq!(session.hal().running_shown(), 0);

    session.monitor_run_dependencies(0);
    session.first_frame();
    assert_eq!(session.hal().running_shown(), 1);
}

#[test]
fn test_guest_status_text_passes_through() {
    let mut session = session(MockHal::new());
    assert!(session.set_status("Downloading data... (1/4)"));
    assert!(!session.set_status("Downloading data... (1/4)"));
    assert!(session.set_status(""));

    assert_eq!(
        session.hal().status_texts(),
        vec!["Downloading data...".to_string(), String::new()]
    );
    assert_eq!(session.hal().progress_updates(), vec![Some((100, 400)), None]);
    assert_eq!(session.hal().spinner_updates(), vec![true, false]);
}

// =============================================================================
// Audio Tests
// =============================================================================

#[test]
fn test_audio_unlock_needs_second_gesture() {
    let hal = MockHal::new()
        .with_audio(AudioState::Suspended)
        .with_resume_outcomes(&[AudioState::Suspended, AudioState::Running]);
    let mut session = session(hal);

    assert_eq!(session.on_user_gesture(), GateAction::StayArmed);
    assert!(!session.audio_unlocked());
    assert_eq!(session.on_user_gesture(), GateAction::Retire);
    assert!(session.audio_unlocked());
    assert_eq!(session.hal().resume_calls(), 2);

    // No further resume once unlocked
    assert_eq!(session.on_user_gesture(), GateAction::Retire);
    assert_eq!(session.hal().resume_calls(), 2);
}

#[test]
fn test_audio_gate_waits_for_device() {
    let mut session = session(MockHal::new());
    assert_eq!(session.on_user_gesture(), GateAction::StayArmed);

    session.hal().set_audio_state(Some(AudioState::Suspended));
    assert_eq!(session.on_user_gesture(), GateAction::Retire);
    assert_eq!(session.hal().resume_calls(), 1);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_context_loss_shows_message_once() {
    let (mut session, _guest) = running(MockHal::new());

    let first = MockEvent::new();
    session.on_context_lost(&first);
    assert!(first.default_prevented());

    let second = MockEvent::new();
    session.on_context_lost(&second);
    assert!(second.default_prevented());

    let shown: Vec<_> = session
        .hal()
        .status_texts()
        .into_iter()
        .filter(|t| t == CONTEXT_LOST_MESSAGE)
        .collect();
    assert_eq!(shown.len(), 1);
    assert!(session.progress().is_failed());
}

#[test]
fn test_context_loss_during_gameplay_reshows_status() {
    let (mut session, _guest) = running(MockHal::new());
    session.monitor_run_dependencies(0);
    session.first_frame();
    assert_eq!(session.hal().running_shown(), 1);
    assert!(!session.hal().status_visible());

    session.on_context_lost(&MockEvent::new());

    assert_eq!(session.hal().failure_shown(), 1);
    assert!(session.hal().status_visible());
    assert_eq!(
        session.hal().status_texts().last().map(String::as_str),
        Some(CONTEXT_LOST_MESSAGE)
    );
}

#[test]
fn test_first_frame_after_failure_keeps_status() {
    let (mut session, _guest) = running(MockHal::new());
    session.report_error("RuntimeError: unreachable");
    session.monitor_run_dependencies(0);
    session.first_frame();

    assert_eq!(session.hal().running_shown(), 0);
    assert!(session.hal().status_visible());
}

#[test]
fn test_saves_complete_after_context_loss() {
    let (mut session, guest) = running(MockHal::new());
    let ticket = session
        .request_sync(SyncDirection::Save, CorrelationHandle(42))
        .unwrap();

    session.on_context_lost(&MockEvent::new());
    session.notify_sync_complete(ticket.request_id(), None);
    assert_eq!(guest.calls(), vec![(false, None, CorrelationHandle(42))]);

    // The guest can still ask for more
    assert!(session
        .request_sync(SyncDirection::Save, CorrelationHandle(43))
        .is_ok());
}

#[test]
fn test_uncaught_error_owns_status_surface() {
    let mut session = session(MockHal::new());
    session.report_error("RuntimeError: unreachable");
    session.monitor_run_dependencies(3);
    assert!(!session.set_status("Preparing... (1/3)"));

    assert_eq!(
        session.hal().status_texts(),
        vec!["RuntimeError: unreachable".to_string()]
    );
}
