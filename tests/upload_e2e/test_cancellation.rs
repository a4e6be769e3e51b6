//! E2E tests: cancelling an in-flight upload.

use std::time::Duration;

use dicom_uploader_lib::error::CANCELLED_MESSAGE;
use dicom_uploader_lib::models::{NotificationLevel, RawFile, SessionState};
use dicom_uploader_lib::services::UploadOutcome;

use super::mock_imaging_server::{MockImagingServer, UploadBehaviour};
use super::test_helpers::*;

/// Confirmed cancel while the server stalls: Idle at once, one notice, no error.
#[actix_rt::test]
async fn test_confirmed_cancel_aborts_stalled_upload() {
    let server = MockImagingServer::start(UploadBehaviour::Stall).await;
    let orchestrator = create_orchestrator(&server, "42");
    orchestrator
        .add_files(vec![RawFile::from_bytes("IM0001.dcm", vec![0u8; 4096])])
        .unwrap();

    let mut rx = orchestrator.subscribe();
    let task = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit().await }
    });

    wait_for_state(&orchestrator, SessionState::Uploading, Duration::from_secs(5)).await;
    assert!(orchestrator.leave_guard().leave_warning().is_some());

    // Let the ticker move the bar while the server holds the response.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(orchestrator.snapshot().progress_percent > 0);

    assert!(orchestrator.request_cancel());
    assert!(orchestrator.confirm_cancel());

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.progress_percent, 0);
    assert!(!orchestrator.leave_guard().is_armed());

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("submit should return promptly after cancel")
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, UploadOutcome::Cancelled));

    // No stale ticks after the reset.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(orchestrator.snapshot().progress_percent, 0);

    let events = drain_events(&mut rx);
    assert_eq!(
        notifications(&events, NotificationLevel::Info),
        vec![CANCELLED_MESSAGE.to_string()]
    );
    assert!(notifications(&events, NotificationLevel::Error).is_empty());
}

/// A new upload can start right after a cancelled one.
#[actix_rt::test]
async fn test_resubmit_after_cancel_uses_fresh_session() {
    let server = MockImagingServer::start(UploadBehaviour::Stall).await;
    let orchestrator = create_orchestrator(&server, "42");
    orchestrator
        .add_files(vec![RawFile::from_bytes("IM0001.dcm", vec![0u8; 1024])])
        .unwrap();

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.submit().await }
    });
    wait_for_state(&orchestrator, SessionState::Uploading, Duration::from_secs(5)).await;
    let first_id = orchestrator.snapshot().session_id;
    assert!(orchestrator.request_cancel());
    assert!(orchestrator.confirm_cancel());
    assert!(matches!(
        first.await.unwrap().unwrap(),
        UploadOutcome::Cancelled
    ));

    server.state.lock().unwrap().behaviour = UploadBehaviour::Succeed;
    let outcome = orchestrator.submit().await.unwrap();
    assert!(matches!(outcome, UploadOutcome::Succeeded { .. }));

    let snapshot = orchestrator.snapshot();
    assert_ne!(snapshot.session_id, first_id);
    assert_eq!(snapshot.state, SessionState::Succeeded);
}
