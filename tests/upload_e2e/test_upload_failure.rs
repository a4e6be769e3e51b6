//! E2E tests: failed uploads and local validation.

use dicom_uploader_lib::error::{FailureKind, GENERIC_FAILURE_MESSAGE, TIMEOUT_MESSAGE};
use dicom_uploader_lib::models::{NotificationLevel, RawFile, SessionState, StudyMetadata, UploadEvent};
use dicom_uploader_lib::services::UploadOutcome;

use super::mock_imaging_server::{MockImagingServer, UploadBehaviour};
use super::test_helpers::*;

fn one_file() -> Vec<RawFile> {
    vec![RawFile::from_bytes("IM0001.dcm", vec![0u8; 1024])]
}

/// Gateway timeout → timeout guidance, back to Idle, no navigation.
#[actix_rt::test]
async fn test_gateway_timeout_reported_as_timeout() {
    let server = MockImagingServer::start(UploadBehaviour::Reject {
        status: 504,
        message: "Gateway Timeout".to_string(),
    })
    .await;
    let orchestrator = create_orchestrator(&server, "42");
    orchestrator.add_files(one_file()).unwrap();

    let mut rx = orchestrator.subscribe();
    let outcome = orchestrator.submit().await.unwrap();
    assert!(matches!(outcome, UploadOutcome::Failed(FailureKind::Timeout)));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.progress_percent, 0);
    assert_eq!(snapshot.batch.file_count, 1, "batch kept for retry");
    assert!(!orchestrator.leave_guard().is_armed());

    let events = drain_events(&mut rx);
    assert_eq!(
        notifications(&events, NotificationLevel::Error),
        vec![TIMEOUT_MESSAGE.to_string()]
    );
    assert!(!events.iter().any(|e| matches!(e, UploadEvent::Navigate(_))));
}

/// Server message on an error status is surfaced verbatim.
#[actix_rt::test]
async fn test_server_message_surfaced() {
    let server = MockImagingServer::start(UploadBehaviour::Reject {
        status: 422,
        message: "Visit 42 is already closed".to_string(),
    })
    .await;
    let orchestrator = create_orchestrator(&server, "42");
    orchestrator.add_files(one_file()).unwrap();

    let mut rx = orchestrator.subscribe();
    let outcome = orchestrator.submit().await.unwrap();
    assert!(matches!(
        outcome,
        UploadOutcome::Failed(FailureKind::Rejected { ref message })
            if message == "Visit 42 is already closed"
    ));
    assert_eq!(
        notifications(&drain_events(&mut rx), NotificationLevel::Error),
        vec!["Visit 42 is already closed".to_string()]
    );
}

/// A 200 whose envelope is not "success" is still a failure.
#[actix_rt::test]
async fn test_non_success_envelope_is_failure() {
    let server = MockImagingServer::start(UploadBehaviour::SoftReject {
        message: "Duplicate study".to_string(),
    })
    .await;
    let orchestrator = create_orchestrator(&server, "42");
    orchestrator.add_files(one_file()).unwrap();

    let outcome = orchestrator.submit().await.unwrap();
    assert!(matches!(
        outcome,
        UploadOutcome::Failed(FailureKind::Rejected { ref message }) if message == "Duplicate study"
    ));
    assert_eq!(orchestrator.snapshot().state, SessionState::Idle);
}

/// Nothing listening on the port → generic message.
#[actix_rt::test]
async fn test_unreachable_server_uses_generic_message() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let server = MockImagingServer {
        base_url: format!("http://127.0.0.1:{}/api", port),
        state: std::sync::Arc::new(std::sync::Mutex::new(
            super::mock_imaging_server::MockImagingState {
                behaviour: UploadBehaviour::Succeed,
                uploads: Vec::new(),
            },
        )),
    };
    let orchestrator = create_orchestrator(&server, "42");
    orchestrator.add_files(one_file()).unwrap();

    let mut rx = orchestrator.subscribe();
    let outcome = orchestrator.submit().await.unwrap();
    assert!(matches!(
        outcome,
        UploadOutcome::Failed(FailureKind::Rejected { ref message }) if message == GENERIC_FAILURE_MESSAGE
    ));
    assert_eq!(
        notifications(&drain_events(&mut rx), NotificationLevel::Error),
        vec![GENERIC_FAILURE_MESSAGE.to_string()]
    );
}

/// Validation failures never reach the server.
#[actix_rt::test]
async fn test_validation_failures_skip_network() {
    let server = MockImagingServer::start(UploadBehaviour::Succeed).await;
    let orchestrator = create_orchestrator(&server, "42");

    // No files.
    assert!(orchestrator.submit().await.unwrap_err().is_validation());

    // Only a text file: rejected, batch stays empty.
    let intake = orchestrator
        .add_files(vec![RawFile::from_bytes("notes.txt", b"hello".to_vec())])
        .unwrap();
    assert_eq!(intake.rejected_count, 1);
    assert_eq!(orchestrator.snapshot().batch.file_count, 0);
    assert!(orchestrator.submit().await.unwrap_err().is_validation());

    // Files but a blank visit id.
    orchestrator.add_files(one_file()).unwrap();
    orchestrator.set_metadata(StudyMetadata::for_visit(""));
    assert!(orchestrator.submit().await.unwrap_err().is_validation());

    assert!(server.uploads().is_empty());
    assert_eq!(orchestrator.snapshot().state, SessionState::Idle);
}
