//! E2E tests: successful uploads.

use dicom_uploader_lib::models::{
    NavigationTarget, NotificationLevel, RawFile, SessionState, StudyMetadata, UploadEvent,
};
use dicom_uploader_lib::services::UploadOutcome;

use super::mock_imaging_server::{MockImagingServer, UploadBehaviour};
use super::test_helpers::*;

/// Three files for visit 42: one multipart request, navigation back to the visit.
#[actix_rt::test]
async fn test_study_uploaded_and_navigates_to_visit() {
    let server = MockImagingServer::start(UploadBehaviour::Succeed).await;
    let dir = tempfile::tempdir().unwrap();
    write_study(dir.path(), 3, 2048);
    std::fs::write(dir.path().join("README.txt"), b"scanner notes").unwrap();

    let orchestrator = create_orchestrator(&server, "42");
    orchestrator.set_metadata(StudyMetadata {
        findings: "No acute findings".to_string(),
        recommendations: "Follow up in 6 months".to_string(),
        body_part_override: Some("   ".to_string()),
        ..StudyMetadata::for_visit("42")
    });

    let intake = orchestrator.add_directory(dir.path()).unwrap();
    assert_eq!(intake.accepted.len(), 3);
    assert_eq!(intake.rejected_count, 1);

    let mut rx = orchestrator.subscribe();
    let outcome = orchestrator.submit().await.unwrap();

    let UploadOutcome::Succeeded {
        receipt,
        navigation,
    } = outcome
    else {
        panic!("upload should succeed");
    };
    assert_eq!(receipt.data.total_files, 3);
    assert_eq!(receipt.data.studies.len(), 1);
    assert_eq!(
        navigation,
        Some(NavigationTarget::VisitDetail {
            visit_id: "42".to_string()
        })
    );

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, SessionState::Succeeded);
    assert_eq!(snapshot.progress_percent, 100);
    assert_eq!(snapshot.batch.file_count, 0);
    assert!(!orchestrator.leave_guard().is_armed());

    // One request carrying every file under the shared field.
    let uploads = server.uploads();
    assert_eq!(uploads.len(), 1);
    let upload = &uploads[0];
    assert_eq!(
        upload.authorization.as_deref(),
        Some(format!("Bearer {}", TEST_TOKEN).as_str())
    );
    assert_eq!(upload.visit_id.as_deref(), Some("42"));
    assert_eq!(upload.findings.as_deref(), Some("No acute findings"));
    assert_eq!(
        upload.recommendations.as_deref(),
        Some("Follow up in 6 months")
    );
    assert_eq!(upload.body_part_override, None);

    let names: Vec<&str> = upload.files.iter().map(|(_, name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "series1/IM0001.dcm",
            "series1/IM0002.dcm",
            "series1/IM0003.dcm"
        ]
    );
    assert!(upload.files.iter().all(|(field, _, size)| field == "dicomFiles" && *size == 2048));

    let events = drain_events(&mut rx);
    assert!(events.contains(&UploadEvent::ViewerAvailable {
        url: format!(
            "{}/viewer?study=1.2.840.113619.2.55",
            server.base_url.trim_end_matches("/api")
        )
    }));
    assert_eq!(
        notifications(&events, NotificationLevel::Success),
        vec!["DICOM study uploaded".to_string()]
    );
    assert!(notifications(&events, NotificationLevel::Error).is_empty());
    assert!(matches!(events.last(), Some(UploadEvent::Navigate(_))));
}

/// Real transport progress reaches the cap but never passes it before success.
#[actix_rt::test]
async fn test_progress_capped_until_server_confirms() {
    let server = MockImagingServer::start(UploadBehaviour::Succeed).await;
    let orchestrator = create_orchestrator(&server, "7");
    orchestrator
        .add_files(vec![
            RawFile::from_bytes("IM0001.dcm", vec![1u8; 300 * 1024]),
            RawFile::from_bytes("IM0002", vec![2u8; 300 * 1024]),
        ])
        .unwrap();

    let mut rx = orchestrator.subscribe();
    orchestrator.submit().await.unwrap();

    let events = drain_events(&mut rx);
    let mut last = 0;
    for event in &events {
        match event {
            UploadEvent::Progress(p) => {
                assert!(p.progress_percent > last);
                assert!(p.progress_percent <= 90);
                last = p.progress_percent;
            }
            UploadEvent::StateChanged(s) if s.state == SessionState::Finalizing => break,
            _ => {}
        }
    }
    assert!(last > 0, "expected some progress before finalizing");

    let upload = &server.uploads()[0];
    let names: Vec<&str> = upload.files.iter().map(|(_, name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["IM0001.dcm", "IM0002"]);
}

/// Without a visit context the form resets in place for the next study.
#[actix_rt::test]
async fn test_standalone_form_resets_after_success() {
    let server = MockImagingServer::start(UploadBehaviour::Succeed).await;
    let orchestrator = dicom_uploader_lib::services::UploadOrchestrator::new(
        dicom_uploader_lib::api::HttpStudyUploader::new(create_test_client(&server)),
        test_settings(&server),
    );
    orchestrator.set_metadata(StudyMetadata {
        body_part_override: Some("CHEST".to_string()),
        ..StudyMetadata::for_visit("9")
    });
    orchestrator
        .add_files(vec![RawFile::from_bytes("IM0001.dcm", vec![0u8; 512])])
        .unwrap();

    let mut rx = orchestrator.subscribe();
    let outcome = orchestrator.submit().await.unwrap();
    assert!(matches!(
        outcome,
        UploadOutcome::Succeeded {
            navigation: None,
            ..
        }
    ));

    assert_eq!(orchestrator.snapshot().state, SessionState::Idle);
    assert_eq!(orchestrator.metadata(), StudyMetadata::default());
    assert!(drain_events(&mut rx).contains(&UploadEvent::FormReset));

    assert_eq!(
        server.uploads()[0].body_part_override.as_deref(),
        Some("CHEST")
    );
}
