//! Mock imaging API for E2E tests.
//!
//! Starts an in-process HTTP server exposing the upload endpoint and a visit
//! lookup, recording every upload it receives.

use actix_multipart::Multipart;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, get, post, web};
use futures_util::StreamExt;
use serde_json::json;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the upload endpoint answers.
#[derive(Debug, Clone)]
pub enum UploadBehaviour {
    /// 200 with a success envelope.
    Succeed,
    /// Error status with an error envelope.
    Reject { status: u16, message: String },
    /// 200 whose envelope status is not "success".
    SoftReject { message: String },
    /// Read the body, then never answer.
    Stall,
}

/// One upload as seen by the server.
#[derive(Debug, Clone, Default)]
pub struct RecordedUpload {
    pub authorization: Option<String>,
    pub visit_id: Option<String>,
    pub findings: Option<String>,
    pub recommendations: Option<String>,
    pub body_part_override: Option<String>,
    /// (field name, file name, byte count) per file part.
    pub files: Vec<(String, String, usize)>,
}

/// Shared state for the mock imaging API.
pub struct MockImagingState {
    pub behaviour: UploadBehaviour,
    pub uploads: Vec<RecordedUpload>,
}

#[post("/api/medical-imaging/upload-study")]
async fn upload_study(
    req: HttpRequest,
    mut payload: Multipart,
    state: web::Data<Arc<Mutex<MockImagingState>>>,
) -> HttpResponse {
    let mut upload = RecordedUpload {
        authorization: req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..RecordedUpload::default()
    };

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => return HttpResponse::BadRequest().body(format!("Multipart error: {}", e)),
        };

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(str::to_string),
            ),
            None => return HttpResponse::BadRequest().body("Missing content disposition"),
        };

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            match chunk {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(e) => return HttpResponse::BadRequest().body(format!("Read error: {}", e)),
            }
        }

        match filename {
            Some(filename) => upload.files.push((name, filename, data.len())),
            None => {
                let value = String::from_utf8_lossy(&data).into_owned();
                match name.as_str() {
                    "visit_id" => upload.visit_id = Some(value),
                    "findings" => upload.findings = Some(value),
                    "recommendations" => upload.recommendations = Some(value),
                    "body_part_override" => upload.body_part_override = Some(value),
                    _ => {}
                }
            }
        }
    }

    let file_count = upload.files.len();
    let total_bytes: usize = upload.files.iter().map(|(_, _, size)| size).sum();
    let behaviour = {
        let mut state = state.lock().unwrap();
        state.uploads.push(upload);
        state.behaviour.clone()
    };

    match behaviour {
        UploadBehaviour::Succeed => HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "DICOM study uploaded",
            "data": {
                "viewer_url": "/viewer?study=1.2.840.113619.2.55",
                "studies": [{ "study_instance_uid": "1.2.840.113619.2.55" }],
                "total_files": file_count,
                "total_size_mb": total_bytes as f64 / (1024.0 * 1024.0),
            }
        })),
        UploadBehaviour::Reject { status, message } => {
            let status = actix_web::http::StatusCode::from_u16(status).unwrap();
            HttpResponse::build(status).json(json!({ "status": "error", "message": message }))
        }
        UploadBehaviour::SoftReject { message } => {
            HttpResponse::Ok().json(json!({ "status": "error", "message": message }))
        }
        UploadBehaviour::Stall => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            HttpResponse::Ok().finish()
        }
    }
}

#[get("/api/visits/{id}")]
async fn get_visit(path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    if id == "404" {
        return HttpResponse::NotFound().json(json!({
            "status": "error",
            "message": "Visit not found"
        }));
    }
    HttpResponse::Ok().json(json!({
        "status": "success",
        "data": { "id": id, "patient_name": "Jane Doe", "status": "open" }
    }))
}

/// Mock imaging API bound to an ephemeral port.
pub struct MockImagingServer {
    /// API base URL, including the `/api` prefix.
    pub base_url: String,
    pub state: Arc<Mutex<MockImagingState>>,
}

impl MockImagingServer {
    /// Start the mock server on an ephemeral port.
    pub async fn start(behaviour: UploadBehaviour) -> Self {
        let state = Arc::new(Mutex::new(MockImagingState {
            behaviour,
            uploads: Vec::new(),
        }));

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}/api", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .service(upload_study)
                .service(get_visit)
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        // Lives as long as the test runtime
        tokio::spawn(server);

        MockImagingServer { base_url, state }
    }

    /// Uploads received so far.
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().unwrap().uploads.clone()
    }
}
