//! DICOM study uploader - command line front-end.
//!
//! Usage:
//!   dicom-upload --visit <id> [--findings <text>] [--recommendations <text>]
//!                [--body-part <name>] [--return-to-visit] <file-or-folder>...
//!   dicom-upload --health-check
//!
//! Press Ctrl-C once to ask for cancellation and a second time to confirm.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use dicom_uploader_lib::api::{ApiClient, HttpStudyUploader};
use dicom_uploader_lib::config::Config;
use dicom_uploader_lib::models::{NotificationLevel, RawFile, StudyMetadata, UploadEvent};
use dicom_uploader_lib::services::{UploadOrchestrator, UploadOutcome, UploadSettings};

/// Parsed command line.
#[derive(Debug, Default)]
struct CliArgs {
    visit_id: String,
    findings: String,
    recommendations: String,
    body_part: Option<String>,
    return_to_visit: bool,
    paths: Vec<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut i = 1;

    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--visit" | "-v" | "--findings" | "--recommendations" | "--body-part" => {
                let value = args
                    .get(i + 1)
                    .cloned()
                    .ok_or_else(|| format!("{} requires a value", arg))?;
                match arg {
                    "--visit" | "-v" => cli.visit_id = value,
                    "--findings" => cli.findings = value,
                    "--recommendations" => cli.recommendations = value,
                    _ => cli.body_part = Some(value),
                }
                i += 2;
                continue;
            }
            "--return-to-visit" => cli.return_to_visit = true,
            _ if arg.starts_with("--") => return Err(format!("Unknown option: {}", arg)),
            _ => cli.paths.push(PathBuf::from(arg)),
        }
        i += 1;
    }

    Ok(cli)
}

fn print_usage() {
    println!("DICOM study uploader");
    println!();
    println!("Usage:");
    println!("  dicom-upload --visit <id> [options] <file-or-folder>...");
    println!("  dicom-upload --health-check");
    println!();
    println!("Options:");
    println!("  -v, --visit <id>           Visit the study belongs to (required)");
    println!("      --findings <text>      Radiology findings");
    println!("      --recommendations <t>  Recommendations");
    println!("      --body-part <name>     Override the body part from DICOM headers");
    println!("      --return-to-visit      Open the visit after a successful upload");
    println!();
    println!("Ctrl-C once asks to cancel; press it again to confirm.");
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    // Check for --health-check flag (used by container HEALTHCHECK)
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        return match Config::from_env() {
            Ok(_) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    }

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::from(2);
        }
    };

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DSU_API_BASE_URL (https) and DSU_API_TOKEN must be set");
            return ExitCode::FAILURE;
        }
    };

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode against {}", config.api_base_url);
    }

    let client = match ApiClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let uploader = HttpStudyUploader::new(client);
    let settings = UploadSettings::from(&config);
    let orchestrator = if cli.return_to_visit {
        UploadOrchestrator::for_visit(uploader, settings, cli.visit_id.clone())
    } else {
        UploadOrchestrator::new(uploader, settings)
    };

    orchestrator.set_metadata(StudyMetadata {
        visit_id: cli.visit_id.clone(),
        body_part_override: cli.body_part.clone(),
        findings: cli.findings.clone(),
        recommendations: cli.recommendations.clone(),
    });

    let printer = tokio::spawn(print_events(orchestrator.subscribe()));

    for path in &cli.paths {
        let result = if path.is_dir() {
            orchestrator.add_directory(path)
        } else {
            match RawFile::from_path(path).await {
                Ok(file) => orchestrator.add_files(vec![file]),
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            error!("Cannot add {}: {}", path.display(), e);
        }
    }

    let interrupts = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if orchestrator.snapshot().cancel_prompt_open {
                    orchestrator.confirm_cancel();
                } else if orchestrator.request_cancel() {
                    eprintln!("Press Ctrl-C again to cancel the upload, or wait to continue.");
                }
            }
        }
    });

    let code = match orchestrator.submit().await {
        Ok(UploadOutcome::Succeeded { receipt, navigation }) => {
            info!(
                total_files = receipt.data.total_files,
                total_size_mb = receipt.data.total_size_mb,
                "Study uploaded"
            );
            if let Some(target) = navigation {
                println!("Open visit: {}", target.route());
            }
            ExitCode::SUCCESS
        }
        Ok(UploadOutcome::Cancelled) => ExitCode::from(130),
        Ok(UploadOutcome::Failed(_)) => ExitCode::FAILURE,
        Err(e) => {
            if !e.is_validation() {
                error!("{}", e);
            }
            ExitCode::from(2)
        }
    };

    interrupts.abort();
    drop(orchestrator);
    // Give the printer a moment to flush the last events.
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;

    code
}

async fn print_events(
    mut rx: tokio::sync::broadcast::Receiver<dicom_uploader_lib::models::UploadEventMessage>,
) {
    loop {
        let message = match rx.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event printer lagged, skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match message.event {
            UploadEvent::BatchChanged(summary) => println!(
                "Batch: {} file(s), {:.2} MB, ~{} series",
                summary.file_count, summary.total_size_mb, summary.estimated_series
            ),
            UploadEvent::StateChanged(change) if !change.status_message.is_empty() => {
                println!("[{:>3}%] {}", change.progress_percent, change.status_message)
            }
            UploadEvent::StateChanged(_) => {}
            UploadEvent::Progress(progress) => println!("[{:>3}%]", progress.progress_percent),
            UploadEvent::Notification(notification) => match notification.level {
                NotificationLevel::Error | NotificationLevel::Warning => {
                    eprintln!("{}", notification.message)
                }
                NotificationLevel::Info | NotificationLevel::Success => {
                    println!("{}", notification.message)
                }
            },
            UploadEvent::CancelConfirmationRequested { .. } => {}
            UploadEvent::ViewerAvailable { url } => println!("View study: {}", url),
            UploadEvent::Navigate(target) => println!("Navigating to {}", target.route()),
            UploadEvent::FormReset => {}
        }
    }
}
