//! Axum route handlers for the Screening API.

use std::convert::Infallible;

use axum::{
    extract::{Multipart, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::screening::cancel::CancelToken;
use crate::screening::models::{BatchReport, ResumeDocument};
use crate::screening::progress::{ChannelSink, ScreeningEvent, TracingSink};
use crate::state::AppState;

const JOB_DESCRIPTION_FIELD: &str = "job_description";
const RESUME_FIELDS: [&str; 2] = ["resumes", "resume"];

/// A validated screening request.
#[derive(Debug)]
struct ScreeningUpload {
    job_description: String,
    documents: Vec<ResumeDocument>,
}

/// Reads `job_description` and every `resumes` file from the multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<ScreeningUpload, AppError> {
    let mut job_description = String::new();
    let mut documents = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name == JOB_DESCRIPTION_FIELD {
            job_description = field.text().await?;
        } else if RESUME_FIELDS.contains(&field_name.as_str()) {
            let name = field
                .file_name()
                .map(String::from)
                .unwrap_or_else(|| format!("resume-{}", documents.len() + 1));
            let content_type = field.content_type().map(String::from);
            let content = field.bytes().await?;

            let mut document = ResumeDocument::new(name, content);
            if let Some(content_type) = content_type {
                document = document.with_content_type(content_type);
            }
            documents.push(document);
        } else {
            debug!("Ignoring unknown multipart field '{field_name}'");
        }
    }

    if job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "job_description cannot be empty".to_string(),
        ));
    }
    if documents.is_empty() {
        return Err(AppError::Validation(
            "Upload at least one resume in the 'resumes' field".to_string(),
        ));
    }

    Ok(ScreeningUpload {
        job_description,
        documents,
    })
}

/// POST /api/v1/screenings
///
/// Screens every uploaded resume against the job description and returns the
/// ranked report. Per-document failures are part of the report, not errors.
pub async fn handle_screen(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let upload = read_upload(multipart).await?;
    info!("Received {} resume(s) for screening", upload.documents.len());

    let report = state
        .screener
        .screen(
            &upload.job_description,
            upload.documents,
            &TracingSink,
            &TracingSink,
            &CancelToken::new(),
        )
        .await;

    Ok(Json(report))
}

/// POST /api/v1/screenings/stream
///
/// Same as `handle_screen`, but streams `started`, `progress`, `failure` and a
/// final `report` event over SSE. Closing the connection cancels documents that
/// have not started yet.
pub async fn handle_screen_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let upload = read_upload(multipart).await?;

    let run_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();
    info!(
        "Streaming screening {run_id} for {} resume(s)",
        upload.documents.len()
    );

    // Cannot fail: the receiver is still held below.
    let _ = tx.send(ScreeningEvent::Started {
        run_id,
        total: upload.documents.len(),
    });

    let screener = state.screener.clone();
    tokio::spawn(async move {
        let sink = ChannelSink::new(tx.clone(), cancel.clone());
        let report = screener
            .screen_run(
                run_id,
                &upload.job_description,
                upload.documents,
                &sink,
                &sink,
                &cancel,
            )
            .await;
        if tx.send(ScreeningEvent::Report(report)).is_err() {
            debug!("Client left before the report for {run_id} was delivered");
        }
    });

    // Ends once the screening task drops its senders.
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(to_sse_event(&event)), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &ScreeningEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event)
        .unwrap_or_else(|e| {
            error!("Failed to serialize screening event: {e}");
            Event::default().event("error").data("failed to serialize event")
        })
}
