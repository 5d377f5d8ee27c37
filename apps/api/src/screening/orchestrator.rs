//! Batch Orchestrator. Screens a set of resumes against one job description.
//!
//! Flow per document: extract → build prompt → complete (with retry) → parse.
//! Documents run as independent tasks with bounded parallelism. A failing
//! document is recorded and reported; it never aborts the batch. Every input
//! document ends up either in the ranked results or in the failure list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::llm_client::{CompletionService, LlmError};
use crate::screening::cancel::CancelToken;
use crate::screening::extractor::TextExtractor;
use crate::screening::models::{
    rank_results, BatchReport, DocumentFailure, DocumentStage, FailureKind, ResumeDocument,
    ScoreResult,
};
use crate::screening::parser::parse_reply;
use crate::screening::progress::{NotificationSink, Progress, ProgressSink};
use crate::screening::prompts::build_screening_prompt;

/// Caps the backoff multiplier at 2^16.
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone)]
pub struct ScreeningOptions {
    /// Documents processed at the same time. At least 1.
    pub max_concurrency: usize,
    /// Extra attempts for transient completion-service errors.
    pub max_retries: u32,
    /// First backoff delay; doubled on every further retry.
    pub retry_base_delay: Duration,
}

impl Default for ScreeningOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Runs the screening pipeline. Cheap to clone; shared pieces are behind `Arc`.
#[derive(Clone)]
pub struct Screener {
    extractor: Arc<dyn TextExtractor>,
    scorer: Arc<dyn CompletionService>,
    options: ScreeningOptions,
}

/// Tracks one document through the pipeline states and produces failures
/// stamped with the stage they happened in.
struct StageTracker {
    index: usize,
    name: String,
    stage: DocumentStage,
}

impl StageTracker {
    fn new(index: usize, name: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
            stage: DocumentStage::Pending,
        }
    }

    fn advance(&mut self, next: DocumentStage) {
        debug_assert!(
            !self.stage.is_terminal() && next > self.stage,
            "{:?} -> {:?}",
            self.stage,
            next
        );
        debug!("{}: {:?} -> {:?}", self.name, self.stage, next);
        self.stage = next;
    }

    fn fail(&self, kind: FailureKind, message: impl Into<String>) -> DocumentFailure {
        debug!("{}: {:?} -> Failed", self.name, self.stage);
        DocumentFailure {
            index: self.index,
            name: self.name.clone(),
            kind,
            stage: self.stage,
            message: message.into(),
        }
    }
}

impl Screener {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        scorer: Arc<dyn CompletionService>,
        options: ScreeningOptions,
    ) -> Self {
        Self {
            extractor,
            scorer,
            options,
        }
    }

    /// Screens every document and returns the ranked report.
    ///
    /// Progress is reported once per finished document and failures as they
    /// happen. Cancelling `cancel` stops documents that have not started yet;
    /// those are reported as `cancelled` failures. Documents already in flight finish.
    pub async fn screen(
        &self,
        job_description: &str,
        documents: Vec<ResumeDocument>,
        progress: &dyn ProgressSink,
        notifications: &dyn NotificationSink,
        cancel: &CancelToken,
    ) -> BatchReport {
        self.screen_run(
            Uuid::new_v4(),
            job_description,
            documents,
            progress,
            notifications,
            cancel,
        )
        .await
    }

    /// Same as [`Screener::screen`] with a caller-chosen run id.
    pub async fn screen_run(
        &self,
        run_id: Uuid,
        job_description: &str,
        documents: Vec<ResumeDocument>,
        progress: &dyn ProgressSink,
        notifications: &dyn NotificationSink,
        cancel: &CancelToken,
    ) -> BatchReport {
        let span = info_span!("screening", %run_id);
        self.run_batch(run_id, job_description, documents, progress, notifications, cancel)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        run_id: Uuid,
        job_description: &str,
        documents: Vec<ResumeDocument>,
        progress: &dyn ProgressSink,
        notifications: &dyn NotificationSink,
        cancel: &CancelToken,
    ) -> BatchReport {
        let started = Instant::now();
        let total = documents.len();
        info!(
            "Screening {total} resume(s), up to {} in parallel",
            self.options.max_concurrency
        );

        let job_description: Arc<str> = Arc::from(job_description);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        // Names of documents whose task has not reported back yet, by input index.
        let mut outstanding: Vec<Option<String>> =
            documents.iter().map(|d| Some(d.name.clone())).collect();

        let mut tasks = JoinSet::new();
        for (index, document) in documents.into_iter().enumerate() {
            let screener = self.clone();
            let job_description = Arc::clone(&job_description);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(
                async move {
                    let name = document.name.clone();
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(cancelled_failure(index, &name)),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => {
                                let outcome = screener
                                    .screen_document(index, document, &job_description)
                                    .await;
                                drop(permit);
                                outcome
                            }
                            Err(_) => Err(internal_failure(index, &name, "worker pool closed")),
                        },
                    };
                    (index, outcome)
                }
                .in_current_span(),
            );
        }

        let mut scored: Vec<ScoreResult> = Vec::with_capacity(total);
        let mut failures: Vec<DocumentFailure> = Vec::new();
        let mut completed = 0;

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    // Accounted for after the loop via `outstanding`.
                    error!("Screening task died: {e}");
                    continue;
                }
            };
            outstanding[index] = None;

            match outcome {
                Ok(result) => {
                    info!("{} scored {}/100", result.name, result.score);
                    scored.push(result);
                }
                Err(failure) => {
                    notifications.document_failed(&failure);
                    failures.push(failure);
                }
            }

            completed += 1;
            progress.progress(Progress { completed, total });
        }

        for (index, name) in outstanding.into_iter().enumerate() {
            if let Some(name) = name {
                let failure = internal_failure(index, &name, "screening task terminated unexpectedly");
                notifications.document_failed(&failure);
                failures.push(failure);
                completed += 1;
                progress.progress(Progress { completed, total });
            }
        }

        failures.sort_by_key(|f| f.index);
        let results = rank_results(scored);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            "Screening finished: {} scored, {} failed in {elapsed_ms}ms",
            results.len(),
            failures.len()
        );

        BatchReport {
            run_id,
            total,
            results,
            failures,
            cancelled: cancel.is_cancelled(),
            completed_at: Utc::now(),
            elapsed_ms,
        }
    }

    /// Runs one document through extract → prompt → complete → parse.
    async fn screen_document(
        &self,
        index: usize,
        document: ResumeDocument,
        job_description: &str,
    ) -> Result<ScoreResult, DocumentFailure> {
        let mut tracker = StageTracker::new(index, &document.name);

        // Step 1: Extract text. Off the async threads; the PDF decoder is CPU-bound.
        tracker.advance(DocumentStage::Extracting);
        let extractor = Arc::clone(&self.extractor);
        let resume_text = match tokio::task::spawn_blocking(move || extractor.extract(&document)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(tracker.fail(FailureKind::Extraction, e.to_string())),
            Err(e) => {
                return Err(tracker.fail(
                    FailureKind::Extraction,
                    format!("text extraction crashed: {e}"),
                ))
            }
        };
        if resume_text.is_empty() {
            warn!("{} has no extractable text; scoring it anyway", tracker.name);
        }
        tracker.advance(DocumentStage::Extracted);

        // Step 2: Build prompt
        tracker.advance(DocumentStage::Prompting);
        let prompt = build_screening_prompt(&resume_text, job_description);

        // Step 3: Ask the model
        tracker.advance(DocumentStage::AwaitingReply);
        let raw_reply = self
            .complete_with_retry(&tracker.name, &prompt)
            .await
            .map_err(|e| tracker.fail(FailureKind::Service, e.to_string()))?;

        // Step 4: Parse score and reason
        tracker.advance(DocumentStage::Parsing);
        let parsed =
            parse_reply(&raw_reply).map_err(|e| tracker.fail(FailureKind::Parse, e.to_string()))?;

        tracker.advance(DocumentStage::Scored);
        Ok(ScoreResult {
            index,
            name: tracker.name,
            score: parsed.score,
            reason: parsed.reason,
        })
    }

    /// Retries transient service errors with exponential backoff: base, 2×base, 4×base, ...
    async fn complete_with_retry(&self, name: &str, prompt: &str) -> Result<String, LlmError> {
        let mut attempt: u32 = 0;
        loop {
            match self.scorer.complete(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() && attempt < self.options.max_retries => {
                    let delay = self
                        .options
                        .retry_base_delay
                        .saturating_mul(1 << attempt.min(MAX_BACKOFF_SHIFT));
                    attempt += 1;
                    warn!(
                        "LLM call for {name} failed ({e}), retry {attempt}/{} after {}ms",
                        self.options.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn cancelled_failure(index: usize, name: &str) -> DocumentFailure {
    DocumentFailure {
        index,
        name: name.to_string(),
        kind: FailureKind::Cancelled,
        stage: DocumentStage::Pending,
        message: "screening was cancelled before this document started".to_string(),
    }
}

fn internal_failure(index: usize, name: &str, message: &str) -> DocumentFailure {
    DocumentFailure {
        index,
        name: name.to_string(),
        kind: FailureKind::Internal,
        stage: DocumentStage::Pending,
        message: message.to_string(),
    }
}
