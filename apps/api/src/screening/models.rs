//! Data models shared across the screening pipeline.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded resume. Lives only for the duration of one batch run.
#[derive(Debug, Clone)]
pub struct ResumeDocument {
    /// Usually the upload's filename. Unique within a batch by convention only.
    pub name: String,
    pub content: Bytes,
    /// Content type declared by the uploader, if any.
    pub content_type: Option<String>,
}

impl ResumeDocument {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Coarse bucket derived from a score for visual triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    /// ≥ 80 → high, 50–79 → medium, < 50 → low.
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            Tier::High
        } else if score >= 50 {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

/// A successfully scored resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Position of the document in the uploaded batch. Used as the ranking tie-break.
    pub index: usize,
    pub name: String,
    pub score: u32, // 0 – 100
    pub reason: String,
}

impl ScoreResult {
    pub fn tier(&self) -> Tier {
        Tier::from_score(self.score)
    }
}

/// Pipeline state of a single document. Transitions only move forward;
/// `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Pending,
    Extracting,
    Extracted,
    Prompting,
    AwaitingReply,
    Parsing,
    Scored,
    Failed,
}

impl DocumentStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStage::Scored | DocumentStage::Failed)
    }
}

/// Why a document did not produce a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Extraction,
    Service,
    Parse,
    Cancelled,
    Internal,
}

/// A per-document failure. Reported to the caller alongside the ranked results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub index: usize,
    pub name: String,
    pub kind: FailureKind,
    /// Last non-terminal stage the document reached before failing.
    pub stage: DocumentStage,
    pub message: String,
}

/// One row of the final ranking as shown to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize, // 1-based
    pub name: String,
    pub score: u32,
    pub reason: String,
    pub tier: Tier,
}

/// Everything a batch run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub total: usize,
    /// Sorted by score descending, ties in upload order.
    pub results: Vec<RankedResult>,
    pub failures: Vec<DocumentFailure>,
    pub cancelled: bool,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Sorts scored resumes by score descending. The sort is stable and keyed on
/// the original index for equal scores, so completion order never leaks in.
pub fn rank_results(mut scored: Vec<ScoreResult>) -> Vec<RankedResult> {
    scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
    scored
        .into_iter()
        .enumerate()
        .map(|(position, result)| RankedResult {
            rank: position + 1,
            tier: result.tier(),
            name: result.name,
            score: result.score,
            reason: result.reason,
        })
        .collect()
}
