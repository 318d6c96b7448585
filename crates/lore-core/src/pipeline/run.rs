use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a pipeline run.
///
/// Runs progress linearly: Running → Completed, or Running → Failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        }
    }
}

/// What kind of work a run performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Justify a full set of entities.
    Full,
    /// Apply an incremental diff.
    Incremental,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub levels: usize,
    pub batches: usize,
    pub llm_calls: usize,
    pub justified: usize,
    pub low_quality: usize,
    pub edges_deleted: usize,
    pub moves: usize,
    pub cosmetic_skipped: usize,
    pub drift_scored: usize,
    pub cascaded: usize,
    pub features: usize,
}

/// Status record of one pipeline run, owned by a repository scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub org_id: String,
    pub repo_id: String,
    pub kind: RunKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Message of the error that failed the run, verbatim.
    pub last_error: Option<String>,
    pub stats: RunStats,
}

impl PipelineRun {
    /// Start a new run for the given scope.
    pub fn start(org_id: impl Into<String>, repo_id: impl Into<String>, kind: RunKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            repo_id: repo_id.into(),
            kind,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            last_error: None,
            stats: RunStats::default(),
        }
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run failed, keeping the error message as-is.
    pub fn fail(&mut self, error: impl std::fmt::Display) {
        self.status = RunStatus::Failed;
        self.last_error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }
}
