//! Step outcomes and the end-of-run report
//!
//! Every download, clone, install probe and cleanup produces exactly one
//! [`Outcome`]. The pipeline streams them to an observer (the CLI prints one
//! line per outcome) and folds them into a [`RunReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::OperationError;

/// Which pipeline step produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Index,
    Releases,
    Download,
    Refresh,
    Clone,
    Install,
    Cleanup,
}

impl Step {
    fn title(&self) -> &'static str {
        match self {
            Step::Index => "Index",
            Step::Releases => "Releases",
            Step::Download => "Download",
            Step::Refresh => "Refresh",
            Step::Clone => "Clone",
            Step::Install => "Install",
            Step::Cleanup => "Cleanup",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// How a step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Status {
    /// Nothing to do, e.g. the artifact is already on disk
    Skipped(String),
    Ok,
    /// The step failed; the cause is the flattened error chain
    Failed(String),
}

/// Result of one pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub step: Step,
    /// Path, URL or package name the step worked on
    pub subject: String,
    #[serde(flatten)]
    pub status: Status,
}

impl Outcome {
    pub fn ok(step: Step, subject: impl Into<String>) -> Self {
        Self {
            step,
            subject: subject.into(),
            status: Status::Ok,
        }
    }

    pub fn skipped(step: Step, subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step,
            subject: subject.into(),
            status: Status::Skipped(reason.into()),
        }
    }

    pub fn failed(step: Step, subject: impl Into<String>, error: &OperationError) -> Self {
        Self {
            step,
            subject: subject.into(),
            status: Status::Failed(error.chain()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, Status::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, Status::Failed(_))
    }

    fn icon(&self) -> &'static str {
        match self.status {
            Status::Skipped(_) => "⏭️ ",
            Status::Ok => "✅",
            Status::Failed(_) => "❌",
        }
    }

    /// Emit the outcome through tracing at a level matching its status
    pub(crate) fn log(&self) {
        match &self.status {
            Status::Skipped(reason) => {
                tracing::debug!(step = %self.step, subject = %self.subject, "skipped: {}", reason)
            }
            Status::Ok => tracing::debug!(step = %self.step, subject = %self.subject, "ok"),
            Status::Failed(cause) => {
                tracing::warn!(step = %self.step, subject = %self.subject, "failed: {}", cause)
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.icon(), self.step, self.subject)?;
        match &self.status {
            Status::Skipped(reason) => write!(f, " (skipped: {reason})"),
            Status::Ok => write!(f, " (ok)"),
            Status::Failed(cause) => write!(f, " (error: {cause})"),
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Packages the pipeline attempted
    pub packages: usize,
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Every failed outcome, in the order it happened
    pub failures: Vec<Outcome>,

    /// Packages whose release list could not be fetched
    pub abandoned: Vec<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            packages: 0,
            ok: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            abandoned: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome.status {
            Status::Ok => self.ok += 1,
            Status::Skipped(_) => self.skipped += 1,
            Status::Failed(_) => {
                self.failed += 1;
                self.failures.push(outcome.clone());
            }
        }
    }

    pub fn abandon(&mut self, package: &str) {
        self.abandoned.push(package.to_string());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Wall-clock duration, if the run has finished
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
