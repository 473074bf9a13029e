use std::{fmt, path::PathBuf};

use crate::planner::SliceJob;

/// Why a whole folder was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// No annotation document or no video
    NotFound,
    LoadFailure,
    TierNotFound,
    TierIndexOutOfRange,
    OutputDir,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FolderFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// A job that ffmpeg failed on
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FailedJob {
    pub label: String,
    pub start: String,
    pub end: String,
    pub cause: String,
}

impl FailedJob {
    pub fn new(job: &SliceJob, cause: impl ToString) -> Self {
        Self {
            label: job.label.clone(),
            start: job.start_clock(),
            end: job.end_clock(),
            cause: cause.to_string(),
        }
    }
}

/// What happened to one project folder
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub document: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub tier: Option<String>,
    pub annotations: usize,
    pub attempted: usize,
    pub failed: usize,
    pub failed_jobs: Vec<FailedJob>,
    pub failure: Option<FolderFailure>,
    pub warnings: Vec<String>,
    /// Stopped early because of a signal
    pub interrupted: bool,
}

impl FolderReport {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            document: None,
            video: None,
            tier: None,
            annotations: 0,
            attempted: 0,
            failed: 0,
            failed_jobs: Vec::new(),
            failure: None,
            warnings: Vec::new(),
            interrupted: false,
        }
    }

    /// The folder was processed and every job succeeded
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.failed == 0
    }

    pub fn record_failed_job(&mut self, failed: FailedJob) {
        self.failed += 1;
        self.failed_jobs.push(failed);
    }
}

/// Totals over a batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub folders: usize,
    pub failed_folders: usize,
    pub annotations: usize,
    pub attempted: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn new<'a>(reports: impl IntoIterator<Item = &'a FolderReport>) -> Self {
        reports.into_iter().fold(Self::default(), |mut sum, rep| {
            sum.folders += 1;
            sum.failed_folders += usize::from(rep.failure.is_some());
            sum.annotations += rep.annotations;
            sum.attempted += rep.attempted;
            sum.failed += rep.failed;
            sum
        })
    }

    pub fn is_success(&self) -> bool {
        self.failed_folders == 0 && self.failed == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} folder(s), {} skipped, {} annotation(s), {} job(s) attempted, {} failed",
            self.folders, self.failed_folders, self.annotations, self.attempted, self.failed
        )
    }
}

pub fn save_to(writer: impl std::io::Write, reports: &[FolderReport]) -> ron::Result<()> {
    let conf = ron::ser::PrettyConfig::new().struct_names(true);
    ron::ser::to_writer_pretty(writer, reports, conf)
}
