//! Runs the whole pipeline over one project folder, or every folder below a root.
//!
//! Nothing that goes wrong inside a folder is fatal. A folder that can't be prepared gets
//! a failure in its report, a job that ffmpeg fails on is counted, and the next folder or
//! job carries on.

use std::{
    io,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Instant,
};

use elan_common::{bin_common::termination::Cookie, utils::fsutils};

use crate::{
    annotation_source::{AnnotationSource, DocumentReader, SourceError},
    frame_extractor::{ExtractionError, FrameExtractor},
    planner::{self, SliceJob},
    report::{FailedJob, FailureKind, FolderFailure, FolderReport},
    tier_selector::{self, TierError},
};

/// Everything that decides what is extracted and where it ends up
#[derive(Clone, Debug)]
pub struct SliceConfig {
    pub output_root: PathBuf,
    pub fps: NonZeroU32,
    /// Which document to use when a folder has several
    pub elan_file: Option<String>,
    pub tier_name: Option<String>,
    /// Counted from 1, only used without a `tier_name`
    pub tier_index: usize,
    /// Without the dot
    pub video_ext: String,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./output"),
            fps: NonZeroU32::new(10).expect("is not zero"),
            elan_file: None,
            tier_name: None,
            tier_index: 1,
            video_ext: "mp4".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Tier(#[from] TierError),
    #[error("there is no video at {}", .0.display())]
    VideoNotFound(PathBuf),
    #[error("failed to create the output dirs below {}: {source}", dir.display())]
    OutputDir { dir: PathBuf, source: io::Error },
}

impl FolderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FolderError::Source(SourceError::NotFound(_) | SourceError::List { .. }) => {
                FailureKind::NotFound
            }
            FolderError::Source(SourceError::Load { .. }) => FailureKind::LoadFailure,
            FolderError::Tier(TierError::NotFound { .. }) => FailureKind::TierNotFound,
            FolderError::Tier(TierError::IndexOutOfRange { .. }) => {
                FailureKind::TierIndexOutOfRange
            }
            FolderError::VideoNotFound(_) => FailureKind::NotFound,
            FolderError::OutputDir { .. } => FailureKind::OutputDir,
        }
    }
}

impl From<&FolderError> for FolderFailure {
    fn from(e: &FolderError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Every folder below `root`, at any depth, sorted by name. Folders inside
/// `output_root` are left out.
pub fn project_folders(root: &Path, output_root: &Path) -> io::Result<Vec<PathBuf>> {
    let output_root = output_root.canonicalize().ok();
    Ok(fsutils::all_subdirs(root)?
        .into_iter()
        .filter(|dir| match (&output_root, dir.canonicalize()) {
            (Some(out), Ok(dir)) => !dir.starts_with(out),
            _ => true,
        })
        .collect())
}

pub struct BatchDriver<R, E> {
    config: SliceConfig,
    source: AnnotationSource<R>,
    extractor: E,
    cookie: Cookie,
}

impl<R, E> BatchDriver<R, E>
where
    R: DocumentReader,
    E: FrameExtractor,
{
    pub fn new(config: SliceConfig, reader: R, extractor: E) -> Self {
        Self {
            config,
            source: AnnotationSource::new(reader),
            extractor,
            cookie: Cookie::never(),
        }
    }

    /// Stop early once the cookie says so
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn into_extractor(self) -> E {
        self.extractor
    }

    /// Slices every folder below `root`, at any depth, in name order. Only failing to
    /// read `root` itself is an error. Folders inside the output root are left alone.
    pub fn run_multi(&mut self, root: impl AsRef<Path>) -> io::Result<Vec<FolderReport>> {
        let root = root.as_ref();
        let folders = project_folders(root, &self.config.output_root)?;
        log::info!("Found {} folder(s) below {}", folders.len(), root.display());

        let mut reports = Vec::with_capacity(folders.len());
        for (i, folder) in folders.iter().enumerate() {
            if self.cookie.is_terminating() {
                log::warn!("Interrupted, skipping the last {} folder(s)", folders.len() - i);
                break;
            }
            log::info!("Folder {}/{}: {}", i + 1, folders.len(), folder.display());
            reports.push(self.run_single(folder));
        }
        Ok(reports)
    }

    /// Slices a single project folder
    pub fn run_single(&mut self, folder: impl AsRef<Path>) -> FolderReport {
        let folder = folder.as_ref();
        let started = Instant::now();
        let mut report = FolderReport::new(folder);

        let jobs = match self.prepare(folder, &mut report) {
            Ok(jobs) => jobs,
            Err(e) => {
                log::warn!("Skipping {}: {e}", folder.display());
                report.failure = Some(FolderFailure::from(&e));
                return report;
            }
        };

        if jobs.is_empty() {
            log::info!("No annotations to slice in {}", folder.display());
        }

        for (i, job) in jobs.iter().enumerate() {
            if self.cookie.is_terminating() {
                log::warn!("Interrupted, skipping the last {} job(s)", jobs.len() - i);
                report.interrupted = true;
                break;
            }
            self.run_job(i, jobs.len(), job, &mut report);
        }

        log::info!(
            "Done with {} in {:?}: {} of {} job(s) failed",
            folder.display(),
            started.elapsed(),
            report.failed,
            report.attempted,
        );
        report
    }

    fn run_job(&mut self, i: usize, total: usize, job: &SliceJob, report: &mut FolderReport) {
        log::debug!(
            "Job {}/{total}: '{}' {} -> {}",
            i + 1,
            job.label,
            job.start_clock(),
            job.end_clock()
        );
        report.attempted += 1;
        let result = fsutils::ensure_dir(&job.output_dir)
            .map_err(|source| ExtractionError::OutputDir {
                dir: job.output_dir.clone(),
                source,
            })
            .and_then(|()| self.extractor.extract(job));
        if let Err(e) = result {
            log::warn!(
                "Failed to extract '{}' ({} -> {}): {e}",
                job.label,
                job.start_clock(),
                job.end_clock()
            );
            report.record_failed_job(FailedJob::new(job, e));
        }
    }

    fn prepare(
        &self,
        folder: &Path,
        report: &mut FolderReport,
    ) -> Result<Vec<SliceJob>, FolderError> {
        let loaded = self.source.load(folder, self.config.elan_file.as_deref())?;
        if let Some(warning) = loaded.warning {
            log::warn!("{}: {warning}", folder.display());
            report.warnings.push(warning.to_string());
        }
        let document = loaded.document;
        report.document = Some(document.path().to_path_buf());

        let video = document.video_path(&self.config.video_ext);
        if !video.is_file() {
            return Err(FolderError::VideoNotFound(video));
        }
        report.video = Some(video.clone());

        let tier = tier_selector::resolve(
            &document,
            self.config.tier_name.as_deref(),
            self.config.tier_index,
        )?;
        let annotations = document.annotations_for_tier(&tier)?;
        log::info!(
            "Tier '{tier}' of {} has {} annotation(s)",
            document.path().display(),
            annotations.len()
        );
        report.tier = Some(tier);
        report.annotations = annotations.len();

        planner::plan(annotations, &video, &self.config.output_root, self.config.fps).map_err(
            |source| FolderError::OutputDir {
                dir: self.config.output_root.clone(),
                source,
            },
        )
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::annotation_source::{Annotation, AnnotationDocument, ReadError, Tier};

    /// Every document has one tier, "gloss", with the labels written in the file, one per
    /// line
    struct LinesReader;

    impl DocumentReader for LinesReader {
        fn read(&self, path: &Path) -> Result<AnnotationDocument, ReadError> {
            let annotations = fs::read_to_string(path)?
                .lines()
                .enumerate()
                .map(|(i, label)| {
                    let start = i as u64 * 100;
                    Annotation::new(start, start + 100, label)
                        .ok_or_else(|| ReadError::Malformed(format!("line {i}")))
                })
                .collect::<Result<_, _>>()?;
            AnnotationDocument::new(
                path,
                vec![Tier {
                    name: "gloss".into(),
                    annotations,
                }],
            )
        }
    }

    /// Fails every job whose label is "bad"
    #[derive(Default)]
    struct Picky {
        seen: Vec<String>,
    }

    impl FrameExtractor for Picky {
        fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError> {
            self.seen.push(job.label.clone());
            if job.label == "bad" {
                return Err(ExtractionError::Timeout(std::time::Duration::from_secs(1)));
            }
            Ok(())
        }
    }

    fn project(dir: &Path, labels: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("session.eaf"), labels).unwrap();
        fs::write(dir.join("session.mp4"), "").unwrap();
    }

    fn new_driver(out: &Path) -> BatchDriver<LinesReader, Picky> {
        BatchDriver::new(config(out), LinesReader, Picky::default())
    }

    fn config(out: &Path) -> SliceConfig {
        SliceConfig {
            output_root: out.to_path_buf(),
            ..SliceConfig::default()
        }
    }

    #[test]
    fn one_bad_job_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a\nbad\nc");

        let mut driver = new_driver(&dir.path().join("out"));
        let report = driver.run_single(&input);

        assert_eq!(None, report.failure);
        assert_eq!(3, report.annotations);
        assert_eq!(3, report.attempted);
        assert_eq!(1, report.failed);
        assert_eq!("bad", report.failed_jobs[0].label);
        assert_eq!("0:00:00.100", report.failed_jobs[0].start);
        assert_eq!(vec!["a", "bad", "c"], driver.into_extractor().seen);
    }

    #[test]
    fn missing_video_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a");
        fs::remove_file(input.join("session.mp4")).unwrap();

        let mut driver = new_driver(&dir.path().join("out"));
        let report = driver.run_single(&input);
        assert_eq!(Some(FailureKind::NotFound), report.failure.map(|f| f.kind));
        assert_eq!(0, report.attempted);
    }

    #[test]
    fn video_extension_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a");
        fs::rename(input.join("session.mp4"), input.join("session.mov")).unwrap();

        let config = SliceConfig {
            video_ext: "mov".into(),
            ..config(&dir.path().join("out"))
        };
        let mut driver = BatchDriver::new(config, LinesReader, Picky::default());
        let report = driver.run_single(&input);
        assert!(report.is_success());
        assert_eq!(Some(input.join("session.mov")), report.video);
    }

    #[test]
    fn tier_failures_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a");
        let out = dir.path().join("out");

        let by_index = SliceConfig {
            tier_index: 2,
            ..config(&out)
        };
        let report = BatchDriver::new(by_index, LinesReader, Picky::default()).run_single(&input);
        assert_eq!(
            Some(FailureKind::TierIndexOutOfRange),
            report.failure.map(|f| f.kind)
        );

        let by_name = SliceConfig {
            tier_name: Some("nope".into()),
            ..config(&out)
        };
        let report = BatchDriver::new(by_name, LinesReader, Picky::default()).run_single(&input);
        assert_eq!(Some(FailureKind::TierNotFound), report.failure.map(|f| f.kind));
    }

    #[test]
    fn load_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a\n\nb");

        let report = new_driver(&dir.path().join("out"))
            .run_single(&input);
        assert_eq!(Some(FailureKind::LoadFailure), report.failure.map(|f| f.kind));
    }

    #[test]
    fn ambiguous_documents_are_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a");
        fs::write(input.join("zzz.eaf"), "b").unwrap();

        let report = new_driver(&dir.path().join("out"))
            .run_single(&input);
        assert!(report.is_success());
        assert_eq!(1, report.warnings.len());
        assert_eq!(Some(input.join("session.eaf")), report.document);
    }

    #[test]
    fn empty_tier_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "");

        let mut driver = new_driver(&dir.path().join("out"));
        let report = driver.run_single(&input);
        assert!(report.is_success());
        assert_eq!(0, report.attempted);
        assert!(driver.into_extractor().seen.is_empty());
    }

    #[test]
    fn interrupted_before_the_first_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a\nb");

        let cookie = Cookie::never();
        cookie.terminate();
        let mut driver = new_driver(&dir.path().join("out"))
            .with_cookie(cookie);
        let report = driver.run_single(&input);
        assert!(report.interrupted);
        assert_eq!(0, report.attempted);
        assert!(driver.run_multi(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn multi_skips_the_output_root() {
        let dir = tempfile::tempdir().unwrap();
        project(&dir.path().join("p1"), "a");
        let out = dir.path().join("zz_out");

        let mut driver = BatchDriver::new(config(&out), LinesReader, Picky::default());
        // the first run creates the output dirs, the second must not walk into them
        driver.run_multi(dir.path()).unwrap();
        let reports = driver.run_multi(dir.path()).unwrap();
        assert_eq!(1, reports.len());
        assert_eq!(dir.path().join("p1"), reports[0].folder);
    }

    #[test]
    fn long_label_does_not_stop_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let long = "a".repeat(300);
        project(&input, &format!("hello\n{long}\nworld"));

        let mut driver = new_driver(&dir.path().join("out"));
        let report = driver.run_single(&input);
        assert_eq!(None, report.failure);
        assert_eq!(3, report.attempted);
        assert_eq!(0, report.failed);
        assert_eq!(vec!["hello", long.as_str(), "world"], driver.into_extractor().seen);
    }

    #[test]
    fn missing_label_dir_fails_only_its_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        project(&input, "a\ntaken\nc");
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("fps_10")).unwrap();
        fs::write(out.join("fps_10").join("taken"), "").unwrap();

        let mut driver = new_driver(&out);
        let report = driver.run_single(&input);
        assert_eq!(None, report.failure);
        assert_eq!(3, report.attempted);
        assert_eq!(1, report.failed);
        assert_eq!("taken", report.failed_jobs[0].label);
        assert_eq!(vec!["a", "c"], driver.into_extractor().seen);
    }

    #[test]
    fn project_folders_leave_out_the_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("fps_10").join("a")).unwrap();
        fs::create_dir_all(dir.path().join("p1").join("deep")).unwrap();

        assert_eq!(
            vec![dir.path().join("p1"), dir.path().join("p1").join("deep")],
            project_folders(dir.path(), &out).unwrap()
        );
        // an output root that doesn't exist yet hides nothing
        assert_eq!(
            2,
            project_folders(&out, &dir.path().join("nowhere")).unwrap().len()
        );
    }
}
