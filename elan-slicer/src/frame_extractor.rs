//! Runs ffmpeg to turn a [`SliceJob`] into a sequence of jpg frames.

use std::{
    ffi::OsString,
    io::{self, Read},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use elan_common::utils::fsutils;

use crate::planner::{SliceJob, FRAME_EXTENSION};

/// ffmpeg's `-q:v`, 2 is about as good as jpg gets
pub const DEFAULT_QUALITY: u32 = 2;

/// How often to check on a running ffmpeg when there is a timeout
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How much of ffmpeg's stderr to keep in an error
const STDERR_TAIL: usize = 2000;

/// Something that can carry out slice jobs
pub trait FrameExtractor {
    fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError>;
}

impl<E: FrameExtractor + ?Sized> FrameExtractor for &mut E {
    fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError> {
        (**self).extract(job)
    }
}

impl<E: FrameExtractor + ?Sized> FrameExtractor for Box<E> {
    fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError> {
        (**self).extract(job)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to inspect the output dir {}: {source}", dir.display())]
    OutputDir { dir: PathBuf, source: io::Error },
    #[error("failed to start {}: {source}", program.display())]
    Spawn { program: PathBuf, source: io::Error },
    #[error("failed while waiting on ffmpeg: {0}")]
    Wait(#[source] io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Status { status: ExitStatus, stderr: String },
    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(Duration),
}

/// The arguments to give ffmpeg for `job`, with the frames numbered from `start_number`.
/// The interval is cut after the input so that it is frame accurate.
pub fn ffmpeg_args(job: &SliceJob, quality: u32, start_number: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        job.video.clone().into(),
        "-ss".into(),
        job.start_clock().into(),
        "-to".into(),
        job.end_clock().into(),
        "-vf".into(),
        format!("fps={}", job.fps).into(),
        "-q:v".into(),
        quality.to_string().into(),
        "-start_number".into(),
        start_number.to_string().into(),
    ];
    args.push(job.output_pattern().into());
    args
}

/// Runs the real ffmpeg binary, one process per job
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    program: PathBuf,
    quality: u32,
    timeout: Option<Duration>,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            quality: DEFAULT_QUALITY,
            timeout: None,
        }
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    /// Kill ffmpeg if a single job takes longer than this
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, job: &SliceJob) -> Result<Command, ExtractionError> {
        let start_number = next_start_number(job)?;
        let mut cmd = Command::new(&self.program);
        cmd.args(ffmpeg_args(job, self.quality, start_number))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        Ok(cmd)
    }

    fn run(&self, mut cmd: Command) -> Result<(), ExtractionError> {
        let mut child = cmd.spawn().map_err(|source| ExtractionError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let (status, stderr) = match self.timeout {
            None => {
                let output = child.wait_with_output().map_err(ExtractionError::Wait)?;
                (output.status, String::from_utf8_lossy(&output.stderr).into_owned())
            }
            Some(timeout) => {
                // ffmpeg blocks once the pipe is full, so it is read while waiting
                let drain = child.stderr.take().map(|mut pipe| {
                    thread::spawn(move || {
                        let mut buf = Vec::new();
                        if let Err(e) = pipe.read_to_end(&mut buf) {
                            log::debug!("Could not read ffmpeg's stderr: {e}");
                        }
                        buf
                    })
                });
                let status = wait_timeout(&mut child, timeout);
                let stderr = drain
                    .and_then(|handle| handle.join().ok())
                    .unwrap_or_default();
                (status?, String::from_utf8_lossy(&stderr).into_owned())
            }
        };

        if status.success() {
            return Ok(());
        }

        Err(ExtractionError::Status {
            status,
            stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
        })
    }
}

impl FrameExtractor for Ffmpeg {
    fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError> {
        let cmd = self.command(job)?;
        log::debug!("Running {:?}", cmd);
        self.run(cmd)
    }
}

/// Only logs what would have been run
#[derive(Clone, Debug)]
pub struct DryRun {
    quality: u32,
}

impl Default for DryRun {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl DryRun {
    pub fn new(quality: u32) -> Self {
        Self { quality }
    }
}

impl FrameExtractor for DryRun {
    fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError> {
        let start_number = next_start_number(job)?;
        let args = ffmpeg_args(job, self.quality, start_number);
        log::info!("Would run: ffmpeg {:?}", args);
        Ok(())
    }
}

/// Continue after the frames earlier jobs left in the same folder
fn next_start_number(job: &SliceJob) -> Result<u32, ExtractionError> {
    fsutils::next_frame_number(&job.output_dir, &job.frame_prefix, FRAME_EXTENSION).map_err(
        |source| ExtractionError::OutputDir {
            dir: job.output_dir.clone(),
            source,
        },
    )
}

/// Polls the child until it exits, or kills it once `timeout` has passed
fn wait_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, ExtractionError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(ExtractionError::Wait)? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill ffmpeg: {e}");
            }
            child.wait().map_err(ExtractionError::Wait)?;
            return Err(ExtractionError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// The last `max` bytes of `s`, or a bit less to land on a char boundary
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
