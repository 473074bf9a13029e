use std::{
    io,
    num::NonZeroU32,
    path::{Path, PathBuf},
};

use elan_common::utils::{clock::millis_to_clock, fsutils};

use crate::{annotation_source::Annotation, sanitize::sanitize};

/// Extension of the extracted frames
pub const FRAME_EXTENSION: &str = "jpg";

/// One interval of the video to turn into frames
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceJob {
    pub start_ms: u64,
    pub end_ms: u64,
    pub label: String,
    pub fps: NonZeroU32,
    pub video: PathBuf,
    pub output_dir: PathBuf,
    /// Frames are named `{frame_prefix}_NNNN.jpg`
    pub frame_prefix: String,
}

impl SliceJob {
    pub fn start_clock(&self) -> String {
        millis_to_clock(self.start_ms)
    }

    pub fn end_clock(&self) -> String {
        millis_to_clock(self.end_ms)
    }

    /// Where the tool should write the frames, `%04d` is replaced by the frame number
    pub fn output_pattern(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_%04d.{FRAME_EXTENSION}", self.frame_prefix))
    }
}

/// All frames of one sample rate go below this directory
pub fn fps_dir(output_root: impl AsRef<Path>, fps: NonZeroU32) -> PathBuf {
    output_root.as_ref().join(format!("fps_{fps}"))
}

/// Creates one job per annotation, in the same order, and creates the output directories.
/// Only a missing `fps_<n>` directory is an error. A label directory that can't be created
/// is logged and left to fail its own job.
pub fn plan(
    annotations: &[Annotation],
    video: &Path,
    output_root: &Path,
    fps: NonZeroU32,
) -> io::Result<Vec<SliceJob>> {
    let frame_prefix = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "the video path has no file name")
        })?;
    let fps_root = fps_dir(output_root, fps);
    fsutils::ensure_dir(&fps_root)?;

    let mut jobs = Vec::with_capacity(annotations.len());
    for annotation in annotations {
        let segment = sanitize(annotation.label());
        debug_assert!(fsutils::is_basename(&segment));
        let output_dir = fps_root.join(segment);
        if let Err(e) = fsutils::ensure_dir(&output_dir) {
            log::warn!("Could not create {}: {e}", output_dir.display());
        }

        jobs.push(SliceJob {
            start_ms: annotation.start_ms(),
            end_ms: annotation.end_ms(),
            label: annotation.label().to_string(),
            fps,
            video: video.to_path_buf(),
            output_dir,
            frame_prefix: frame_prefix.clone(),
        });
    }

    Ok(jobs)
}
