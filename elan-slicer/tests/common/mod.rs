// NOTE: every test will complain about the functions it doesn't use
#![allow(unused)]

use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};

use elan_slicer::{
    frame_extractor::{ffmpeg_args, ExtractionError, FrameExtractor},
    planner::SliceJob,
};
use tempfile::TempDir;

/// Returns a temporary directory inside cargo's tmpdir
pub fn tmp_dir() -> TempDir {
    tempfile::tempdir_in(cargo_tmpdir()).expect("could not create temporary dir")
}

/// Returns cargo's tmpdir
pub fn cargo_tmpdir() -> PathBuf {
    PathBuf::from(option_env!("CARGO_TARGET_TMPDIR").expect("no cargo tmpdir???"))
}

/// A tier name and its `(start_ms, end_ms, label)`
pub type TierSpec<'a> = (&'a str, &'a [(u64, u64, &'a str)]);

/// Renders a minimal ELAN document
pub fn eaf(tiers: &[TierSpec]) -> String {
    let mut slots = String::new();
    let mut body = String::new();
    let mut next_slot = 1;
    let mut next_annotation = 1;

    for (name, annotations) in tiers {
        writeln!(body, r#"  <TIER LINGUISTIC_TYPE_REF="default-lt" TIER_ID="{name}">"#).unwrap();
        for (start, end, label) in annotations.iter() {
            let (s1, s2) = (next_slot, next_slot + 1);
            next_slot += 2;
            writeln!(slots, r#"    <TIME_SLOT TIME_SLOT_ID="ts{s1}" TIME_VALUE="{start}"/>"#)
                .unwrap();
            writeln!(slots, r#"    <TIME_SLOT TIME_SLOT_ID="ts{s2}" TIME_VALUE="{end}"/>"#)
                .unwrap();
            writeln!(
                body,
                r#"    <ANNOTATION><ALIGNABLE_ANNOTATION ANNOTATION_ID="a{next_annotation}" TIME_SLOT_REF1="ts{s1}" TIME_SLOT_REF2="ts{s2}"><ANNOTATION_VALUE>{label}</ANNOTATION_VALUE></ALIGNABLE_ANNOTATION></ANNOTATION>"#
            )
            .unwrap();
            next_annotation += 1;
        }
        writeln!(body, "  </TIER>").unwrap();
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ANNOTATION_DOCUMENT AUTHOR="" FORMAT="3.0" VERSION="3.0">
  <HEADER MEDIA_FILE="" TIME_UNITS="milliseconds"/>
  <TIME_ORDER>
{slots}  </TIME_ORDER>
{body}  <LINGUISTIC_TYPE LINGUISTIC_TYPE_ID="default-lt" TIME_ALIGNABLE="true"/>
</ANNOTATION_DOCUMENT>
"#
    )
}

/// Creates a project folder with `{name}.eaf` and an empty `{name}.mp4`
pub fn project(dir: &Path, name: &str, tiers: &[TierSpec]) {
    fs::create_dir_all(dir).expect("could not create the project dir");
    fs::write(dir.join(format!("{name}.eaf")), eaf(tiers)).expect("could not write eaf");
    fs::write(dir.join(format!("{name}.mp4")), "").expect("could not write video");
}

/// Remembers every job, and the ffmpeg arguments it would have gotten
#[derive(Default)]
pub struct Recorder {
    pub jobs: Vec<SliceJob>,
    pub args: Vec<Vec<String>>,
    /// Labels to fail on
    pub fail_on: Vec<String>,
}

impl Recorder {
    pub fn failing_on(labels: &[&str]) -> Self {
        Self {
            fail_on: labels.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    /// The value right after `flag` in the arguments of job `i`
    pub fn arg_after(&self, i: usize, flag: &str) -> &str {
        let args = &self.args[i];
        let pos = args
            .iter()
            .position(|a| a == flag)
            .unwrap_or_else(|| panic!("no {flag} in {args:?}"));
        &args[pos + 1]
    }
}

impl FrameExtractor for Recorder {
    fn extract(&mut self, job: &SliceJob) -> Result<(), ExtractionError> {
        self.jobs.push(job.clone());
        self.args.push(
            ffmpeg_args(job, 2, 1)
                .into_iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        );
        if self.fail_on.contains(&job.label) {
            return Err(ExtractionError::Status {
                status: failed_status(),
                stderr: "recorder says no".into(),
            });
        }
        Ok(())
    }
}

#[cfg(unix)]
fn failed_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1 << 8)
}

#[cfg(windows)]
fn failed_status() -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1)
}
