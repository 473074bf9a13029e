use std::{
    ffi::OsString,
    fs::File,
    io::BufWriter,
    num::NonZeroU32,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use color_eyre::eyre::{self, Context};
use elan_common::{
    bin_common::{
        init::{init_eyre, init_logger},
        termination,
    },
    utils::fsutils::{self, read_optional_file},
};
use elan_slicer::{
    annotation_source::{AnnotationSource, EafReader},
    batch::{self, BatchDriver, SliceConfig},
    frame_extractor::{DryRun, Ffmpeg, FrameExtractor, DEFAULT_QUALITY},
    report::{self, BatchSummary, FolderReport},
};

#[derive(Parser, Debug)]
#[command()]
/// Create video frames for the annotations of ELAN projects.
///
/// Every annotation of the chosen tier is cut out of the video next to the .eaf file and
/// sampled into jpg frames, placed in OUTPUT_DIR/fps_FPS/LABEL/. ffmpeg must be
/// installed.
struct Cli {
    /// Folder with an ELAN (.eaf) file and its video, or with --batch, a folder of such
    /// folders
    input: PathBuf,

    /// Where to place the frames, every annotation label gets its own folder
    #[arg(long, short = 'o', default_value = "./output")]
    output_dir: PathBuf,

    /// Frames per second to sample
    #[arg(long, short = 'f', default_value = "10")]
    fps: NonZeroU32,

    /// Which ELAN file to use if there are several in a folder
    #[arg(long, short = 'e')]
    elan_file: Option<String>,

    /// Name of the tier to take the annotations from, takes precedence over --tier-index
    #[arg(long, short = 't')]
    tier_name: Option<String>,

    /// Index of the tier to take the annotations from, the top tier is 1
    #[arg(long, short = 'i', default_value_t = 1)]
    tier_index: usize,

    /// Extension of the video files
    #[arg(long, short = 'x', default_value = "mp4")]
    video_ext: String,

    /// Treat every folder below INPUT as a project folder
    #[arg(long, short = 'b')]
    batch: bool,

    /// The ffmpeg binary to run
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// jpg quality given to ffmpeg, lower is better
    #[arg(long, short = 'q', default_value_t = DEFAULT_QUALITY)]
    quality: u32,

    /// Give up on a single interval if ffmpeg takes longer than this
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Only log the ffmpeg invocations
    #[arg(long)]
    dry_run: bool,

    /// Print the tiers of the ELAN file(s) and exit
    #[arg(long)]
    list_tiers: bool,

    /// Write the reports of all folders to this file, in RON
    #[arg(long)]
    report: Option<PathBuf>,

    /// A file to additionally write the logs to
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Only show log messages at least this severe
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,
}

impl Cli {
    fn slice_config(&self) -> SliceConfig {
        SliceConfig {
            output_root: self.output_dir.clone(),
            fps: self.fps,
            elan_file: self.elan_file.clone(),
            tier_name: self.tier_name.clone(),
            tier_index: self.tier_index,
            video_ext: self.video_ext.trim_start_matches('.').to_string(),
        }
    }

    fn folders(&self) -> eyre::Result<Vec<PathBuf>> {
        if self.batch {
            batch::project_folders(&self.input, &self.output_dir).wrap_err_with(|| {
                format!("failed to list the folders in {}", self.input.display())
            })
        } else {
            Ok(vec![self.input.clone()])
        }
    }
}

fn cli_arguments() -> eyre::Result<Cli> {
    const ARGS_FILE: &str = ".elanslicerrc";
    let mut args: Vec<OsString> = std::env::args_os().collect();

    if args.len() == 1 {
        if let Some(flags) = read_optional_file(ARGS_FILE)
            .wrap_err_with(|| format!("Could not read config file at: {ARGS_FILE}"))?
        {
            args.extend(
                flags
                    .split_whitespace()
                    .map(|s| std::ffi::OsStr::new(s).to_owned()),
            );
        }
    }

    Ok(Cli::parse_from(args))
}

fn main() -> eyre::Result<ExitCode> {
    init_eyre()?;
    let cli = cli_arguments()?;
    init_logger(cli.logfile.as_deref(), cli.log_level)?;

    log::debug!("CLI arguments: {cli:#?}");

    eyre::ensure!(
        cli.input.is_dir(),
        "the input is not a readable folder: {}",
        cli.input.display()
    );

    if cli.list_tiers {
        list_tiers(&cli)?;
        return Ok(ExitCode::SUCCESS);
    }

    fsutils::ensure_dir(&cli.output_dir).wrap_err_with(|| {
        format!(
            "failed to create the output folder at: {}",
            cli.output_dir.display()
        )
    })?;

    let extractor: Box<dyn FrameExtractor> = if cli.dry_run {
        Box::new(DryRun::new(cli.quality))
    } else {
        Box::new(
            Ffmpeg::new()
                .program(&cli.ffmpeg)
                .quality(cli.quality)
                .timeout(cli.timeout.map(Into::into)),
        )
    };

    let cookie = termination::Cookie::new().wrap_err("failed to create term cookie")?;
    let mut driver =
        BatchDriver::new(cli.slice_config(), EafReader, extractor).with_cookie(cookie);

    let reports = if cli.batch {
        driver.run_multi(&cli.input).wrap_err_with(|| {
            format!("failed to list the folders in {}", cli.input.display())
        })?
    } else {
        vec![driver.run_single(&cli.input)]
    };

    for rep in reports.iter().filter(|rep| !rep.is_success()) {
        log_problems(rep);
    }

    let summary = BatchSummary::new(&reports);
    log::info!("Summary: {summary}");

    if let Some(path) = &cli.report {
        write_report(path, &reports)?;
        log::info!("Wrote the report to {}", path.display());
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_tiers(cli: &Cli) -> eyre::Result<()> {
    let source = AnnotationSource::new(EafReader);
    for folder in cli.folders()? {
        match source.load(&folder, cli.elan_file.as_deref()) {
            Ok(loaded) => {
                println!("{}", loaded.document.path().display());
                for (i, name) in loaded.document.tier_names().enumerate() {
                    println!("  {}: {}", i + 1, name);
                }
            }
            Err(e) => log::warn!("{}: {e}", folder.display()),
        }
    }
    Ok(())
}

fn log_problems(rep: &FolderReport) {
    if let Some(failure) = &rep.failure {
        log::error!(
            "{} was skipped ({:?}): {}",
            rep.folder.display(),
            failure.kind,
            failure.message
        );
    }
    for job in &rep.failed_jobs {
        log::error!(
            "{}: '{}' {} -> {} failed: {}",
            rep.folder.display(),
            job.label,
            job.start,
            job.end,
            job.cause
        );
    }
}

fn write_report(path: &Path, reports: &[FolderReport]) -> eyre::Result<()> {
    let file = File::create(path)
        .wrap_err_with(|| format!("failed to create the report at: {}", path.display()))?;
    report::save_to(BufWriter::new(file), reports).wrap_err("failed to write the report")
}
