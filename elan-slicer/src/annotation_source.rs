pub mod eaf;

use std::{
    collections::HashSet,
    fmt, io,
    path::{Path, PathBuf},
};

use elan_common::utils::fsutils;

use crate::tier_selector::TierError;

pub use eaf::EafReader;

/// Extension of ELAN annotation documents, without the dot
pub const DOCUMENT_EXTENSION: &str = "eaf";

/// A labeled time interval on a tier. `start_ms <= end_ms` and the label is non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    start_ms: u64,
    end_ms: u64,
    label: String,
}

impl Annotation {
    /// Returns None if the interval is inverted or the label is empty
    pub fn new(start_ms: u64, end_ms: u64, label: impl Into<String>) -> Option<Self> {
        let label = label.into();
        if end_ms < start_ms || label.is_empty() {
            return None;
        }
        Some(Self {
            start_ms,
            end_ms,
            label,
        })
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    pub name: String,
    pub annotations: Vec<Annotation>,
}

/// A loaded annotation project. Tiers keep the order of the document.
#[derive(Debug)]
pub struct AnnotationDocument {
    path: PathBuf,
    tiers: Vec<Tier>,
}

impl AnnotationDocument {
    pub fn new(path: impl Into<PathBuf>, tiers: Vec<Tier>) -> Result<Self, ReadError> {
        let mut seen = HashSet::new();
        if let Some(dup) = tiers.iter().find(|t| !seen.insert(t.name.as_str())) {
            return Err(ReadError::Malformed(format!(
                "the tier '{}' appears more than once",
                dup.name
            )));
        }
        Ok(Self {
            path: path.into(),
            tiers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tier_names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.tiers.iter().map(|t| t.name.as_str())
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn annotations_for_tier(&self, name: &str) -> Result<&[Annotation], TierError> {
        self.tiers
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.annotations.as_slice())
            .ok_or_else(|| TierError::NotFound {
                name: name.to_string(),
            })
    }

    /// The video next to the document, with the same base name
    pub fn video_path(&self, video_ext: &str) -> PathBuf {
        self.path.with_extension(video_ext)
    }
}

/// Parses annotation documents from disk
pub trait DocumentReader {
    fn read(&self, path: &Path) -> Result<AnnotationDocument, ReadError>;
}

impl<R: DocumentReader + ?Sized> DocumentReader for &R {
    fn read(&self, path: &Path) -> Result<AnnotationDocument, ReadError> {
        (**self).read(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed document: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no .eaf file found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to list {}: {source}", dir.display())]
    List { dir: PathBuf, source: io::Error },
    #[error("failed to load {}: {source}", path.display())]
    Load { path: PathBuf, source: ReadError },
}

/// Not an error, the document was chosen anyway
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceWarning {
    Ambiguous {
        chosen: PathBuf,
        candidates: Vec<PathBuf>,
    },
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceWarning::Ambiguous { chosen, candidates } => write!(
                f,
                "found {} .eaf files, using {}. Select one explicitly with --elan-file",
                candidates.len(),
                chosen.display(),
            ),
        }
    }
}

pub struct Loaded {
    pub document: AnnotationDocument,
    pub warning: Option<SourceWarning>,
}

/// Finds and opens the annotation document of a project folder
pub struct AnnotationSource<R> {
    reader: R,
}

impl<R: DocumentReader> AnnotationSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn load(
        &self,
        folder: impl AsRef<Path>,
        explicit: Option<&str>,
    ) -> Result<Loaded, SourceError> {
        let (path, warning) = locate_document(folder, explicit)?;
        let document = self
            .reader
            .read(&path)
            .map_err(|source| SourceError::Load {
                path: path.clone(),
                source,
            })?;
        Ok(Loaded { document, warning })
    }
}

/// Figures out which document to open in `folder`. An explicit name gets the extension
/// appended if it is missing. Otherwise the folder is searched, and if there are several
/// candidates the one sorting first by name is chosen and a warning is returned.
pub fn locate_document(
    folder: impl AsRef<Path>,
    explicit: Option<&str>,
) -> Result<(PathBuf, Option<SourceWarning>), SourceError> {
    let folder = folder.as_ref();

    if let Some(name) = explicit {
        let mut path = folder.join(name);
        if !fsutils::has_extension(&path, DOCUMENT_EXTENSION) {
            let mut with_ext = path.into_os_string();
            with_ext.push(".");
            with_ext.push(DOCUMENT_EXTENSION);
            path = with_ext.into();
        }
        if !path.is_file() {
            return Err(SourceError::NotFound(path));
        }
        return Ok((path, None));
    }

    let mut candidates = fsutils::files_with_extension(folder, DOCUMENT_EXTENSION)
        .map_err(|source| SourceError::List {
            dir: folder.to_path_buf(),
            source,
        })?;
    candidates.sort_by(|a, b| b.cmp(a));

    let Some(chosen) = candidates.last().cloned() else {
        return Err(SourceError::NotFound(folder.to_path_buf()));
    };
    let warning = (candidates.len() > 1).then(|| SourceWarning::Ambiguous {
        chosen: chosen.clone(),
        candidates,
    });
    Ok((chosen, warning))
}
