use std::{
    fs, io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

/// Checks whether the path is simply a filename, i.e., a normal part of a path.
pub fn is_basename(path: impl AsRef<Path>) -> bool {
    let mut components = path.as_ref().components();
    let Some(std::path::Component::Normal(_)) = components.next() else {
        return false;
    };
    components.next().is_none()
}

/// Whether `path` ends with `.{ext}`, ignoring ASCII case. `ext` is given without the dot.
pub fn has_extension(path: impl AsRef<Path>, ext: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Collects all regular files in `dir` with the extension `ext`, does not walk it
/// recursively. The result is sorted by path.
pub fn files_with_extension(dir: impl AsRef<Path>, ext: &str) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if has_extension(&path, ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every directory below `root`, at any depth, but not `root` itself. Siblings come in
/// file name order and parents before their children. Subdirectories that can't be read
/// are logged and skipped, but an unreadable `root` is an error.
pub fn all_subdirs(root: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let root = root.as_ref();
    fs::read_dir(root)?;

    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
            Ok(_) => (),
            Err(e) => log::warn!("Skipping a path below {}: {e}", root.display()),
        }
    }
    Ok(dirs)
}

/// Creates the directory and all of its parents, unless it already exists.
pub fn ensure_dir(dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "exists but is not a dir",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(dir),
        Err(e) => Err(e),
    }
}

/// Finds the number to give the next frame in a sequence named `{prefix}_NNNN.{ext}`
/// inside `dir`, i.e., one more than the highest number already there. Starts at 1, like
/// ffmpeg does, if there is no such file or `dir` doesn't exist.
pub fn next_frame_number(dir: impl AsRef<Path>, prefix: &str, ext: &str) -> io::Result<u32> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(e),
    };

    let mut maximum: Option<u32> = None;
    for entry in entries {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(num) = frame_number(name, prefix, ext) {
            maximum = Some(maximum.map_or(num, |m| m.max(num)));
        }
    }

    Ok(maximum.map_or(1, |max| max.saturating_add(1)))
}

fn frame_number(name: &str, prefix: &str, ext: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(ext)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Try to read the file, return None if it doesn't exist
pub fn read_optional_file(path: impl AsRef<Path>) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
        Ok(s) => Ok(Some(s)),
    }
}
