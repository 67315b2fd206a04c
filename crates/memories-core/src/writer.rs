use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

fn file_name(src: &Path) -> Result<&std::ffi::OsStr> {
    src.file_name().ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", src.display()),
        ))
    })
}

/// Directory holding `path`, `.` for a bare file name
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Copy `src` into `dir` under a hidden staging name, stamped with `mtime`.
/// The caller renames it onto the final name.
fn stage_copy(src: &Path, dir: &Path, mtime: FileTime) -> Result<NamedTempFile> {
    let mut staged = tempfile::Builder::new()
        .prefix(".staging-")
        .suffix(".partial")
        .tempfile_in(dir)?;
    io::copy(&mut File::open(src)?, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    filetime::set_file_times(staged.path(), mtime, mtime)?;
    Ok(staged)
}

/// Move a finished file into `output_dir` (created if needed), replacing a
/// previous output of the same name. The final name never holds a partial
/// file: same-filesystem moves are a rename, others go through a staging
/// copy that is renamed into place.
pub fn place_output(src: &Path, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let dest = output_dir.join(file_name(src)?);

    if fs::rename(src, &dest).is_ok() {
        return Ok(dest);
    }

    let mtime = FileTime::from_last_modification_time(&fs::metadata(src)?);
    stage_copy(src, output_dir, mtime)?
        .persist(&dest)
        .map_err(|e| Error::Io(e.error))?;
    fs::remove_file(src)?;
    Ok(dest)
}

/// Copy `src` into `output_dir` untouched, keeping its modification time
/// (also applied as access time).
pub fn copy_through(src: &Path, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let dest = output_dir.join(file_name(src)?);
    let mtime = FileTime::from_last_modification_time(&fs::metadata(src)?);

    stage_copy(src, output_dir, mtime)?
        .persist(&dest)
        .map_err(|e| Error::Io(e.error))?;
    Ok(dest)
}
