use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;

pub trait FsExt {
    // Converts the provided relative path to be based from the path of the currently working directory.
    // If the path is absolute, then it returns the absolute path.
    fn relative_to_cwd(&self) -> Result<PathBuf>
    where
        Self: AsRef<Path>,
    {
        let cwd_dir = std::env::current_dir()?;

        Ok(cwd_dir.join(self))
    }
}

impl FsExt for String {}

impl FsExt for &'static str {}

impl FsExt for PathBuf {}

/// Writes a file so that readers either see the previous contents or the complete new contents.
///
/// The contents are written to a temporary file in the destination directory, flushed and synced,
/// then renamed over `path`. Temporary files are prefixed with `.tmp` so directory scans can skip them.
pub fn write_atomic<F>(path: impl AsRef<Path>, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let path = path.as_ref();
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("{:?} does not have a parent directory", path))?;

    fs::create_dir_all(dir)?;

    let temp_file = tempfile::Builder::new()
        .prefix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {:?}", dir))?;

    {
        let mut writer = BufWriter::new(temp_file.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }

    persist(temp_file, path)
}

fn persist(temp_file: NamedTempFile, path: &Path) -> Result<()> {
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to move temporary file to {:?}", path))?;

    sync_dir(path)
}

// Renames are only durable once the containing directory entry is flushed.
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        File::open(dir)?.sync_all()?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}

pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(".tmp"))
}
