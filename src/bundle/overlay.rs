use crate::error::{Error, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Recursively copies `src` onto `dest`. Files replace whatever sits at the
/// same relative path; permission bits and modification times follow the
/// override. Returns the number of files (and symlinks) copied.
pub fn apply(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;
    // Directory metadata is applied last so read-only override dirs can still be filled.
    let mut dirs: Vec<(PathBuf, fs::Metadata)> = Vec::new();

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::InvalidInput(format!("{:?}: {}", entry.path(), e)))?;
        let target = dest.join(rel);
        let meta = entry.metadata()?;
        let existing = fs::symlink_metadata(&target).ok();

        if entry.file_type().is_dir() {
            match existing {
                Some(m) if !m.is_dir() => {
                    return Err(Error::InvalidInput(format!(
                        "override directory {:?} would replace a file",
                        rel
                    )));
                }
                Some(_) => super::make_owner_writable(&target)?,
                None => fs::create_dir(&target)?,
            }
            dirs.push((target, meta));
            continue;
        }

        if let Some(m) = existing {
            if m.is_dir() {
                return Err(Error::InvalidInput(format!(
                    "override file {:?} would replace a directory",
                    rel
                )));
            }
            fs::remove_file(&target)?;
        }

        if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            set_mtime(&target, meta.modified()?)?;
        }

        tracing::debug!("Override applied: {:?}", rel);
        copied += 1;
    }

    for (dir, meta) in dirs.into_iter().rev() {
        fs::set_permissions(&dir, meta.permissions())?;
        set_mtime(&dir, meta.modified()?)?;
    }

    Ok(copied)
}

fn set_mtime(path: &Path, mtime: SystemTime) -> Result<()> {
    File::open(path)?.set_modified(mtime)?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, target: &Path) -> Result<()> {
    fs::copy(src, target)?;
    Ok(())
}
