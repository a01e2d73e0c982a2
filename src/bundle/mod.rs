pub mod archive;
pub mod overlay;

use crate::config::{CollisionPolicy, Config};
use crate::error::{Error, Result};
use crate::source::{Fetch, Source};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const MODEL_ARCHIVE: &str = "model.tar.gz";
pub const CODE_ARCHIVE: &str = "model_inference_code.tar.gz";
pub const BUILD_DIR: &str = "build";
pub const CODE_DIR: &str = "code";
pub const OVERRIDES_DIR: &str = "overrides";

/// Every path one bundling run touches, derived from the two roots.
#[derive(Debug, Clone)]
pub struct Layout {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub model_archive: PathBuf,
    pub code_archive: PathBuf,
    pub build_dir: PathBuf,
    pub code_dir: PathBuf,
    pub overrides_dir: PathBuf,
    pub output_archive: PathBuf,
}

impl Layout {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        let input_root = input_root.into();
        let output_root = output_root.into();
        let build_dir = input_root.join(BUILD_DIR);

        Self {
            model_archive: input_root.join(MODEL_ARCHIVE),
            code_archive: input_root.join(CODE_ARCHIVE),
            code_dir: build_dir.join(CODE_DIR),
            overrides_dir: input_root.join(OVERRIDES_DIR),
            output_archive: output_root.join(MODEL_ARCHIVE),
            build_dir,
            input_root,
            output_root,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.input_dir, &config.output_dir)
    }

    /// Creates both roots and rejects layouts where they are the same
    /// directory, or where the output root lives inside the build directory.
    /// The first would have cleanup delete the output archive, the second
    /// would have step 3 wipe the output root.
    fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.input_root)?;
        fs::create_dir_all(&self.output_root)?;

        let input = fs::canonicalize(&self.input_root)?;
        let output = fs::canonicalize(&self.output_root)?;

        if input == output {
            return Err(Error::InvalidInput(format!(
                "input and output roots must differ (both are {:?})",
                self.input_root
            )));
        }
        if output.starts_with(input.join(BUILD_DIR)) {
            return Err(Error::InvalidInput(format!(
                "output root {:?} must not be inside the build directory {:?}",
                self.output_root, self.build_dir
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub output: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub entries: usize,
    pub overrides_applied: usize,
    pub bundled_at: String,
}

pub struct Bundler<F: Fetch> {
    layout: Layout,
    fetcher: F,
    collision_policy: CollisionPolicy,
}

impl<F: Fetch> Bundler<F> {
    pub fn new(layout: Layout, fetcher: F, collision_policy: CollisionPolicy) -> Self {
        Self {
            layout,
            fetcher,
            collision_policy,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Fetches both archives, merges them into the build tree, overlays any
    /// overrides, writes the output archive and removes the intermediates.
    ///
    /// Any failure stops the run immediately; intermediates are left behind.
    pub fn run(&self, model: &Source, code: &Source) -> Result<BundleReport> {
        let layout = &self.layout;
        layout.prepare()?;

        tracing::info!("[1/9] Fetching model archive");
        self.fetcher.fetch(model, &layout.model_archive)?;

        tracing::info!("[2/9] Fetching inference code archive");
        self.fetcher.fetch(code, &layout.code_archive)?;

        tracing::info!("[3/9] Creating build directory {:?}", layout.build_dir);
        if layout.build_dir.exists() {
            tracing::warn!("Removing stale build directory {:?}", layout.build_dir);
            remove_tree(&layout.build_dir)?;
        }
        fs::create_dir_all(&layout.build_dir)?;

        tracing::info!("[4/9] Extracting model archive");
        let model_entries = archive::extract(&layout.model_archive, &layout.build_dir)?;
        tracing::info!("Extracted {} model entries", model_entries);

        tracing::info!("[5/9] Creating {:?}", layout.code_dir);
        self.make_code_dir()?;

        tracing::info!("[6/9] Extracting inference code archive");
        let code_entries = archive::extract(&layout.code_archive, &layout.code_dir)?;
        tracing::info!("Extracted {} inference code entries", code_entries);

        tracing::info!("[7/9] Applying overrides");
        let overrides_applied = if layout.overrides_dir.is_dir() {
            let count = overlay::apply(&layout.overrides_dir, &layout.build_dir)?;
            tracing::info!("Applied {} override files from {:?}", count, layout.overrides_dir);
            count
        } else {
            tracing::info!("No overrides directory at {:?}, skipping", layout.overrides_dir);
            0
        };

        tracing::info!("[8/9] Writing {:?}", layout.output_archive);
        let entries = archive::create(&layout.build_dir, &layout.output_archive)?;

        tracing::info!("[9/9] Removing intermediates");
        remove_tree(&layout.build_dir)?;
        fs::remove_file(&layout.model_archive)?;
        fs::remove_file(&layout.code_archive)?;

        let report = BundleReport {
            output: layout.output_archive.clone(),
            size_bytes: fs::metadata(&layout.output_archive)?.len(),
            sha256: archive::sha256_file(&layout.output_archive)?,
            entries,
            overrides_applied,
            bundled_at: chrono::Utc::now().to_rfc3339(),
        };

        tracing::info!(
            "Bundle complete: {:?} ({} bytes, sha256 {})",
            report.output,
            report.size_bytes,
            report.sha256
        );
        Ok(report)
    }

    fn make_code_dir(&self) -> Result<()> {
        let code_dir = &self.layout.code_dir;

        if let Ok(existing) = fs::symlink_metadata(code_dir) {
            match self.collision_policy {
                CollisionPolicy::Error => {
                    return Err(Error::PathCollision(PathBuf::from(CODE_DIR)));
                }
                CollisionPolicy::Overwrite => {
                    tracing::warn!(
                        "Model archive already contains {:?}; inference code will overwrite it",
                        CODE_DIR
                    );
                    if existing.is_dir() {
                        make_tree_writable(code_dir)?;
                    } else {
                        fs::remove_file(code_dir)?;
                    }
                }
            }
        }

        fs::create_dir_all(code_dir)?;
        Ok(())
    }
}

/// Adds owner write permission to every directory under `root`, so archives
/// that ship read-only directories can be filled or removed.
pub(crate) fn make_tree_writable(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            make_owner_writable(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn make_owner_writable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(dir)?.permissions().mode();
    if mode & 0o700 != 0o700 {
        fs::set_permissions(dir, fs::Permissions::from_mode(mode | 0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn make_owner_writable(dir: &Path) -> Result<()> {
    let mut perms = fs::metadata(dir)?.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        fs::set_permissions(dir, perms)?;
    }
    Ok(())
}

fn remove_tree(root: &Path) -> Result<()> {
    make_tree_writable(root)?;
    fs::remove_dir_all(root)?;
    Ok(())
}
