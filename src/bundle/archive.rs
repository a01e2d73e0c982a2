use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tar::{Archive, Builder, Entry, EntryType};
use walkdir::WalkDir;

/// Unpacks `archive` into `dest`, keeping permission bits and mtimes.
/// Directory entries are applied after every other entry, so a read-only
/// directory can still receive its contents. Returns the number of entries
/// unpacked.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let fail = |e: io::Error| Error::ExtractionFailed(format!("{:?}: {}", archive, e));

    let file = File::open(archive).map_err(fail)?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    tarball.set_preserve_permissions(true);
    tarball.set_preserve_mtime(true);
    tarball.set_overwrite(true);

    fs::create_dir_all(dest)?;

    let mut count = 0;
    let mut directories = Vec::new();
    for entry in tarball.entries().map_err(fail)? {
        let mut entry = entry.map_err(fail)?;
        if entry.header().entry_type() == EntryType::Directory {
            directories.push(entry);
            continue;
        }
        unpack_entry(&mut entry, archive, dest)?;
        count += 1;
    }

    // Deepest first, so a parent's mode lands after its children's.
    directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
    for mut dir in directories {
        unpack_entry(&mut dir, archive, dest)?;
        count += 1;
    }

    tracing::debug!("Unpacked {} entries from {:?} into {:?}", count, archive, dest);
    Ok(count)
}

fn unpack_entry<R: io::Read>(
    entry: &mut Entry<'_, R>,
    archive: &Path,
    dest: &Path,
) -> Result<()> {
    let fail = |e: io::Error| Error::ExtractionFailed(format!("{:?}: {}", archive, e));

    if !entry.unpack_in(dest).map_err(fail)? {
        let path = entry.path().map_err(fail)?.into_owned();
        return Err(Error::ExtractionFailed(format!(
            "{:?}: entry {:?} escapes the destination",
            archive, path
        )));
    }
    Ok(())
}

/// Archives everything under `src_dir` into `output`, with entry names
/// relative to `src_dir`. The archive is staged next to `output` and renamed
/// into place once complete, so `output` is never left half-written.
/// Returns the number of entries written.
pub fn create(src_dir: &Path, output: &Path) -> Result<usize> {
    let fail = |e: io::Error| Error::ArchiveFailed(format!("{:?}: {}", output, e));

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(fail)?;

    let staged = tempfile::Builder::new()
        .prefix(".model-bundler-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(fail)?;

    let mut top_level = fs::read_dir(src_dir)
        .map_err(fail)?
        .collect::<io::Result<Vec<_>>>()
        .map_err(fail)?;
    top_level.sort_by_key(|entry| entry.file_name());

    let mut builder = Builder::new(GzEncoder::new(staged, Compression::default()));
    builder.follow_symlinks(false);

    for entry in &top_level {
        let name = entry.file_name();
        let path = entry.path();
        if entry.file_type().map_err(fail)?.is_dir() {
            builder.append_dir_all(&name, &path).map_err(fail)?;
        } else {
            builder.append_path_with_name(&path, &name).map_err(fail)?;
        }
    }

    let staged = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(fail)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(fail)?;
    }
    staged.as_file().sync_all().map_err(fail)?;
    staged.persist(output).map_err(|e| fail(e.error))?;

    let count = WalkDir::new(src_dir).min_depth(1).into_iter().count();
    Ok(count)
}

/// Entry paths of a `.tar.gz` in archive order.
pub fn list(archive: &Path) -> Result<Vec<String>> {
    let fail = |e: io::Error| Error::ExtractionFailed(format!("{:?}: {}", archive, e));

    let file = File::open(archive).map_err(fail)?;
    let mut tarball = Archive::new(GzDecoder::new(file));

    let mut paths = Vec::new();
    for entry in tarball.entries().map_err(fail)? {
        let entry = entry.map_err(fail)?;
        let path = entry.path().map_err(fail)?;
        paths.push(path.to_string_lossy().into_owned());
    }
    Ok(paths)
}

/// Hex-encoded SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn test_create_uses_relative_names() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("tree");
        write_tree(&src, &[("weights.bin", "w"), ("code/handler.py", "h")]);

        let output = temp.path().join("out").join("model.tar.gz");
        let count = create(&src, &output).unwrap();
        assert_eq!(count, 3);

        let mut entries: Vec<String> = list(&output)
            .unwrap()
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["code", "code/handler.py", "weights.bin"]);
        assert!(entries.iter().all(|e| !e.starts_with("./")));
    }

    #[test]
    fn test_create_then_extract() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("tree");
        write_tree(&src, &[("a/b/c.txt", "deep"), ("top.json", "{}")]);

        let output = temp.path().join("model.tar.gz");
        create(&src, &output).unwrap();

        let dest = temp.path().join("unpacked");
        extract(&output, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("a/b/c.txt")).unwrap(), "deep");
        assert_eq!(fs::read_to_string(dest.join("top.json")).unwrap(), "{}");
    }

    #[test]
    fn test_failed_create_leaves_existing_output() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("model.tar.gz");
        fs::write(&output, b"previous").unwrap();

        let result = create(&temp.path().join("missing"), &output);
        assert!(matches!(result, Err(Error::ArchiveFailed(_))));
        assert_eq!(fs::read(&output).unwrap(), b"previous");

        let leftovers: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("model.tar.gz");
        fs::write(&bogus, b"definitely not gzip").unwrap();

        let result = extract(&bogus, &temp.path().join("build"));
        assert!(matches!(result, Err(Error::ExtractionFailed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_fills_read_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o555);
        dir.set_cksum();
        builder.append_data(&mut dir, "unet/", io::empty()).unwrap();

        let mut file = tar::Header::new_gnu();
        file.set_size(7);
        file.set_mode(0o644);
        file.set_cksum();
        builder.append_data(&mut file, "unet/weights.bin", &b"weights"[..]).unwrap();

        let bytes = builder.into_inner().unwrap().finish().unwrap();
        let archive = temp.path().join("model.tar.gz");
        fs::write(&archive, bytes).unwrap();

        let dest = temp.path().join("dest");
        assert_eq!(extract(&archive, &dest).unwrap(), 2);

        let unet = dest.join("unet");
        assert_eq!(fs::read(unet.join("weights.bin")).unwrap(), b"weights");
        assert_eq!(fs::metadata(&unet).unwrap().permissions().mode() & 0o777, 0o555);

        crate::bundle::make_tree_writable(&dest).unwrap();
    }

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
