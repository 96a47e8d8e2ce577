//! Packs a directory tree into a single zip file.
//!
//! Entries are written in walk order with children sorted by file name, so the
//! same tree always yields the same entry sequence. Every entry carries the same
//! fixed timestamp. Symlinks are stored as link entries and never followed.
//!
//! Names that are not valid UTF-8 keep their invalid bytes as `%XX` escapes.
//! Should an escaped name clash with an existing entry, it gets a `~N` suffix.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::BackupError;

/// What ended up in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    /// Entries stored under an escaped or deduplicated name.
    pub renamed: usize,
}

impl ArchiveSummary {
    pub fn entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }
}

/// Writes every file, directory and symlink below `root` into `out_file`.
///
/// Entry names are relative to `root` and use `/` separators. `root` itself is
/// not an entry. A partially written archive is removed on failure.
#[instrument(fields(root = %root.display(), out = %out_file.display()))]
pub fn archive(root: &Path, out_file: &Path) -> Result<ArchiveSummary, BackupError> {
    let result = write_archive(root, out_file);
    if result.is_err() && out_file.exists() {
        if let Err(e) = fs::remove_file(out_file) {
            warn!(error = ?e, path = %out_file.display(), "Failed to remove partial archive");
        }
    }
    result
}

fn write_archive(root: &Path, out_file: &Path) -> Result<ArchiveSummary, BackupError> {
    let root_meta =
        fs::metadata(root).map_err(|e| BackupError::io("cannot read archive root", root, e))?;
    if !root_meta.is_dir() {
        return Err(BackupError::io(
            "archive root is not a directory",
            root,
            io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }
    let root_canonical = fs::canonicalize(root)
        .map_err(|e| BackupError::io("cannot resolve archive root", root, e))?;

    let file = File::create(out_file)
        .map_err(|e| BackupError::io("cannot create archive", out_file, e))?;
    let out_canonical = fs::canonicalize(out_file)
        .map_err(|e| BackupError::io("cannot resolve archive path", out_file, e))?;

    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut summary = ArchiveSummary {
        path: out_file.to_path_buf(),
        files: 0,
        directories: 0,
        symlinks: 0,
        renamed: 0,
    };
    let mut names = EntryNames::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1);

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            BackupError::io("failed to walk archive root", path, e.into())
        })?;
        let path = entry.path();
        let is_archive = path
            .strip_prefix(root)
            .map(|relative| root_canonical.join(relative) == out_canonical)
            .unwrap_or(false);
        if is_archive {
            debug!(path = %path.display(), "Skipping the archive itself");
            continue;
        }

        let file_type = entry.file_type();
        let (name, renamed) = names.assign(root, path, file_type.is_dir())?;
        if renamed {
            warn!(path = %path.display(), entry = %name, "Entry stored under a substitute name");
            summary.renamed += 1;
        }

        let meta = entry
            .metadata()
            .map_err(|e| BackupError::io("cannot stat entry", path, e.into()))?;
        let options = entry_options(&meta);

        if file_type.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| BackupError::io("cannot read symlink", path, e))?;
            zip.add_symlink(name, encode_component(target.as_os_str()), options)
                .map_err(|e| BackupError::Archive(e.to_string()))?;
            summary.symlinks += 1;
        } else if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), options)
                .map_err(|e| BackupError::Archive(e.to_string()))?;
            summary.directories += 1;
        } else if file_type.is_file() {
            zip.start_file(name, options)
                .map_err(|e| BackupError::Archive(e.to_string()))?;
            let mut source =
                File::open(path).map_err(|e| BackupError::io("cannot open entry", path, e))?;
            io::copy(&mut source, &mut zip)
                .map_err(|e| BackupError::io("cannot copy entry into archive", path, e))?;
            summary.files += 1;
        } else {
            debug!(path = %path.display(), "Skipping special file");
        }
    }

    zip.finish()
        .map_err(|e| BackupError::Archive(e.to_string()))?
        .into_inner()
        .map_err(|e| BackupError::io("cannot flush archive", out_file, e.into_error()))?
        .sync_all()
        .map_err(|e| BackupError::io("cannot sync archive", out_file, e))?;

    info!(
        files = summary.files,
        directories = summary.directories,
        symlinks = summary.symlinks,
        renamed = summary.renamed,
        "Archive written"
    );
    Ok(summary)
}

/// Relative, `/`-joined entry name; only plain path components are accepted.
fn entry_name(root: &Path, path: &Path) -> Result<String, BackupError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| BackupError::Archive(format!("{} is outside {}", path.display(), root.display())))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(encode_component(part)),
            _ => {
                return Err(BackupError::Archive(format!(
                    "refusing unsafe entry path {}",
                    relative.display()
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(BackupError::Archive(format!(
            "empty entry name for {}",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}

/// Hands out archive names, unique across the whole archive.
///
/// Children of a directory build on the name the directory was given, so a
/// deduplicated directory keeps its contents underneath it.
#[derive(Default)]
struct EntryNames {
    directories: HashMap<PathBuf, String>,
    taken: HashSet<String>,
}

impl EntryNames {
    /// Returns the name for `path` and whether it differs from the on-disk name.
    fn assign(&mut self, root: &Path, path: &Path, is_dir: bool) -> Result<(String, bool), BackupError> {
        let encoded = entry_name(root, path)?;
        let base = match (path.parent().and_then(|p| self.directories.get(p)), path.file_name()) {
            (Some(parent), Some(file_name)) => format!("{parent}/{}", encode_component(file_name)),
            _ => encoded,
        };
        let mut renamed = path.file_name().is_some_and(|n| n.to_str().is_none());

        let mut name = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&name) {
            name = format!("{base}~{suffix}");
            suffix += 1;
            renamed = true;
        }
        self.taken.insert(name.clone());
        if is_dir {
            self.directories.insert(path.to_path_buf(), name.clone());
        }
        Ok((name, renamed))
    }
}

/// UTF-8 text as is; every byte of an invalid sequence becomes `%XX`.
#[cfg(unix)]
fn encode_component(part: &OsStr) -> String {
    use std::os::unix::ffi::OsStrExt;

    if let Some(text) = part.to_str() {
        return text.to_string();
    }
    let mut out = String::new();
    for chunk in part.as_bytes().utf8_chunks() {
        out.push_str(chunk.valid());
        for byte in chunk.invalid() {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(not(unix))]
fn encode_component(part: &OsStr) -> String {
    part.to_string_lossy().into_owned()
}

fn entry_options(meta: &fs::Metadata) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(meta.permissions().mode());
    }
    if meta.len() >= u64::from(u32::MAX) {
        options = options.large_file(true);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_name_is_relative_and_slash_joined() {
        let root = Path::new("/tmp/backup-1");
        let name = entry_name(root, &root.join("octo").join("repo").join("README.md")).unwrap();
        assert_eq!(name, "octo/repo/README.md");
    }

    #[test]
    fn entry_name_rejects_parent_segments() {
        let root = Path::new("/tmp/backup-1");
        let err = entry_name(root, &root.join("..").join("etc")).unwrap_err();
        assert!(matches!(err, BackupError::Archive(_)));
    }

    #[cfg(unix)]
    #[test]
    fn invalid_bytes_are_escaped() {
        use std::os::unix::ffi::OsStrExt;

        assert_eq!(encode_component(OsStr::from_bytes(b"data-\xff")), "data-%FF");
        assert_eq!(encode_component(OsStr::from_bytes(b"\xfe\xffok-\xc3\xa9")), "%FE%FFok-\u{e9}");
        assert_eq!(encode_component(OsStr::new("plain%41")), "plain%41");
    }

    #[test]
    fn clashing_names_get_a_suffix() {
        let root = Path::new("/tmp/backup-1");
        let mut names = EntryNames::default();
        let first = names.assign(root, &root.join("a"), true).unwrap();
        assert_eq!(first, ("a".to_string(), false));
        names.taken.insert("b".to_string());
        let clash = names.assign(root, &root.join("b"), true).unwrap();
        assert_eq!(clash, ("b~1".to_string(), true));
        let child = names.assign(root, &root.join("b").join("x.txt"), false).unwrap();
        assert_eq!(child, ("b~1/x.txt".to_string(), false));
    }

    #[test]
    fn entry_name_rejects_paths_outside_root() {
        let err = entry_name(Path::new("/tmp/backup-1"), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, BackupError::Archive(_)));
    }
}
