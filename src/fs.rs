//! Filesystem access used by the catalog and the apply engine.
//!
//! All reads of the bucket layout and every image move go through
//! [`FileSystem`]. [`RealFs`] talks to the disk, [`MemoryFs`] is an in-memory
//! tree with injectable failures for tests.

use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: OsString,
    pub is_dir: bool,
    pub is_file: bool,
}

/// The filesystem operations the review core needs.
pub trait FileSystem {
    /// True if anything (file, directory, or dangling link) exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// True if both paths refer to the same underlying file.
    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool>;

    /// Lists the direct children of `path`.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()>;

    /// Moves a file without replacing an existing destination. The destination
    /// directory must already exist.
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&mut self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[cfg(unix)]
    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let (meta_a, meta_b) = (fs::metadata(a)?, fs::metadata(b)?);
        Ok(meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino())
    }

    #[cfg(not(unix))]
    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let entry_path = entry.path();
            entries.push(DirEntryInfo {
                name: entry.file_name(),
                is_dir: entry_path.is_dir(),
                is_file: entry_path.is_file(),
            });
        }
        Ok(entries)
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    /// Links the file under its new name, then unlinks the old one, so an
    /// existing destination fails with `AlreadyExists` instead of being
    /// replaced. Across filesystems the file is copied into a newly created
    /// destination instead. Filesystems without hard links fall back to a
    /// plain rename.
    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::hard_link(from, to) {
            Ok(()) => remove_or_undo(from, to),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                if let Err(copy_err) = copy_new(from, to) {
                    let _ = fs::remove_file(to);
                    return Err(copy_err);
                }
                remove_or_undo(from, to)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
                ) =>
            {
                fs::rename(from, to)
            }
            Err(e) => Err(e),
        }
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Copies `from` into `to`, failing if `to` already exists.
fn copy_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = File::open(from)?;
    let permissions = source.metadata()?.permissions();
    let mut dest = File::options().write(true).create_new(true).open(to)?;
    io::copy(&mut source, &mut dest)?;
    dest.sync_all()?;
    fs::set_permissions(to, permissions)
}

/// Removes `from` once `to` holds the file. If that fails, `to` is removed
/// again so the file is never left in both places.
fn remove_or_undo(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(remove_err) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(remove_err);
    }
    Ok(())
}

/// In-memory [`FileSystem`] for tests.
///
/// Paths are compared literally, so two different paths are never the same
/// file. Directories marked read-only reject moves into or out of them.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
    read_only: HashSet<PathBuf>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory and all of its ancestors.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    /// Adds a file, creating its parent directories.
    pub fn add_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files.insert(path.to_path_buf());
    }

    pub fn remove_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.files.retain(|f| !f.starts_with(path));
        self.dirs.retain(|d| !d.starts_with(path));
    }

    /// Makes every move into or out of `dir` fail with `PermissionDenied`.
    pub fn set_read_only(&mut self, dir: impl AsRef<Path>) {
        self.read_only.insert(dir.as_ref().to_path_buf());
    }

    pub fn set_writable(&mut self, dir: impl AsRef<Path>) {
        self.read_only.remove(dir.as_ref());
    }

    pub fn has_file(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains(path.as_ref())
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    fn is_read_only(&self, path: &Path) -> bool {
        path.parent()
            .is_some_and(|parent| self.read_only.contains(parent))
    }
}

impl FileSystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains(path) || self.dirs.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn is_same_file(&self, a: &Path, b: &Path) -> io::Result<bool> {
        for path in [a, b] {
            if !self.exists(path) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                ));
            }
        }
        Ok(a == b)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        if !self.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            ));
        }

        let children = |set: &BTreeSet<PathBuf>, is_dir: bool| -> Vec<DirEntryInfo> {
            set.iter()
                .filter(|p| p.parent() == Some(path))
                .filter_map(|p| p.file_name())
                .map(|name| DirEntryInfo {
                    name: name.to_os_string(),
                    is_dir,
                    is_file: !is_dir,
                })
                .collect()
        };

        let mut entries = children(&self.dirs, true);
        entries.extend(children(&self.files, false));
        Ok(entries)
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        if self.files.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a file", path.display()),
            ));
        }
        self.add_dir(path);
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        if !self.files.contains(from) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", from.display()),
            ));
        }
        if self.files.contains(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            ));
        }
        if self.is_read_only(from) || self.is_read_only(to) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
        if !to.parent().is_some_and(|parent| self.dirs.contains(parent)) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent of {} does not exist", to.display()),
            ));
        }

        self.files.remove(from);
        self.files.insert(to.to_path_buf());
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        if self.is_read_only(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
        if !self.files.remove(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_fs_rename_moves_file() {
        let mut fs = MemoryFs::new();
        fs.add_file("/root/a/x.png");
        fs.add_dir("/root/b");

        fs.rename(Path::new("/root/a/x.png"), Path::new("/root/b/x.png"))
            .expect("Rename failed");

        assert!(!fs.has_file("/root/a/x.png"));
        assert_eq!(fs.files().collect::<Vec<_>>(), vec![Path::new("/root/b/x.png")]);
    }

    #[test]
    fn test_memory_fs_rename_never_replaces() {
        let mut fs = MemoryFs::new();
        fs.add_file("/root/a/x.png");
        fs.add_file("/root/b/x.png");

        let err = fs
            .rename(Path::new("/root/a/x.png"), Path::new("/root/b/x.png"))
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(fs.has_file("/root/a/x.png"));
        assert!(fs.has_file("/root/b/x.png"));
    }

    #[test]
    fn test_memory_fs_remove_file() {
        let mut fs = MemoryFs::new();
        fs.add_file("/root/a/x.png");

        fs.remove_file(Path::new("/root/a/x.png")).expect("Remove failed");
        assert!(!fs.has_file("/root/a/x.png"));

        let missing = fs.remove_file(Path::new("/root/a/x.png"));
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_fs_rename_failures() {
        let mut fs = MemoryFs::new();
        fs.add_file("/root/a/x.png");
        fs.add_dir("/root/b");

        let missing = fs.rename(Path::new("/root/a/y.png"), Path::new("/root/b/y.png"));
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);

        let no_parent = fs.rename(Path::new("/root/a/x.png"), Path::new("/root/c/x.png"));
        assert_eq!(no_parent.unwrap_err().kind(), io::ErrorKind::NotFound);

        fs.set_read_only("/root/b");
        let denied = fs.rename(Path::new("/root/a/x.png"), Path::new("/root/b/x.png"));
        assert_eq!(denied.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
        assert!(fs.has_file("/root/a/x.png"));
    }

    #[test]
    fn test_memory_fs_list_dir() {
        let mut fs = MemoryFs::new();
        fs.add_file("/root/a/x.png");
        fs.add_file("/root/a/nested/y.png");

        let mut names: Vec<_> = fs
            .list_dir(Path::new("/root/a"))
            .unwrap()
            .into_iter()
            .map(|e| (e.name.to_string_lossy().to_string(), e.is_dir))
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![("nested".to_string(), true), ("x.png".to_string(), false)]
        );
        assert!(fs.list_dir(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_real_fs_same_file_and_listing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let a = base.join("a.png");
        let b = base.join("b.png");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let real = RealFs;
        assert!(real.is_same_file(&a, &a).unwrap());
        assert!(!real.is_same_file(&a, &b).unwrap());
        assert!(real.exists(&a));
        assert!(real.is_dir(base));

        let listing = real.list_dir(base).unwrap();
        assert_eq!(listing.len(), 2);
        assert!(listing.iter().all(|e| e.is_file && !e.is_dir));
    }

    #[test]
    fn test_real_fs_rename() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let from = base.join("x.png");
        fs::write(&from, "pixels").unwrap();

        let mut real = RealFs;
        real.create_dir_all(&base.join("dest")).unwrap();
        let to = base.join("dest").join("x.png");
        real.rename(&from, &to).expect("Rename failed");

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "pixels");
    }

    #[test]
    fn test_real_fs_rename_does_not_replace_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let from = base.join("x.png");
        let to = base.join("y.png");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        let err = RealFs.rename(&from, &to).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&from).unwrap(), "new");
        assert_eq!(fs::read_to_string(&to).unwrap(), "old");
    }

    #[test]
    fn test_copy_new_refuses_existing_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        let from = base.join("x.png");
        let to = base.join("y.png");
        fs::write(&from, "pixels").unwrap();

        copy_new(&from, &to).expect("Copy failed");
        assert_eq!(fs::read_to_string(&to).unwrap(), "pixels");

        let err = copy_new(&from, &to).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
