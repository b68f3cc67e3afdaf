//! Utility functions for store files
//!
//! Provides helpers shared by the on-disk directory and content backends.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Path of the hidden staging file used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `data` to `path` so readers see either the old or the new content
///
/// The bytes go to a hidden temporary file next to `path` which is then
/// renamed over it.
pub fn write_atomic(path: &Path, data: &[u8], sync: bool) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        if sync {
            file.sync_all()?;
        }
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Delete a file, treating a missing file as already deleted
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read a file, returning `None` if it does not exist
pub fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(buf) => Ok(Some(buf)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_temp_path() {
        let path = Path::new("/data/store/mapping.json");
        assert_eq!(temp_path(path), Path::new("/data/store/.mapping.json.tmp"));
    }

    #[test]
    fn test_write_atomic_replaces_content() -> io::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("nested").join("0.txt");

        write_atomic(&path, b"first", false)?;
        assert_eq!(fs::read(&path)?, b"first");

        write_atomic(&path, b"second", true)?;
        assert_eq!(fs::read(&path)?, b"second");

        // No staging file is left behind
        assert!(!temp_path(&path).exists());

        Ok(())
    }

    #[test]
    fn test_remove_and_read_if_exists() -> io::Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("gone.txt");

        assert_eq!(read_if_exists(&path)?, None);
        assert!(!remove_if_exists(&path)?);

        fs::write(&path, b"x")?;
        assert_eq!(read_if_exists(&path)?, Some(b"x".to_vec()));
        assert!(remove_if_exists(&path)?);
        assert!(!path.exists());

        Ok(())
    }
}
