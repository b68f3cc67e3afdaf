//! Content storage for shard and replica bytes
//!
//! The content store holds the raw bytes of every primary and replica, keyed
//! by the same identifiers the directory uses. It knows nothing about the
//! layout; the directory decides what should exist and the reconciler makes
//! the store agree.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::util;

/// Key-value boundary for raw shard content
///
/// A successful `put` must be visible to every later `get` and `list_keys`.
pub trait ContentStore: Send + Sync {
    /// Fetch the bytes stored under `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `data` under `key`, replacing any previous content
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// Every key currently stored
    fn list_keys(&self) -> Result<BTreeSet<String>>;

    /// Move the content of `from` onto `to`, replacing `to`
    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let data = self.get(from)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no content under {}", from))
        })?;
        self.put(to, &data)?;
        self.delete(from)
    }

    /// Check if `key` is stored
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Content stored as one file per key: `<root>/<key>.<extension>`
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
    extension: String,
    sync_writes: bool,
}

impl FsContentStore {
    /// Open (creating if needed) a content directory
    pub fn open<P: AsRef<Path>>(root: P, extension: impl Into<String>, sync_writes: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let store = Self {
            root,
            extension: extension.into(),
            sync_writes,
        };
        store.remove_stale_temp_files()?;
        Ok(store)
    }

    /// Directory holding the content files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid content key: {:?}", key),
            ));
        }
        Ok(self.root.join(format!("{}.{}", key, self.extension)))
    }

    /// Staging files left behind by an interrupted write
    fn remove_stale_temp_files(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.starts_with('.') && name.ends_with(".tmp"));
            if is_temp && path.is_file() {
                debug!(path = %path.display(), "removing stale staging file");
                util::remove_if_exists(&path)?;
            }
        }
        Ok(())
    }
}

impl ContentStore for FsContentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(util::read_if_exists(&self.path_for(key)?)?)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        util::write_atomic(&self.path_for(key)?, data, self.sync_writes)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        util::remove_if_exists(&self.path_for(key)?)?;
        Ok(())
    }

    fn list_keys(&self) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != self.extension.as_str()) {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) if !stem.starts_with('.') => {
                    keys.insert(stem.to_string());
                }
                Some(_) => {}
                None => {
                    warn!(path = %path.display(), "skipping content file with a non UTF-8 name");
                }
            }
        }

        Ok(keys)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.path_for(from)?, self.path_for(to)?)?;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }
}

/// Content kept in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    /// Create an empty in-memory content store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries.read().clone()
    }
}

impl ContentStore for MemoryContentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<BTreeSet<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let data = entries.remove(from).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no content under {}", from))
        })?;
        entries.insert(to.to_string(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn ContentStore) -> Result<()> {
        assert!(store.list_keys()?.is_empty());
        assert_eq!(store.get("0")?, None);

        store.put("0", b"ab")?;
        store.put("0-1", b"ab")?;
        assert_eq!(store.get("0")?, Some(b"ab".to_vec()));
        assert!(store.contains("0-1")?);

        let keys: Vec<_> = store.list_keys()?.into_iter().collect();
        assert_eq!(keys, vec!["0", "0-1"]);

        store.put("0", b"xyz")?;
        assert_eq!(store.get("0")?, Some(b"xyz".to_vec()));

        store.rename("0", "1")?;
        assert_eq!(store.get("0")?, None);
        assert_eq!(store.get("1")?, Some(b"xyz".to_vec()));
        assert!(store.rename("missing", "2").unwrap_err().is_storage_error());

        store.delete("1")?;
        store.delete("1")?;
        assert!(!store.contains("1")?);

        // Empty content is still content
        store.put("5", b"")?;
        assert_eq!(store.get("5")?, Some(Vec::new()));

        Ok(())
    }

    #[test]
    fn test_memory_store() -> Result<()> {
        let store = MemoryContentStore::new();
        exercise(&store)?;
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[test]
    fn test_fs_store() -> Result<()> {
        let temp_dir = tempdir()?;
        let store = FsContentStore::open(temp_dir.path().join("data"), "txt", false)?;
        exercise(&store)?;
        assert!(store.root().join("5.txt").is_file());
        Ok(())
    }

    #[test]
    fn test_fs_store_ignores_foreign_files() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path().join("data");
        let store = FsContentStore::open(&root, "txt", false)?;

        store.put("0", b"ab")?;
        fs::write(root.join("notes.md"), b"hello")?;
        fs::create_dir(root.join("sub.txt"))?;

        let keys: Vec<_> = store.list_keys()?.into_iter().collect();
        assert_eq!(keys, vec!["0"]);

        Ok(())
    }

    #[test]
    fn test_fs_store_cleans_temp_files_on_open() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path().join("data");
        fs::create_dir_all(&root)?;
        fs::write(root.join(".3.txt.tmp"), b"half written")?;

        let store = FsContentStore::open(&root, "txt", false)?;
        assert!(!root.join(".3.txt.tmp").exists());
        assert!(store.list_keys()?.is_empty());

        Ok(())
    }

    #[test]
    fn test_fs_store_rejects_path_like_keys() {
        let temp_dir = tempdir().unwrap();
        let store = FsContentStore::open(temp_dir.path(), "txt", false).unwrap();
        assert!(store.put("../escape", b"x").is_err());
        assert!(store.put(".hidden", b"x").is_err());
        assert!(store.get("").is_err());
    }

    #[cfg(unix)]
    #[test_log::test]
    fn test_fs_store_skips_non_utf8_names() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = tempdir()?;
        let root = temp_dir.path().join("data");
        let store = FsContentStore::open(&root, "txt", false)?;

        store.put("0", b"ab")?;
        if fs::write(root.join(OsStr::from_bytes(b"\xff\xfe.txt")), b"junk").is_err() {
            // Some filesystems refuse invalid UTF-8 names outright
            return Ok(());
        }

        let keys: Vec<_> = store.list_keys()?.into_iter().collect();
        assert_eq!(keys, vec!["0"]);
        Ok(())
    }
}
