#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use shardvault::{
    ContentStore, Directory, MemoryContentStore, MemoryDirectoryStore, Result, ShardHandler,
    StoreConfig,
};

/// Content store that starts failing writes or deletes once armed
#[derive(Debug, Default)]
pub struct FlakyContentStore {
    inner: MemoryContentStore,
    puts_left: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `allowed` more puts through, then fail every put
    pub fn fail_puts_after(&self, allowed: usize) {
        self.puts_left.store(allowed, Ordering::SeqCst);
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_puts.store(false, Ordering::SeqCst);
        self.fail_deletes.store(false, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryContentStore {
        &self.inner
    }

    fn injected(what: &str, key: &str) -> shardvault::Error {
        io::Error::new(io::ErrorKind::Other, format!("injected {} failure on {}", what, key)).into()
    }
}

impl ContentStore for FlakyContentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            let left = self.puts_left.load(Ordering::SeqCst);
            if left == 0 {
                return Err(Self::injected("put", key));
            }
            self.puts_left.store(left - 1, Ordering::SeqCst);
        }
        self.inner.put(key, data)
    }

    fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete", key));
        }
        self.inner.delete(key)
    }

    fn list_keys(&self) -> Result<BTreeSet<String>> {
        self.inner.list_keys()
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to)
    }
}

pub struct Fixture {
    pub handler: ShardHandler,
    pub directory: Arc<MemoryDirectoryStore>,
    pub content: Arc<FlakyContentStore>,
}

pub fn fixture() -> Fixture {
    let directory = Arc::new(MemoryDirectoryStore::new());
    let content = Arc::new(FlakyContentStore::new());
    let handler = ShardHandler::with_stores(StoreConfig::default(), directory.clone(), content.clone())
        .expect("memory-backed handler");
    Fixture {
        handler,
        directory,
        content,
    }
}

/// Assert the directory is a valid layout of a dataset of `len` bytes and that
/// the stored content matches it exactly
pub fn assert_consistent(directory: &Directory, content: &dyn ContentStore, dataset: &[u8]) {
    directory.validate().expect("directory invariants");
    assert_eq!(directory.dataset_len(), dataset.len() as u64);

    let stored = content.list_keys().unwrap();
    let named: BTreeSet<String> = directory.key_strings().into_iter().collect();
    assert_eq!(stored, named, "content keys differ from directory keys");

    for (key, range) in directory.iter() {
        let expected = &dataset[range.start as usize..range.end as usize];
        let actual = content.get(&key.to_string()).unwrap().unwrap();
        assert_eq!(actual, expected, "content of {} differs from its range", key);
    }
}
