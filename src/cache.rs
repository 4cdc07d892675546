use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::workbook::{self, IngestError, IngestOptions, LoadedWorkbook, Source};

/// Identity of a loaded workbook: content hash for uploads, path + mtime + length for files.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Content(String),
    File { path: PathBuf, modified: Option<SystemTime>, len: u64 },
}

impl CacheKey {
    pub fn for_source(source: &Source) -> Result<CacheKey, IngestError> {
        match source {
            Source::Upload { bytes, .. } => Ok(CacheKey::Content(content_hash(bytes))),
            Source::Path(p) => {
                let meta = std::fs::metadata(p).map_err(|e| IngestError::Unreadable { name: p.to_string_lossy().into_owned(), reason: e.to_string() })?;
                let path = p.canonicalize().unwrap_or_else(|_| p.clone());
                Ok(CacheKey::File { path, modified: meta.modified().ok(), len: meta.len() })
            }
        }
    }
}

pub fn content_hash(bytes: &[u8]) -> String { format!("{:x}", Sha256::digest(bytes)) }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Parsed workbooks keyed by [`CacheKey`]. Entries live until invalidated.
pub struct WorkbookCache {
    options: IngestOptions,
    entries: HashMap<CacheKey, Arc<LoadedWorkbook>>,
    uploads: HashMap<String, CacheKey>,
    stats: CacheStats,
}

impl WorkbookCache {
    pub fn new(options: IngestOptions) -> Self {
        Self { options, entries: HashMap::new(), uploads: HashMap::new(), stats: CacheStats::default() }
    }

    pub fn get_or_load(&mut self, source: &Source) -> Result<Arc<LoadedWorkbook>, IngestError> {
        let key = CacheKey::for_source(source)?;
        if let Source::Upload { name, .. } = source
            && let Some(prev) = self.uploads.insert(name.clone(), key.clone())
            && prev != key
        {
            log::debug!("Re-upload of '{}' replaces the cached copy", name);
            self.entries.remove(&prev);
        }
        if let Some(hit) = self.entries.get(&key) {
            self.stats.hits += 1;
            log::debug!("Cache hit for '{}'", source.display_name());
            return Ok(Arc::clone(hit));
        }
        self.stats.misses += 1;
        log::debug!("Cache miss for '{}'", source.display_name());
        let loaded = Arc::new(workbook::load(source, &self.options)?);
        self.entries.insert(key, Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool { self.entries.remove(key).is_some() }

    /// Drops every entry loaded from `path`, whatever its recorded modification time.
    pub fn invalidate_path(&mut self, path: &Path) -> usize {
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let before = self.entries.len();
        self.entries.retain(|k, _| !matches!(k, CacheKey::File { path: p, .. } if *p == target));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn stats(&self) -> CacheStats { self.stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{xlsx_bytes, Fx};

    fn book(value: &'static str) -> Vec<u8> {
        xlsx_bytes(&[("Data", vec![vec![Fx::S("Field"), Fx::S("Value")], vec![Fx::S("Sample ID"), Fx::S(value)]])])
    }

    #[test]
    fn same_upload_bytes_hit_the_cache() {
        let mut cache = WorkbookCache::new(IngestOptions::default());
        let src = Source::Upload { name: "a.xlsx".into(), bytes: book("TP-1") };
        let first = cache.get_or_load(&src).unwrap();
        let second = cache.get_or_load(&Source::Upload { name: "copy.xlsx".into(), bytes: book("TP-1") }).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn reupload_under_same_name_evicts_previous_entry() {
        let mut cache = WorkbookCache::new(IngestOptions::default());
        cache.get_or_load(&Source::Upload { name: "lab.xlsx".into(), bytes: book("TP-1") }).unwrap();
        cache.get_or_load(&Source::Upload { name: "lab.xlsx".into(), bytes: book("TP-22") }).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn rewritten_file_gets_a_new_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.xlsx");
        std::fs::write(&path, b"first version").unwrap();
        let k1 = CacheKey::for_source(&Source::Path(path.clone())).unwrap();
        std::fs::write(&path, b"second, longer version").unwrap();
        let k2 = CacheKey::for_source(&Source::Path(path.clone())).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn explicit_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.xlsx");
        std::fs::write(&path, book("TP-1")).unwrap();
        let mut cache = WorkbookCache::new(IngestOptions::default());
        cache.get_or_load(&Source::Path(path.clone())).unwrap();
        cache.get_or_load(&Source::Path(path.clone())).unwrap();
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(cache.invalidate_path(&path), 1);
        assert!(cache.is_empty());
        let src = Source::Upload { name: "u.xlsx".into(), bytes: book("TP-3") };
        cache.get_or_load(&src).unwrap();
        assert!(cache.invalidate(&CacheKey::for_source(&src).unwrap()));
        assert!(cache.is_empty());
        cache.get_or_load(&src).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let mut cache = WorkbookCache::new(IngestOptions::default());
        let src = Source::Upload { name: "bad.xlsx".into(), bytes: b"nope".to_vec() };
        assert!(cache.get_or_load(&src).is_err());
        assert!(cache.is_empty());
    }
}
