use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::{ExtractionResult, FileIdentity, RecognitionResult};

/// Results that are a pure function of an unchanged file.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedScan {
    pub extraction: ExtractionResult,
    pub recognition: RecognitionResult,
}

/// Scan-result cache keyed by file identity. Writes must be idempotent.
pub trait ScanCache: Send + Sync {
    fn get(&self, identity: &FileIdentity) -> Option<CachedScan>;

    fn put(&self, identity: FileIdentity, scan: CachedScan);
}

/// Bounded in-memory cache. Evicts the oldest key once full.
#[derive(Debug)]
pub struct MemoryScanCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<FileIdentity, CachedScan>,
    order: VecDeque<FileIdentity>,
}

impl MemoryScanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScanCache for MemoryScanCache {
    fn get(&self, identity: &FileIdentity) -> Option<CachedScan> {
        let inner = self.inner.lock().ok()?;
        inner.entries.get(identity).cloned()
    }

    fn put(&self, identity: FileIdentity, scan: CachedScan) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::warn!("Scan cache lock poisoned, skipping write");
            return;
        };

        // Last writer wins for an existing key.
        if inner.entries.insert(identity.clone(), scan).is_some() {
            return;
        }
        inner.order.push_back(identity);

        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Stage, StageTiming};
    use std::time::Duration;

    fn identity(name: &str) -> FileIdentity {
        FileIdentity {
            name: name.to_string(),
            size: 10,
            last_modified_ms: 0,
        }
    }

    fn scan(title: &str) -> CachedScan {
        CachedScan {
            extraction: ExtractionResult {
                page_count: 1,
                pages_read: 1,
                title: Some(title.to_string()),
                author: None,
                text_preview: String::new(),
                timing: StageTiming::measure(Stage::Extraction, Duration::ZERO),
            },
            recognition: RecognitionResult::unknown(StageTiming::measure(Stage::Recognition, Duration::ZERO)),
        }
    }

    #[test]
    fn stores_and_returns_entries() {
        let cache = MemoryScanCache::new(4);
        assert!(cache.get(&identity("a")).is_none());

        cache.put(identity("a"), scan("A"));
        assert_eq!(cache.get(&identity("a")), Some(scan("A")));
    }

    #[test]
    fn rewriting_a_key_is_last_writer_wins() {
        let cache = MemoryScanCache::new(4);
        cache.put(identity("a"), scan("first"));
        cache.put(identity("a"), scan("second"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&identity("a")), Some(scan("second")));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = MemoryScanCache::new(2);
        cache.put(identity("a"), scan("A"));
        cache.put(identity("b"), scan("B"));
        cache.put(identity("c"), scan("C"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&identity("a")).is_none());
        assert!(cache.get(&identity("c")).is_some());
    }
}
