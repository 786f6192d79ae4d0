//! Structure-aware coverage counters for protocol verification.
//!
//! Records which named code paths (states, branches, error handlers) a replay
//! exercised. Counting is off until [`ProtocolCoverage::enable`] is called.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

lazy_static! {
    static ref GLOBAL_COVERAGE: Arc<ProtocolCoverage> = Arc::new(ProtocolCoverage::new());
}

#[derive(Debug, Default)]
pub struct ProtocolCoverage {
    enabled: AtomicBool,
    hits: Mutex<HashMap<String, u64>>,
}

impl ProtocolCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance.
    pub fn global() -> Arc<ProtocolCoverage> {
        GLOBAL_COVERAGE.clone()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        if let Ok(mut hits) = self.hits.lock() {
            hits.clear();
        }
    }

    /// Record a hit on `path`, e.g. `"replay.write.data_mismatch"`.
    pub fn hit(&self, path: &str) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(mut hits) = self.hits.lock() {
            *hits.entry(path.to_string()).or_insert(0) += 1;
        }
    }

    pub fn was_hit(&self, path: &str) -> bool {
        self.hits
            .lock()
            .map(|hits| hits.contains_key(path))
            .unwrap_or(false)
    }

    pub fn hit_count(&self, path: &str) -> u64 {
        self.hits
            .lock()
            .ok()
            .and_then(|hits| hits.get(path).copied())
            .unwrap_or(0)
    }

    pub fn unique_paths(&self) -> usize {
        self.hits.lock().map(|hits| hits.len()).unwrap_or(0)
    }

    /// Sorted copy of all counters.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.hits
            .lock()
            .map(|hits| hits.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn disabled_coverage_records_nothing() {
        let coverage = ProtocolCoverage::new();
        coverage.hit("a");
        assert!(!coverage.was_hit("a"));
        assert_eq!(coverage.unique_paths(), 0);
    }

    #[test]
    fn counts_accumulate_and_reset() {
        let coverage = ProtocolCoverage::new();
        coverage.enable();
        coverage.hit("replay.read.ok");
        coverage.hit("replay.read.ok");
        coverage.hit("replay.write.ok");
        assert_eq!(coverage.hit_count("replay.read.ok"), 2);
        assert_eq!(coverage.unique_paths(), 2);
        assert_eq!(
            coverage.snapshot().keys().cloned().collect::<Vec<_>>(),
            vec!["replay.read.ok".to_string(), "replay.write.ok".to_string()]
        );

        coverage.reset();
        assert_eq!(coverage.unique_paths(), 0);
    }

    #[test]
    fn hits_from_many_threads_are_all_counted() {
        let coverage = Arc::new(ProtocolCoverage::new());
        coverage.enable();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coverage = coverage.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        coverage.hit("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(coverage.hit_count("shared"), 800);
    }
}
