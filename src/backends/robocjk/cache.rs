use super::api::{GlyphCategory, GlyphRecord};
use crate::variation::AxisDefaults;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::task::JoinHandle;

/// How long fetched glyphs are kept after the last fetch
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) type CacheKey = (GlyphCategory, i64);

/// A fetched glyph record, plus the axis defaults resolved for it
#[derive(Debug, Clone)]
pub(crate) struct CachedGlyph {
    pub(crate) record: Arc<GlyphRecord>,
    pub(crate) axis_defaults: Option<Arc<AxisDefaults>>,
}

type Entries = Arc<Mutex<HashMap<CacheKey, CachedGlyph>>>;

/// Short-lived store of glyph records
///
/// Every fetch pushes back a single purge deadline; when it passes, the
/// whole cache is dropped at once.
#[derive(Debug)]
pub(crate) struct GlyphCache {
    entries: Entries,
    timeout: Duration,
    purge: Option<JoinHandle<()>>,
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<CacheKey, CachedGlyph>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GlyphCache {
    pub(crate) fn new(timeout: Duration) -> Self {
        GlyphCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            purge: None,
        }
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<CachedGlyph> {
        lock(&self.entries).get(key).cloned()
    }

    pub(crate) fn insert(&self, key: CacheKey, glyph: CachedGlyph) {
        lock(&self.entries).insert(key, glyph);
    }

    /// Attach resolved axis defaults to an entry, if it is still cached
    pub(crate) fn set_axis_defaults(&self, key: &CacheKey, defaults: Arc<AxisDefaults>) {
        if let Some(entry) = lock(&self.entries).get_mut(key) {
            entry.axis_defaults = Some(defaults);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Restart the countdown to clearing the cache
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn schedule_purge(&mut self) {
        if let Some(pending) = self.purge.take() {
            pending.abort();
        }
        let entries = self.entries.clone();
        let timeout = self.timeout;
        self.purge = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut entries = lock(&entries);
            log::debug!("Purging {} cached glyphs", entries.len());
            entries.clear();
        }));
    }

    /// Drop everything now and cancel any pending purge
    pub(crate) fn clear(&mut self) {
        if let Some(pending) = self.purge.take() {
            pending.abort();
        }
        lock(&self.entries).clear();
    }
}

impl Drop for GlyphCache {
    fn drop(&mut self) {
        if let Some(pending) = self.purge.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: i64) -> CachedGlyph {
        CachedGlyph {
            record: Arc::new(GlyphRecord {
                id,
                name: format!("g{id}"),
                type_code: None,
                data: String::new(),
                layers: vec![],
                made_of: vec![],
            }),
            axis_defaults: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_is_debounced() {
        let mut cache = GlyphCache::new(Duration::from_secs(5));
        let key = (GlyphCategory::CharacterGlyph, 1);
        cache.insert(key, record(1));
        cache.schedule_purge();
        tokio::time::sleep(Duration::from_secs(3)).await;
        // A second fetch pushes the deadline back
        cache.schedule_purge();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_purge() {
        let mut cache = GlyphCache::new(Duration::from_secs(1));
        cache.schedule_purge();
        cache.clear();
        let key = (GlyphCategory::AtomicElement, 7);
        cache.insert(key, record(7));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 1);
        cache.set_axis_defaults(&key, Arc::new(AxisDefaults::new()));
        assert!(cache.get(&key).unwrap().axis_defaults.is_some());
    }
}
