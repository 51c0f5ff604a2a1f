//! In-memory translation cache keyed by content fingerprint.
//! Append-only for the life of the page: no eviction, no TTL.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::fingerprint::ContentFingerprint;

#[derive(Default)]
pub struct TranslationCache {
    inner: RwLock<HashMap<ContentFingerprint, String>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached translation for `key`, if any. Never mutates.
    pub fn lookup(&self, key: &ContentFingerprint) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    /// Record a translation. Overwriting an existing key is allowed.
    pub fn store(&self, key: ContentFingerprint, translated_text: String) {
        self.inner.write().insert(key, translated_text);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::fingerprint::fingerprint;

    #[test]
    fn store_then_lookup() {
        let cache = TranslationCache::new();
        let key = fingerprint("你好");
        assert_eq!(cache.lookup(&key), None);

        cache.store(key.clone(), "Hello".into());
        assert_eq!(cache.lookup(&key).as_deref(), Some("Hello"));
        assert_eq!(cache.lookup(&fingerprint("再見")), None);
    }

    #[test]
    fn overwrite_replaces_value() {
        let cache = TranslationCache::new();
        let key = fingerprint("你好");
        cache.store(key.clone(), "Hello".into());
        cache.store(key.clone(), "Hi".into());
        assert_eq!(cache.lookup(&key).as_deref(), Some("Hi"));
        assert_eq!(cache.len(), 1);
    }
}
