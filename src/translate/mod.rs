//! Translation pipeline: fingerprint → cache → remote translator.

pub mod cache;
pub mod fingerprint;
pub mod google;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::metrics::{metric_names, MetricsRegistry};
use cache::TranslationCache;
use fingerprint::fingerprint;

/// Translator backend. `Ok(None)` means the service had no translation.
pub trait Translator: Send + Sync {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, TranslateError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    Network(String),
    MalformedResponse(String),
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::Network(msg) => write!(f, "network failure: {msg}"),
            TranslateError::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for TranslateError {}

/// Offline translator that tags text with the target language.
pub struct StubTranslator;

impl Translator for StubTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _source_lang: &'a str,
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, TranslateError>> {
        Box::pin(async move { Ok(Some(format!("[{target_lang}] {text}"))) })
    }
}

/// Cached translation for one source/target language pair.
pub struct TranslationService {
    translator: Arc<dyn Translator>,
    cache: Arc<TranslationCache>,
    metrics: Arc<MetricsRegistry>,
    source_lang: String,
    target_lang: String,
}

impl TranslationService {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        metrics: Arc<MetricsRegistry>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            translator,
            cache,
            metrics,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Translate `text`, serving from the cache when possible. Successful
    /// remote results are stored before being returned, even if the caller
    /// no longer wants them.
    pub async fn translate(&self, text: &str) -> Result<Option<String>, TranslateError> {
        let key = fingerprint(text);
        if let Some(hit) = self.cache.lookup(&key) {
            self.metrics.increment(metric_names::CACHE_HIT);
            debug!(fingerprint = %key, "translation cache hit");
            return Ok(Some(hit));
        }
        self.metrics.increment(metric_names::CACHE_MISS);

        let span = self.metrics.span(metric_names::TRANSLATE_DONE);
        let result = self
            .translator
            .translate(text, &self.source_lang, &self.target_lang)
            .await;
        let elapsed_us = span.finish();

        match result? {
            Some(translated) => {
                self.cache.store(key.clone(), translated.clone());
                debug!(fingerprint = %key, elapsed_us, "translation stored");
                Ok(Some(translated))
            }
            None => {
                debug!(fingerprint = %key, "no translation available");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Scripted {
        reply: Result<Option<String>, TranslateError>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl Translator for Scripted {
        fn translate<'a>(
            &'a self,
            text: &'a str,
            source_lang: &'a str,
            target_lang: &'a str,
        ) -> BoxFuture<'a, Result<Option<String>, TranslateError>> {
            self.calls
                .lock()
                .push((text.into(), source_lang.into(), target_lang.into()));
            let reply = self.reply.clone();
            Box::pin(async move { reply })
        }
    }

    fn service(reply: Result<Option<String>, TranslateError>) -> (Arc<Scripted>, TranslationService) {
        let backend = Arc::new(Scripted {
            reply,
            calls: Mutex::new(Vec::new()),
        });
        let svc = TranslationService::new(
            backend.clone(),
            Arc::new(TranslationCache::new()),
            Arc::new(MetricsRegistry::new()),
            "zh-TW",
            "en",
        );
        (backend, svc)
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let (backend, svc) = service(Ok(Some("Hello".into())));
        assert_eq!(svc.translate("你好").await.unwrap().as_deref(), Some("Hello"));
        assert_eq!(svc.translate("你好").await.unwrap().as_deref(), Some("Hello"));
        assert_eq!(
            backend.calls.lock().as_slice(),
            &[("你好".to_string(), "zh-TW".to_string(), "en".to_string())]
        );
        assert_eq!(svc.metrics.count(metric_names::CACHE_HIT), 1);
        assert_eq!(svc.metrics.count(metric_names::CACHE_MISS), 1);
    }

    #[tokio::test]
    async fn empty_result_is_not_cached() {
        let (backend, svc) = service(Ok(None));
        assert_eq!(svc.translate("你好").await.unwrap(), None);
        assert_eq!(svc.translate("你好").await.unwrap(), None);
        assert_eq!(backend.calls.lock().len(), 2);
        assert!(svc.cache().is_empty());
    }

    #[tokio::test]
    async fn errors_propagate_and_leave_cache_untouched() {
        let (_, svc) = service(Err(TranslateError::Network("offline".into())));
        assert_eq!(
            svc.translate("你好").await,
            Err(TranslateError::Network("offline".into()))
        );
        assert!(svc.cache().is_empty());
    }

    #[tokio::test]
    async fn stub_tags_target_language() {
        let out = StubTranslator.translate("你好", "zh-TW", "en").await.unwrap();
        assert_eq!(out.as_deref(), Some("[en] 你好"));
    }
}
