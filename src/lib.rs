//! chat_hover_translate: hover-gated, cached translation of a live chat feed.
//! Library root: orchestrator wiring, tracing setup and the replay driver.

pub mod cancellation;
pub mod config;
pub mod controller;
pub mod dom;
pub mod metrics;
pub mod replay;
pub mod state_machine;
pub mod translate;
pub mod watcher;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use config::{CompiledSelectors, ConfigError, TranslatorConfig};
use controller::ControllerRegistry;
use dom::Page;
use metrics::MetricsRegistry;
use replay::{ReplayError, ReplayScript};
use translate::cache::TranslationCache;
use translate::google::GoogleTranslateClient;
use translate::{StubTranslator, TranslateError, TranslationService, Translator};
use watcher::{ArrivalWatcher, BootstrapWatcher, WatchError, WatchStatus};

/// Top-level owner of the page handle, cache, metrics and controllers.
pub struct ChatTranslator {
    page: Page,
    config: TranslatorConfig,
    selectors: CompiledSelectors,
    cache: Arc<TranslationCache>,
    metrics: Arc<MetricsRegistry>,
    registry: Arc<ControllerRegistry>,
    status_tx: watch::Sender<WatchStatus>,
    started: AtomicBool,
}

impl ChatTranslator {
    pub fn new(
        page: Page,
        config: TranslatorConfig,
        translator: Arc<dyn Translator>,
    ) -> Result<Self, ConfigError> {
        Self::with_cache(page, config, translator, Arc::new(TranslationCache::new()))
    }

    /// Build with a caller-supplied cache, e.g. one pre-seeded for the same
    /// language pair. Keys cover the source text only, so a cache must not be
    /// shared across different `source_lang`/`target_lang` settings.
    pub fn with_cache(
        page: Page,
        config: TranslatorConfig,
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
    ) -> Result<Self, ConfigError> {
        let selectors = config.compile()?;
        let metrics = Arc::new(MetricsRegistry::new());
        let service = Arc::new(TranslationService::new(
            translator,
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config.source_lang.clone(),
            config.target_lang.clone(),
        ));
        let registry = Arc::new(ControllerRegistry::new(
            page.clone(),
            service,
            Arc::clone(&metrics),
            Arc::clone(&selectors.fragment),
            config.debounce(),
        ));
        let (status_tx, _) = watch::channel(WatchStatus::WaitingForContainer);

        Ok(Self {
            page,
            config,
            selectors,
            cache,
            metrics,
            registry,
            status_tx,
            started: AtomicBool::new(false),
        })
    }

    /// Spawn bootstrap → arrival watching. Only the first call starts
    /// anything; later calls return `None`.
    pub fn start(&self) -> Option<JoinHandle<Result<(), WatchError>>> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("chat translator already started");
            return None;
        }

        let bootstrap = BootstrapWatcher::new(
            self.page.clone(),
            Arc::clone(&self.selectors.container),
            self.config.bootstrap_timeout(),
        );
        let arrival = ArrivalWatcher::new(
            self.page.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.selectors.message),
            self.config.scan_existing,
        );
        let status = self.status_tx.clone();

        Some(tokio::spawn(async move {
            info!("waiting for chat container");
            let container = match bootstrap.wait_for_container().await {
                Ok(container) => container,
                Err(e) => {
                    error!(error = %e, "chat container never appeared, translation disabled");
                    status.send_replace(WatchStatus::NotFound);
                    return Err(e);
                }
            };
            info!(container = %container, "chat container found");

            let watching = arrival.watch(container);
            status.send_replace(WatchStatus::Active { container });
            watching.await;
            Ok(())
        }))
    }

    pub fn status(&self) -> watch::Receiver<WatchStatus> {
        self.status_tx.subscribe()
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Replay(ReplayError),
    Client(TranslateError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{e}"),
            AppError::Replay(e) => write!(f, "{e}"),
            AppError::Client(e) => write!(f, "translation client: {e}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<ReplayError> for AppError {
    fn from(e: ReplayError) -> Self {
        AppError::Replay(e)
    }
}

impl From<TranslateError> for AppError {
    fn from(e: TranslateError) -> Self {
        AppError::Client(e)
    }
}

/// Options for the command-line driver.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub script_path: PathBuf,
    pub offline: bool,
}

/// Initialise tracing. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chat_hover_translate=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Replay a scripted page session against a fresh page and print what the
/// viewer sees at each `print` step.
pub async fn run(options: RunOptions) -> Result<(), AppError> {
    let config = match options.config_path {
        Some(ref path) => TranslatorConfig::load_from_file(path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "config load failed, using defaults");
            TranslatorConfig::default()
        }),
        None => TranslatorConfig::default(),
    };
    let script = ReplayScript::load_from_file(&options.script_path)?;

    let translator: Arc<dyn Translator> = if options.offline {
        info!("offline mode, using stub translator");
        Arc::new(StubTranslator)
    } else {
        Arc::new(GoogleTranslateClient::new(
            config.endpoint.clone(),
            config.client_id.clone(),
        )?)
    };

    info!(
        source = %config.source_lang,
        target = %config.target_lang,
        debounce_ms = config.debounce_ms,
        "chat_hover_translate starting"
    );

    let page = Page::new();
    let app = ChatTranslator::new(page.clone(), config, translator)?;
    let watcher = app.start();

    let printed = replay::run_script(&page, &script).await?;
    for line in &printed {
        println!("{line}");
    }

    // Page unload: observers end, watchers return.
    page.lock().close();
    if let Some(handle) = watcher {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "watcher finished without a container"),
            Err(e) => error!(error = %e, "watcher task panicked"),
        }
    }

    for (name, summary) in app.metrics().summary() {
        info!(
            metric = %name,
            p50_us = summary.p50_us,
            p95_us = summary.p95_us,
            p99_us = summary.p99_us,
            count = summary.count,
            "metric summary"
        );
    }
    for (name, value) in app.metrics().counters() {
        info!(counter = %name, value, "counter summary");
    }
    info!(cached = app.cache().len(), "chat_hover_translate finished");
    Ok(())
}
