//! Runtime configuration: language pair, debounce, endpoint and the host
//! page's selectors. Loaded from JSON; every field has a default.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dom::{Selector, SelectorError};
use crate::translate::google::{DEFAULT_CLIENT_ID, DEFAULT_ENDPOINT};

pub const DEFAULT_CONTAINER_SELECTOR: &str =
    ".video-chat__message-list-wrapper, .chat-scrollable-area__message-container";
pub const DEFAULT_MESSAGE_SELECTOR: &str = ".video-chat__message, .chat-line__message";
pub const DEFAULT_FRAGMENT_SELECTOR: &str = ".text-fragment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub source_lang: String,
    pub target_lang: String,
    /// Sustained hover required before a translation starts.
    pub debounce_ms: u64,
    pub endpoint: String,
    /// Value of the `client` query parameter.
    pub client_id: String,
    pub container_selector: String,
    pub message_selector: String,
    pub fragment_selector: String,
    /// Also attach to messages already in the container when watching starts.
    pub scan_existing: bool,
    /// Give up waiting for the container after this long. `None` waits until unload.
    pub bootstrap_timeout_ms: Option<u64>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            source_lang: "zh-TW".into(),
            target_lang: "en".into(),
            debounce_ms: 1000,
            endpoint: DEFAULT_ENDPOINT.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            container_selector: DEFAULT_CONTAINER_SELECTOR.into(),
            message_selector: DEFAULT_MESSAGE_SELECTOR.into(),
            fragment_selector: DEFAULT_FRAGMENT_SELECTOR.into(),
            scan_existing: false,
            bootstrap_timeout_ms: None,
        }
    }
}

/// Selectors parsed once at startup.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub container: Arc<Selector>,
    pub message: Arc<Selector>,
    pub fragment: Arc<Selector>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Selector {
        field: &'static str,
        source: SelectorError,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Selector { field, source } => write!(f, "invalid {field}: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Selector { source, .. } => Some(source),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl TranslatorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn bootstrap_timeout(&self) -> Option<Duration> {
        self.bootstrap_timeout_ms.map(Duration::from_millis)
    }

    pub fn compile(&self) -> Result<CompiledSelectors, ConfigError> {
        let parse = |field: &'static str, raw: &str| {
            Selector::parse(raw)
                .map(Arc::new)
                .map_err(|source| ConfigError::Selector { field, source })
        };
        Ok(CompiledSelectors {
            container: parse("container_selector", &self.container_selector)?,
            message: parse("message_selector", &self.message_selector)?,
            fragment: parse("fragment_selector", &self.fragment_selector)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_compile() {
        let cfg = TranslatorConfig::default();
        assert_eq!(cfg.debounce(), Duration::from_millis(1000));
        assert_eq!(cfg.bootstrap_timeout(), None);
        let sel = cfg.compile().unwrap();
        assert_eq!(sel.fragment.as_str(), ".text-fragment");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = TranslatorConfig::from_json(
            r#"{"target_lang": "ja", "debounce_ms": 250, "scan_existing": true}"#,
        )
        .unwrap();
        assert_eq!(cfg.target_lang, "ja");
        assert_eq!(cfg.source_lang, "zh-TW");
        assert_eq!(cfg.debounce_ms, 250);
        assert!(cfg.scan_existing);
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn bad_selector_names_the_field() {
        let cfg = TranslatorConfig {
            message_selector: "div > .msg".into(),
            ..TranslatorConfig::default()
        };
        match cfg.compile() {
            Err(ConfigError::Selector { field, .. }) => assert_eq!(field, "message_selector"),
            other => panic!("expected selector error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_parse_error() {
        assert!(matches!(
            TranslatorConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            TranslatorConfig::load_from_file(Path::new("/nonexistent/translator.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
