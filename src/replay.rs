//! Scripted page sessions for the command-line driver: build chat DOM,
//! hover over messages and print what a viewer would see.
//!
//! ```json
//! {"steps": [
//!   {"op": "wait", "ms": 2000},
//!   {"op": "append", "parent": "body", "node": {"tag": "div", "classes": ["chat-scrollable-area__message-container"]}},
//!   {"op": "append", "parent": ".chat-scrollable-area__message-container", "node": {"tag": "div", "children": [
//!     {"tag": "div", "classes": ["chat-line__message"], "children": [
//!       {"tag": "span", "classes": ["text-fragment"], "children": ["你好"]}]}]}},
//!   {"op": "hover_enter", "target": ".chat-line__message"},
//!   {"op": "wait", "ms": 1500},
//!   {"op": "print", "target": ".chat-line__message"},
//!   {"op": "hover_leave", "target": ".chat-line__message"}
//! ]}
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::dom::{HoverEventKind, NodeId, NodeTemplate, Page, Selector, SelectorError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayStep {
    Append {
        parent: String,
        node: NodeTemplate,
    },
    Remove {
        target: String,
        #[serde(default)]
        index: usize,
    },
    HoverEnter {
        target: String,
        #[serde(default)]
        index: usize,
    },
    HoverLeave {
        target: String,
        #[serde(default)]
        index: usize,
    },
    Wait {
        ms: u64,
    },
    Print {
        target: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplayScript {
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug)]
pub enum ReplayError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Selector { step: usize, source: SelectorError },
    NoMatch { step: usize, target: String, index: usize },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Io(e) => write!(f, "script IO error: {e}"),
            ReplayError::Parse(e) => write!(f, "script parse error: {e}"),
            ReplayError::Selector { step, source } => write!(f, "step {step}: {source}"),
            ReplayError::NoMatch {
                step,
                target,
                index,
            } => write!(f, "step {step}: no match #{index} for {target:?}"),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<std::io::Error> for ReplayError {
    fn from(e: std::io::Error) -> Self {
        ReplayError::Io(e)
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(e: serde_json::Error) -> Self {
        ReplayError::Parse(e)
    }
}

impl ReplayScript {
    pub fn load_from_file(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn resolve(page: &Page, step: usize, target: &str, index: usize) -> Result<NodeId, ReplayError> {
    let selector =
        Selector::parse(target).map_err(|source| ReplayError::Selector { step, source })?;
    let doc = page.lock();
    doc.query_selector_all_inclusive(doc.body(), &selector)
        .get(index)
        .copied()
        .ok_or_else(|| ReplayError::NoMatch {
            step,
            target: target.to_string(),
            index,
        })
}

/// Run every step against `page`. Returns the lines produced by `print`.
pub async fn run_script(page: &Page, script: &ReplayScript) -> Result<Vec<String>, ReplayError> {
    let mut printed = Vec::new();

    for (step, action) in script.steps.iter().enumerate() {
        debug!(step, ?action, "replay step");
        match action {
            ReplayStep::Append { parent, node } => {
                let parent = resolve(page, step, parent, 0)?;
                let mut doc = page.lock();
                let child = doc.build(node);
                doc.append_child(parent, child);
            }
            ReplayStep::Remove { target, index } => {
                let node = resolve(page, step, target, *index)?;
                page.lock().remove_child(node);
            }
            ReplayStep::HoverEnter { target, index } => {
                let node = resolve(page, step, target, *index)?;
                page.dispatch(node, HoverEventKind::Enter);
            }
            ReplayStep::HoverLeave { target, index } => {
                let node = resolve(page, step, target, *index)?;
                page.dispatch(node, HoverEventKind::Leave);
            }
            ReplayStep::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            ReplayStep::Print { target } => {
                let selector = Selector::parse(target)
                    .map_err(|source| ReplayError::Selector { step, source })?;
                let doc = page.lock();
                for (i, node) in doc
                    .query_selector_all_inclusive(doc.body(), &selector)
                    .into_iter()
                    .enumerate()
                {
                    let line = format!("{target}[{i}]: {}", doc.text_content(node));
                    info!(step, "{}", line);
                    printed.push(line);
                }
            }
        }
        // Let watchers react before the next step.
        tokio::task::yield_now().await;
    }

    Ok(printed)
}
