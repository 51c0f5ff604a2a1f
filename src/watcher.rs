//! Arrival detection. `BootstrapWatcher` waits for the chat container to
//! exist; `ArrivalWatcher` then turns mutations inside it into
//! `ArrivalEvent`s and wires each new message into a hover controller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::controller::ControllerRegistry;
use crate::dom::{MutationBatch, MutationObserver, NodeId, Page, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalEvent {
    /// A message element was inserted (possibly inside a wrapper).
    Arrived(NodeId),
    /// A node was removed; any message beneath it is gone.
    Departed(NodeId),
}

/// Progress of the startup sequence, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    WaitingForContainer,
    Active { container: NodeId },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    TargetNotFound { selector: String },
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::TargetNotFound { selector } => {
                write!(f, "chat container {selector:?} not found")
            }
        }
    }
}

impl std::error::Error for WatchError {}

/// Map each mutation batch to arrival events. Only the first added node of
/// a record is inspected, and text nodes are skipped.
pub fn arrival_events(
    page: Page,
    observer: MutationObserver,
    message_selector: Arc<Selector>,
) -> impl Stream<Item = ArrivalEvent> + Send + 'static {
    observer.into_stream().flat_map(move |batch| {
        stream::iter(classify_batch(&page, &message_selector, &batch))
    })
}

fn classify_batch(page: &Page, selector: &Selector, batch: &MutationBatch) -> Vec<ArrivalEvent> {
    let doc = page.lock();
    let mut events = Vec::new();
    for record in batch {
        if let Some(&first) = record.added_nodes.first() {
            if !doc.is_element(first) {
                trace!(node = %first, "text node inserted, ignored");
            } else if let Some(message) = doc.query_selector_inclusive(first, selector) {
                events.push(ArrivalEvent::Arrived(message));
            } else {
                trace!(node = %first, "inserted node holds no message element");
            }
        }
        events.extend(record.removed_nodes.iter().map(|&n| ArrivalEvent::Departed(n)));
    }
    events
}

pub struct ArrivalWatcher {
    page: Page,
    registry: Arc<ControllerRegistry>,
    message_selector: Arc<Selector>,
    scan_existing: bool,
}

impl ArrivalWatcher {
    pub fn new(
        page: Page,
        registry: Arc<ControllerRegistry>,
        message_selector: Arc<Selector>,
        scan_existing: bool,
    ) -> Self {
        Self {
            page,
            registry,
            message_selector,
            scan_existing,
        }
    }

    /// Subscribe to `container` now and return the future that consumes
    /// its arrival events until the page unloads.
    pub fn watch(self, container: NodeId) -> impl Future<Output = ()> + Send + 'static {
        let observer = self.page.lock().observe(container, true);

        if self.scan_existing {
            let existing = self
                .page
                .lock()
                .query_selector_all(container, &self.message_selector);
            let attached = existing
                .into_iter()
                .filter(|&m| self.registry.attach(m))
                .count();
            info!(container = %container, attached, "attached to messages already present");
        }

        let events = arrival_events(
            self.page.clone(),
            observer,
            Arc::clone(&self.message_selector),
        );
        let registry = self.registry;

        async move {
            info!(container = %container, "watching chat container for new messages");
            futures_util::pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    ArrivalEvent::Arrived(message) => {
                        registry.attach(message);
                    }
                    ArrivalEvent::Departed(node) => {
                        let released = registry.release(node);
                        if released > 0 {
                            debug!(node = %node, released, "messages removed from chat");
                        }
                    }
                }
            }
            info!(container = %container, "chat container observation ended");
        }
    }
}

pub struct BootstrapWatcher {
    page: Page,
    container_selector: Arc<Selector>,
    wait_limit: Option<Duration>,
}

impl BootstrapWatcher {
    pub fn new(page: Page, container_selector: Arc<Selector>, wait_limit: Option<Duration>) -> Self {
        Self {
            page,
            container_selector,
            wait_limit,
        }
    }

    /// Resolve once the container exists. The body observer is dropped on
    /// return, so this never re-arms.
    pub async fn wait_for_container(&self) -> Result<NodeId, WatchError> {
        let mut observer = {
            let mut doc = self.page.lock();
            let body = doc.body();
            doc.observe(body, true)
        };

        if let Some(found) = self.find() {
            debug!(container = %found, "chat container already present");
            return Ok(found);
        }

        let deadline = self.wait_limit.map(|limit| Instant::now() + limit);
        loop {
            let batch = match deadline {
                Some(deadline) => tokio::select! {
                    batch = observer.next_batch() => batch,
                    _ = tokio::time::sleep_until(deadline) => {
                        debug!(selector = %self.container_selector, "wait limit reached");
                        return Err(self.not_found());
                    }
                },
                None => observer.next_batch().await,
            };

            if batch.is_none() {
                debug!(selector = %self.container_selector, "page unloaded during bootstrap");
                return Err(self.not_found());
            }
            if let Some(found) = self.find() {
                observer.disconnect();
                return Ok(found);
            }
        }
    }

    fn find(&self) -> Option<NodeId> {
        self.page.lock().query_selector(&self.container_selector)
    }

    fn not_found(&self) -> WatchError {
        WatchError::TargetNotFound {
            selector: self.container_selector.to_string(),
        }
    }
}
