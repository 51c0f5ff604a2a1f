//! Per-message hover controllers and the side table that owns them.
//!
//! A controller snapshots the message on hover-enter, arms a debounce timer,
//! translates each text fragment when the timer fires, and restores the
//! snapshot on hover-leave. Every content write is gated on the hover
//! session still being current.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::cancellation::{HoverSessions, SessionGuard};
use crate::dom::{ContentSnapshot, HoverEventKind, NodeId, Page, Selector};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::state_machine::HoverPhase;
use crate::translate::TranslationService;

#[derive(Default)]
struct ControllerState {
    listeners_attached: bool,
    /// At most one armed debounce timer.
    pending_timer: Option<JoinHandle<()>>,
    /// Set from hover-enter until the matching restore.
    saved_content: Option<ContentSnapshot>,
    phase: HoverPhase,
    entered_at: Option<Instant>,
}

pub struct HoverController {
    element: NodeId,
    page: Page,
    service: Arc<TranslationService>,
    metrics: Arc<MetricsRegistry>,
    fragment_selector: Arc<Selector>,
    debounce: Duration,
    sessions: HoverSessions,
    state: Mutex<ControllerState>,
}

impl HoverController {
    pub fn new(
        element: NodeId,
        page: Page,
        service: Arc<TranslationService>,
        metrics: Arc<MetricsRegistry>,
        fragment_selector: Arc<Selector>,
        debounce: Duration,
    ) -> Self {
        Self {
            element,
            page,
            service,
            metrics,
            fragment_selector,
            debounce,
            sessions: HoverSessions::new(),
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn phase(&self) -> HoverPhase {
        self.state.lock().phase
    }

    pub fn has_saved_content(&self) -> bool {
        self.state.lock().saved_content.is_some()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.state.lock().pending_timer.is_some()
    }

    /// Register the hover listeners. Returns false if already registered.
    pub fn attach(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state.listeners_attached {
            trace!(element = %self.element, "listeners already attached");
            return false;
        }
        state.listeners_attached = true;

        let mut doc = self.page.lock();
        for kind in [HoverEventKind::Enter, HoverEventKind::Leave] {
            let weak = Arc::downgrade(self);
            doc.add_listener(
                self.element,
                kind,
                Arc::new(move |event| {
                    let Some(controller) = weak.upgrade() else {
                        return;
                    };
                    match event {
                        HoverEventKind::Enter => controller.on_hover_enter(),
                        HoverEventKind::Leave => controller.on_hover_leave(),
                    }
                }),
            );
        }
        true
    }

    pub fn on_hover_enter(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.phase == HoverPhase::Translated {
            trace!(element = %self.element, "hover enter while already translated");
            return;
        }

        let guard = self.sessions.begin();
        if let Some(timer) = state.pending_timer.take() {
            timer.abort();
        }
        if state.saved_content.is_none() {
            state.saved_content = Some(self.page.lock().snapshot(self.element));
        }
        if state.phase.advance(HoverPhase::AwaitingTranslation).is_err() {
            return;
        }
        state.entered_at = Some(Instant::now());
        debug!(element = %self.element, session = guard.session(), "hover enter, debounce armed");

        let controller = Arc::clone(self);
        let debounce = self.debounce;
        state.pending_timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {}
                _ = guard.token().cancelled() => return,
            }
            controller.translate_fragments(guard).await;
        }));
    }

    pub fn on_hover_leave(&self) {
        let mut state = self.state.lock();
        let generation = self.sessions.end();

        if let Some(timer) = state.pending_timer.take() {
            timer.abort();
            self.metrics.increment(metric_names::DEBOUNCE_CANCELLED);
            debug!(element = %self.element, "pending translation cancelled");
        }
        if let Some(saved) = state.saved_content.take() {
            self.page.lock().restore(self.element, &saved);
        }
        let _ = state.phase.advance(HoverPhase::Idle);
        state.entered_at = None;
        trace!(element = %self.element, generation, "hover leave, content restored");
    }

    /// Drop all per-element state. Used when the host removes the element.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        self.sessions.end();
        if let Some(timer) = state.pending_timer.take() {
            timer.abort();
        }
        state.saved_content = None;
        state.listeners_attached = false;
        state.entered_at = None;
        let _ = state.phase.advance(HoverPhase::Idle);
        self.page.lock().remove_listeners(self.element);
    }

    async fn translate_fragments(self: Arc<Self>, guard: SessionGuard) {
        {
            let mut state = self.state.lock();
            if !guard.is_current() {
                return;
            }
            // The timer has fired; leave now cancels via the session instead.
            state.pending_timer = None;
        }

        let fragments: Vec<(NodeId, String)> = {
            let doc = self.page.lock();
            doc.query_selector_all(self.element, &self.fragment_selector)
                .into_iter()
                .map(|id| (id, doc.text_content(id).trim().to_string()))
                .filter(|(_, text)| !text.is_empty())
                .collect()
        };
        debug!(element = %self.element, fragments = fragments.len(), "debounce elapsed, translating");

        let mut swapped = 0usize;
        for (fragment, text) in fragments {
            if !guard.should_continue() {
                debug!(element = %self.element, "hover ended, remaining fragments skipped");
                return;
            }
            match self.service.translate(&text).await {
                Ok(Some(translated)) => {
                    let mut doc = self.page.lock();
                    if !guard.is_current() {
                        self.metrics.increment(metric_names::STALE_DISCARDED);
                        debug!(element = %self.element, "stale translation discarded");
                        return;
                    }
                    doc.set_text_content(fragment, &translated);
                    swapped += 1;
                }
                Ok(None) => {
                    debug!(element = %self.element, fragment = %fragment, "no translation available, fragment unchanged");
                }
                Err(e) => {
                    self.metrics.increment(metric_names::FRAGMENT_FAILED);
                    warn!(element = %self.element, error = %e, "fragment translation failed, keeping current text");
                }
            }
        }

        let mut state = self.state.lock();
        if !guard.is_current() {
            return;
        }
        if state.phase.advance(HoverPhase::Translated).is_ok() {
            if let Some(entered_at) = state.entered_at {
                self.metrics.record(
                    metric_names::HOVER_TO_SWAP,
                    entered_at.elapsed().as_micros() as f64,
                );
            }
            info!(element = %self.element, fragments = swapped, "message translated");
        }
    }
}

/// Side table from message element to its controller.
pub struct ControllerRegistry {
    page: Page,
    service: Arc<TranslationService>,
    metrics: Arc<MetricsRegistry>,
    fragment_selector: Arc<Selector>,
    debounce: Duration,
    controllers: Mutex<HashMap<NodeId, Arc<HoverController>>>,
}

impl ControllerRegistry {
    pub fn new(
        page: Page,
        service: Arc<TranslationService>,
        metrics: Arc<MetricsRegistry>,
        fragment_selector: Arc<Selector>,
        debounce: Duration,
    ) -> Self {
        Self {
            page,
            service,
            metrics,
            fragment_selector,
            debounce,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a controller to `element` unless one is already attached.
    /// Returns true only for the first attachment.
    pub fn attach(&self, element: NodeId) -> bool {
        let controller = {
            let mut controllers = self.controllers.lock();
            Arc::clone(controllers.entry(element).or_insert_with(|| {
                Arc::new(HoverController::new(
                    element,
                    self.page.clone(),
                    Arc::clone(&self.service),
                    Arc::clone(&self.metrics),
                    Arc::clone(&self.fragment_selector),
                    self.debounce,
                ))
            }))
        };

        let attached = controller.attach();
        if attached {
            self.metrics.increment(metric_names::CONTROLLERS_ATTACHED);
            debug!(element = %element, "hover controller attached");
        }
        attached
    }

    /// Release controllers for `node` and anything beneath it.
    pub fn release(&self, node: NodeId) -> usize {
        let released: Vec<Arc<HoverController>> = {
            let doc = self.page.lock();
            let mut controllers = self.controllers.lock();
            doc.subtree(node)
                .into_iter()
                .filter_map(|id| controllers.remove(&id))
                .collect()
        };
        for controller in &released {
            controller.detach();
            self.metrics.increment(metric_names::CONTROLLERS_RELEASED);
            debug!(element = %controller.element(), "hover controller released");
        }
        released.len()
    }

    pub fn get(&self, element: NodeId) -> Option<Arc<HoverController>> {
        self.controllers.lock().get(&element).cloned()
    }

    pub fn is_attached(&self, element: NodeId) -> bool {
        self.controllers.lock().contains_key(&element)
    }

    pub fn len(&self) -> usize {
        self.controllers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.lock().is_empty()
    }
}
