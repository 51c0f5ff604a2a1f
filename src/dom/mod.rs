//! Host page model: an arena document with mutation observers and hover
//! listeners. Stands in for the page-owned DOM the translator decorates.
//!
//! `NodeId`s are never reused within a document, so they are stable keys for
//! side tables even after a node is detached. An id is only meaningful for
//! the document that created it.
//!
//! Arena slots are never freed. Children dropped by `set_text_content` or
//! `restore` are reclaimed in place (data, children and listeners cleared), so
//! each content swap costs one small slot per replaced node. Nodes detached
//! with `remove_child` keep their content because the host may re-insert
//! them; a long session's arena grows with everything it ever created.

pub mod selector;
pub mod template;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures_util::Stream;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;

pub use selector::{Selector, SelectorError};
pub use template::{ContentSnapshot, NodeTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoverEventKind {
    Enter,
    Leave,
}

impl fmt::Display for HoverEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoverEventKind::Enter => write!(f, "mouseenter"),
            HoverEventKind::Leave => write!(f, "mouseleave"),
        }
    }
}

pub type Listener = Arc<dyn Fn(HoverEventKind) + Send + Sync>;

/// One structural change under an observed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

pub type MutationBatch = Vec<MutationRecord>;

#[derive(Debug)]
struct ElementData {
    tag: String,
    classes: Vec<String>,
    attrs: BTreeMap<String, String>,
}

#[derive(Debug)]
enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct ObserverSlot {
    target: NodeId,
    subtree: bool,
    tx: mpsc::UnboundedSender<MutationBatch>,
}

/// Receives mutation batches for one observed node. Dropping it disconnects.
pub struct MutationObserver {
    rx: mpsc::UnboundedReceiver<MutationBatch>,
}

impl MutationObserver {
    /// Next batch, or `None` once the document is closed.
    pub async fn next_batch(&mut self) -> Option<MutationBatch> {
        self.rx.recv().await
    }

    pub fn try_next_batch(&mut self) -> Option<MutationBatch> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = MutationBatch> + Send + 'static {
        futures_util::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|batch| (batch, rx))
        })
    }

    pub fn disconnect(self) {}
}

pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
    observers: Vec<ObserverSlot>,
    listeners: HashMap<NodeId, Vec<(HoverEventKind, Listener)>>,
    closed: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            observers: Vec::new(),
            listeners: HashMap::new(),
            closed: false,
        };
        doc.body = doc.create_element("body", &[]);
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str, classes: &[&str]) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            attrs: BTreeMap::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Instantiate a detached subtree.
    pub fn build(&mut self, template: &NodeTemplate) -> NodeId {
        match template {
            NodeTemplate::Text(text) => self.create_text(text),
            NodeTemplate::Element {
                tag,
                classes,
                attrs,
                children,
            } => {
                let id = self.push(NodeData::Element(ElementData {
                    tag: tag.to_ascii_lowercase(),
                    classes: classes.clone(),
                    attrs: attrs.clone(),
                }));
                for child in children {
                    let child_id = self.build(child);
                    self.link(id, child_id);
                }
                id
            }
        }
    }

    /// Owned copy of a node and its subtree.
    pub fn to_template(&self, id: NodeId) -> NodeTemplate {
        let node = self.node(id);
        match &node.data {
            NodeData::Text(text) => NodeTemplate::Text(text.clone()),
            NodeData::Element(el) => NodeTemplate::Element {
                tag: el.tag.clone(),
                classes: el.classes.clone(),
                attrs: el.attrs.clone(),
                children: node.children.iter().map(|&c| self.to_template(c)).collect(),
            },
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Element(_))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Whether the node is attached under `body`.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.ancestors_inclusive(id).last() == Some(&self.body)
    }

    fn ancestors_inclusive(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cursor = self.node(id).parent;
        while let Some(p) = cursor {
            path.push(p);
            cursor = self.node(p).parent;
        }
        path
    }

    /// The node followed by all of its descendants, in document order.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.node_mut(child).parent.take()?;
        self.node_mut(parent).children.retain(|&c| c != child);
        Some(parent)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.append_children(parent, vec![child]);
    }

    /// Append several nodes as a single mutation record.
    pub fn append_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
        if children.is_empty() {
            return;
        }
        for &child in &children {
            if let Some(old_parent) = self.unlink(child) {
                self.notify(MutationRecord {
                    target: old_parent,
                    added_nodes: Vec::new(),
                    removed_nodes: vec![child],
                });
            }
            self.link(parent, child);
        }
        self.notify(MutationRecord {
            target: parent,
            added_nodes: children,
            removed_nodes: Vec::new(),
        });
    }

    /// Detach a node from its parent. Returns false if it had none.
    pub fn remove_child(&mut self, child: NodeId) -> bool {
        match self.unlink(child) {
            Some(parent) => {
                self.notify(MutationRecord {
                    target: parent,
                    added_nodes: Vec::new(),
                    removed_nodes: vec![child],
                });
                true
            }
            None => false,
        }
    }

    fn replace_children(&mut self, parent: NodeId, new_children: Vec<NodeId>) {
        let removed = std::mem::take(&mut self.node_mut(parent).children);
        for &old in &removed {
            self.node_mut(old).parent = None;
        }
        for &child in &new_children {
            self.link(parent, child);
        }
        self.notify(MutationRecord {
            target: parent,
            added_nodes: new_children,
            removed_nodes: removed.clone(),
        });
        for old in removed {
            self.reclaim(old);
        }
    }

    /// Empty a replaced subtree. The ids stay valid as childless text slots.
    fn reclaim(&mut self, root: NodeId) {
        for id in self.subtree(root) {
            let node = self.node_mut(id);
            node.data = NodeData::Text(String::new());
            node.children = Vec::new();
            if id != root {
                node.parent = None;
            }
            self.listeners.remove(&id);
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.subtree(id) {
            if let NodeData::Text(text) = &self.node(node).data {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace an element's children with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        if let NodeData::Text(existing) = &mut self.node_mut(id).data {
            *existing = text.to_string();
            return;
        }
        let text_node = self.create_text(text);
        self.replace_children(id, vec![text_node]);
    }

    pub fn snapshot(&self, id: NodeId) -> ContentSnapshot {
        ContentSnapshot {
            children: self
                .node(id)
                .children
                .iter()
                .map(|&c| self.to_template(c))
                .collect(),
        }
    }

    /// Replace an element's children with fresh copies of the snapshot.
    pub fn restore(&mut self, id: NodeId, snapshot: &ContentSnapshot) {
        let fresh: Vec<NodeId> = snapshot.children.iter().map(|t| self.build(t)).collect();
        self.replace_children(id, fresh);
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in &self.node(id).children {
            self.write_html(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.data {
            NodeData::Text(text) => escape_into(text, false, out),
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                if !el.classes.is_empty() {
                    out.push_str(" class=\"");
                    escape_into(&el.classes.join(" "), true, out);
                    out.push('"');
                }
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for &child in &node.children {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        match &self.node(id).data {
            NodeData::Element(el) => selector.matches(
                &el.tag,
                el.attrs.get("id").map(String::as_str),
                &el.classes,
            ),
            NodeData::Text(_) => false,
        }
    }

    /// First match anywhere under `body` (body included).
    pub fn query_selector(&self, selector: &Selector) -> Option<NodeId> {
        self.query_selector_inclusive(self.body, selector)
    }

    /// First match in `root`'s subtree, `root` included.
    pub fn query_selector_inclusive(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.subtree(root)
            .into_iter()
            .find(|&id| self.matches(id, selector))
    }

    /// All matching descendants of `root` (excluding `root`), in document order.
    pub fn query_selector_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.subtree(root)
            .into_iter()
            .skip(1)
            .filter(|&id| self.matches(id, selector))
            .collect()
    }

    pub fn query_selector_all_inclusive(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.subtree(root)
            .into_iter()
            .filter(|&id| self.matches(id, selector))
            .collect()
    }

    /// Start observing `target`. Only changes made after this call are reported.
    pub fn observe(&mut self, target: NodeId, subtree: bool) -> MutationObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.closed {
            self.observers.push(ObserverSlot {
                target,
                subtree,
                tx,
            });
        }
        MutationObserver { rx }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.iter().filter(|s| !s.tx.is_closed()).count()
    }

    fn notify(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        let path = self.ancestors_inclusive(record.target);
        self.observers.retain(|slot| {
            let interested = slot.target == record.target
                || (slot.subtree && path.contains(&slot.target));
            if !interested {
                return !slot.tx.is_closed();
            }
            slot.tx.send(vec![record.clone()]).is_ok()
        });
    }

    /// Page unload: every observer stream ends.
    pub fn close(&mut self) {
        self.closed = true;
        self.observers.clear();
        trace!("document closed");
    }

    pub fn add_listener(&mut self, id: NodeId, kind: HoverEventKind, listener: Listener) {
        self.listeners.entry(id).or_default().push((kind, listener));
    }

    pub fn listener_count(&self, id: NodeId, kind: HoverEventKind) -> usize {
        self.listeners
            .get(&id)
            .map(|list| list.iter().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    pub fn remove_listeners(&mut self, id: NodeId) {
        self.listeners.remove(&id);
    }

    fn listeners_for(&self, id: NodeId, kind: HoverEventKind) -> Vec<Listener> {
        self.listeners
            .get(&id)
            .map(|list| {
                list.iter()
                    .filter(|(k, _)| *k == kind)
                    .map(|(_, l)| Arc::clone(l))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Elements serialised without children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

/// Shared handle to the page's document.
#[derive(Clone, Default)]
pub struct Page {
    inner: Arc<Mutex<Document>>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.lock()
    }

    /// Fire a hover event at `node`. Listeners run synchronously with the
    /// document unlocked. Returns how many listeners ran.
    pub fn dispatch(&self, node: NodeId, kind: HoverEventKind) -> usize {
        let listeners = self.inner.lock().listeners_for(node, kind);
        trace!(node = %node, event = %kind, listeners = listeners.len(), "dispatch");
        for listener in &listeners {
            listener(kind);
        }
        listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message_template() -> NodeTemplate {
        NodeTemplate::element("div", &[]).child(
            NodeTemplate::element("div", &["chat-line__message"]).children([
                NodeTemplate::element("span", &["chat-author"]).child(NodeTemplate::text("viewer")),
                NodeTemplate::element("span", &["text-fragment"]).child(NodeTemplate::text("你好 ")),
                NodeTemplate::element("img", &["emote"]).attr("alt", "<3"),
            ]),
        )
    }

    #[test]
    fn build_and_serialize() {
        let mut doc = Document::new();
        let wrapper = doc.build(&message_template());
        assert_eq!(
            doc.outer_html(wrapper),
            "<div><div class=\"chat-line__message\"><span class=\"chat-author\">viewer</span>\
             <span class=\"text-fragment\">你好 </span><img class=\"emote\" alt=\"&lt;3\"></div></div>"
        );
        assert_eq!(doc.text_content(wrapper), "viewer你好 ");
        assert_eq!(doc.to_template(wrapper), message_template());
    }

    #[test]
    fn queries_follow_document_order() {
        let mut doc = Document::new();
        let wrapper = doc.build(&message_template());
        let body = doc.body();
        doc.append_child(body, wrapper);

        let msg_sel = Selector::parse(".chat-line__message").unwrap();
        let span_sel = Selector::parse("span").unwrap();
        let msg = doc.query_selector(&msg_sel).unwrap();
        assert_eq!(doc.query_selector_inclusive(msg, &msg_sel), Some(msg));
        assert!(doc.query_selector_all(msg, &msg_sel).is_empty());
        let spans = doc.query_selector_all(msg, &span_sel);
        assert_eq!(spans.len(), 2);
        assert_eq!(doc.text_content(spans[0]), "viewer");
        assert!(doc.is_connected(msg));
    }

    #[test]
    fn snapshot_restore_is_byte_exact() {
        let mut doc = Document::new();
        let wrapper = doc.build(&message_template());
        let msg = doc
            .query_selector_inclusive(wrapper, &Selector::parse(".chat-line__message").unwrap())
            .unwrap();
        let before = doc.inner_html(msg);
        let snap = doc.snapshot(msg);

        let frag = doc
            .query_selector_inclusive(msg, &Selector::parse(".text-fragment").unwrap())
            .unwrap();
        doc.set_text_content(frag, "Hello");
        assert_ne!(doc.inner_html(msg), before);

        doc.restore(msg, &snap);
        assert_eq!(doc.inner_html(msg), before);
    }

    #[test]
    fn replaced_content_is_reclaimed() {
        let mut doc = Document::new();
        let wrapper = doc.build(&message_template());
        let msg = doc
            .query_selector_inclusive(wrapper, &Selector::parse(".chat-line__message").unwrap())
            .unwrap();
        let snap = doc.snapshot(msg);
        let frag = doc
            .query_selector_inclusive(msg, &Selector::parse(".text-fragment").unwrap())
            .unwrap();
        doc.add_listener(frag, HoverEventKind::Enter, Arc::new(|_| {}));

        doc.set_text_content(frag, "Hello");
        doc.restore(msg, &snap);

        assert!(!doc.is_element(frag));
        assert_eq!(doc.parent(frag), None);
        assert_eq!(doc.subtree(frag), vec![frag]);
        assert_eq!(doc.text_content(frag), "");
        assert_eq!(doc.listener_count(frag, HoverEventKind::Enter), 0);
        assert_eq!(doc.text_content(msg), "viewer你好 ");
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let mut doc = Document::new();
        let line = doc.build(
            &NodeTemplate::element("p", &[])
                .child(NodeTemplate::text("a"))
                .child(NodeTemplate::element("br", &[]))
                .child(NodeTemplate::element("img", &[]).attr("src", "x.png")),
        );
        assert_eq!(doc.outer_html(line), "<p>a<br><img src=\"x.png\"></p>");
    }

    #[test]
    fn observers_see_subtree_changes_after_subscribing() {
        let mut doc = Document::new();
        let body = doc.body();
        let container = doc.create_element("div", &["list"]);
        doc.append_child(body, container);

        let mut direct = doc.observe(container, false);
        let mut deep = doc.observe(body, true);
        let mut shallow_body = doc.observe(body, false);

        let wrapper = doc.build(&message_template());
        doc.append_child(container, wrapper);

        let batch = direct.try_next_batch().unwrap();
        assert_eq!(batch[0].target, container);
        assert_eq!(batch[0].added_nodes, vec![wrapper]);
        assert!(deep.try_next_batch().is_some());
        assert!(shallow_body.try_next_batch().is_none());

        assert!(doc.remove_child(wrapper));
        let batch = direct.try_next_batch().unwrap();
        assert_eq!(batch[0].removed_nodes, vec![wrapper]);
        assert!(!doc.remove_child(wrapper));
    }

    #[test]
    fn dropped_observers_are_pruned_and_close_ends_streams() {
        let mut doc = Document::new();
        let body = doc.body();
        let dropped = doc.observe(body, true);
        let mut kept = doc.observe(body, true);
        dropped.disconnect();
        let el = doc.create_element("div", &[]);
        doc.append_child(body, el);
        assert_eq!(doc.observer_count(), 1);
        assert!(kept.try_next_batch().is_some());

        doc.close();
        assert_eq!(doc.observer_count(), 0);
        let mut late = doc.observe(body, true);
        let el = doc.create_element("div", &[]);
        doc.append_child(body, el);
        assert!(late.try_next_batch().is_none());
    }

    #[test]
    fn dispatch_runs_matching_listeners_unlocked() {
        let page = Page::new();
        let node = {
            let mut doc = page.lock();
            let body = doc.body();
            let el = doc.create_element("div", &[]);
            doc.append_child(body, el);
            el
        };
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let reentrant = page.clone();
        page.lock().add_listener(
            node,
            HoverEventKind::Enter,
            Arc::new(move |_| {
                // Re-entrant access must not deadlock.
                let _ = reentrant.lock().text_content(node);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(page.dispatch(node, HoverEventKind::Enter), 1);
        assert_eq!(page.dispatch(node, HoverEventKind::Leave), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        page.lock().remove_listeners(node);
        assert_eq!(page.lock().listener_count(node, HoverEventKind::Enter), 0);
    }
}
