//! Owned node trees: fixtures, replay input and content snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A detached, owned node tree. In JSON a string is a text node and an
/// object is an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeTemplate {
    Text(String),
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        classes: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attrs: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<NodeTemplate>,
    },
}

impl NodeTemplate {
    pub fn text(text: impl Into<String>) -> Self {
        NodeTemplate::Text(text.into())
    }

    pub fn element(tag: &str, classes: &[&str]) -> Self {
        NodeTemplate::Element {
            tag: tag.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute. No-op on text nodes.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        if let NodeTemplate::Element { ref mut attrs, .. } = self {
            attrs.insert(name.to_string(), value.to_string());
        }
        self
    }

    /// Append a child. No-op on text nodes.
    pub fn child(mut self, child: NodeTemplate) -> Self {
        if let NodeTemplate::Element { ref mut children, .. } = self {
            children.push(child);
        }
        self
    }

    pub fn children(self, children: impl IntoIterator<Item = NodeTemplate>) -> Self {
        children.into_iter().fold(self, NodeTemplate::child)
    }
}

/// Deep copy of an element's children, taken before a content swap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentSnapshot {
    pub(crate) children: Vec<NodeTemplate>,
}

impl ContentSnapshot {
    pub fn children(&self) -> &[NodeTemplate] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_strings_are_text_and_objects_are_elements() {
        let json = r#"{
            "tag": "div",
            "classes": ["chat-line__message"],
            "children": [
                {"tag": "span", "classes": ["text-fragment"], "children": ["你好"]},
                {"tag": "img", "attrs": {"alt": "Kappa"}}
            ]
        }"#;
        let parsed: NodeTemplate = serde_json::from_str(json).unwrap();
        let built = NodeTemplate::element("div", &["chat-line__message"]).children([
            NodeTemplate::element("span", &["text-fragment"]).child(NodeTemplate::text("你好")),
            NodeTemplate::element("img", &[]).attr("alt", "Kappa"),
        ]);
        assert_eq!(parsed, built);
    }

    #[test]
    fn builders_ignore_text_nodes() {
        let t = NodeTemplate::text("x").attr("a", "b").child(NodeTemplate::text("y"));
        assert_eq!(t, NodeTemplate::text("x"));
    }
}
