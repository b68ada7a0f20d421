//! Arena-backed model of the monitored page.
//!
//! The host page owns the content; the monitor only audits and strips it.
//! Nodes live in a flat arena addressed by [`NodeId`] and are never freed
//! for the lifetime of a page view. Removing a node detaches it from the
//! tree, after which it no longer counts as connected.
//!
//! Every change made through the public mutators on a connected node is
//! queued as a [`MutationRecord`], drained with
//! [`Document::take_mutations`].

mod mutation;

pub use mutation::MutationRecord;

use serde::Serialize;
use std::fmt;

use crate::error::DocumentError;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A name/value attribute pair. Names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<Attribute>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    interactive: bool,
    mutations: Vec<MutationRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty `<html><body></body></html>` document.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            interactive: true,
            mutations: Vec::new(),
        };
        let root = doc.push_node(NodeData::Element {
            tag: "html".to_string(),
            attributes: Vec::new(),
        });
        let body = doc.push_node(NodeData::Element {
            tag: "body".to_string(),
            attributes: Vec::new(),
        });
        doc.nodes[body.0].parent = Some(root);
        doc.nodes[root.0].children.push(body);
        doc.root = root;
        doc.body = body;
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn attributes_mut(&mut self, id: NodeId) -> Result<&mut Vec<Attribute>> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element { attributes, .. } => Ok(attributes),
            NodeData::Text(_) => Err(DocumentError::NotAnElement(id)),
        }
    }

    // ── Construction ────────────────────────────────────────────────

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    /// Attach a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.tag(parent).is_none() {
            self.node(parent)?;
            return Err(DocumentError::NotAnElement(parent));
        }
        if self.node(child)?.parent.is_some() || child == self.root {
            return Err(DocumentError::AlreadyAttached(child));
        }
        if parent == child || self.ancestors(parent).contains(&child) {
            return Err(DocumentError::Cycle { parent, child });
        }

        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);

        if self.is_connected(parent) {
            self.mutations.push(MutationRecord::ChildList {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            });
        }
        Ok(())
    }

    /// Create an element with `attrs`, then attach it under `parent`.
    ///
    /// Attributes are set while the element is still detached, so the
    /// whole insertion is observed as a single child-list record.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId> {
        let id = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(id, name, value)?;
        }
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
        let id = self.create_text(text);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Detach `id` from its parent. Detaching a detached node is a no-op.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        let connected = self.is_connected(parent);

        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.node_mut(id)?.parent = None;

        if connected {
            self.mutations.push(MutationRecord::ChildList {
                target: parent,
                added: Vec::new(),
                removed: vec![id],
            });
        }
        Ok(())
    }

    // ── Attributes ──────────────────────────────────────────────────

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        let attributes = self.attributes_mut(id)?;
        let old_value = match attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => Some(std::mem::replace(&mut attr.value, value.to_string())),
            None => {
                attributes.push(Attribute {
                    name: name.clone(),
                    value: value.to_string(),
                });
                None
            }
        };

        if self.is_connected(id) {
            self.mutations.push(MutationRecord::Attributes {
                target: id,
                name,
                old_value,
            });
        }
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        let name = name.to_ascii_lowercase();
        let attributes = self.attributes_mut(id)?;
        let Some(pos) = attributes.iter().position(|a| a.name == name) else {
            return Ok(None);
        };
        let removed = attributes.remove(pos);

        if self.is_connected(id) {
            self.mutations.push(MutationRecord::Attributes {
                target: id,
                name,
                old_value: Some(removed.value.clone()),
            });
        }
        Ok(Some(removed.value))
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    /// Attributes of an element; empty for text or unknown nodes.
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.nodes.get(id.0).map(|n| &n.data) {
            Some(NodeData::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    // ── Tree queries ────────────────────────────────────────────────

    /// Lowercased tag name, or `None` for text and unknown nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0).map(|n| &n.data) {
            Some(NodeData::Element { tag, .. }) => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Whether `id` is reachable from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).last() == Some(&self.root)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        if !self.is_element(id) {
            self.node(id)?;
            return Err(DocumentError::NotAnElement(id));
        }
        for child in self.children(id).to_vec() {
            self.remove_node(child)?;
        }
        self.append_text(id, text)?;
        Ok(())
    }

    /// Elements of the subtree rooted at `id` (inclusive), in document order.
    pub fn subtree_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.is_element(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Every connected element in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        self.subtree_elements(self.root)
    }

    /// Connected elements with the given tag, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|id| self.tag(*id).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect()
    }

    /// Connected elements whose `id` or `name` attribute equals `value`.
    pub fn elements_named(&self, value: &str) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|id| {
                self.attribute(*id, "id") == Some(value) || self.attribute(*id, "name") == Some(value)
            })
            .collect()
    }

    // ── Observation ─────────────────────────────────────────────────

    /// Drain queued mutation records in the order they happened.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    pub fn pending_mutations(&self) -> usize {
        self.mutations.len()
    }

    // ── Interactivity ───────────────────────────────────────────────

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Disable pointer and keyboard input and replace the body content
    /// with a static notice. There is no way back short of a new document.
    pub fn lock_down(&mut self, notice: &str) -> Result<()> {
        self.interactive = false;
        let body = self.body;
        for child in self.children(body).to_vec() {
            self.remove_node(child)?;
        }
        self.set_attribute(body, "style", "pointer-events: none; user-select: none")?;
        self.set_attribute(body, "inert", "")?;
        let notice_el = self.append_element(
            body,
            "div",
            &[
                ("role", "alert"),
                ("style", "text-align:center;padding:50px;color:red;font-size:24px;"),
            ],
        )?;
        self.append_text(notice_el, notice)?;
        Ok(())
    }

    /// Whether activating `id` would follow a link.
    pub fn is_activatable(&self, id: NodeId) -> bool {
        self.interactive
            && self.is_connected(id)
            && matches!(self.tag(id), Some("a") | Some("area"))
            && self.has_attribute(id, "href")
            && self.attribute(id, "aria-disabled") != Some("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_connected_body() {
        let doc = Document::new();
        assert_eq!(doc.tag(doc.root()), Some("html"));
        assert_eq!(doc.tag(doc.body()), Some("body"));
        assert!(doc.is_connected(doc.body()));
        assert_eq!(doc.elements(), vec![doc.root(), doc.body()]);
    }

    #[test]
    fn detached_changes_are_not_observed() {
        let mut doc = Document::new();
        let div = doc.create_element("DIV");
        doc.set_attribute(div, "onclick", "x()").unwrap();
        assert_eq!(doc.pending_mutations(), 0);
        assert_eq!(doc.tag(div), Some("div"));

        doc.append_child(doc.body(), div).unwrap();
        let records = doc.take_mutations();
        assert_eq!(
            records,
            vec![MutationRecord::ChildList {
                target: doc.body(),
                added: vec![div],
                removed: vec![],
            }]
        );
    }

    #[test]
    fn attribute_changes_record_old_value() {
        let mut doc = Document::new();
        let a = doc
            .append_element(doc.body(), "a", &[("href", "/one")])
            .unwrap();
        doc.take_mutations();

        doc.set_attribute(a, "HREF", "/two").unwrap();
        assert_eq!(doc.attribute(a, "href"), Some("/two"));
        assert_eq!(doc.remove_attribute(a, "href").unwrap(), Some("/two".into()));
        assert_eq!(doc.remove_attribute(a, "href").unwrap(), None);

        let records = doc.take_mutations();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            MutationRecord::Attributes {
                target: a,
                name: "href".into(),
                old_value: Some("/one".into()),
            }
        );
    }

    #[test]
    fn removed_nodes_are_disconnected() {
        let mut doc = Document::new();
        let div = doc.append_element(doc.body(), "div", &[]).unwrap();
        let span = doc.append_element(div, "span", &[]).unwrap();
        doc.remove_node(div).unwrap();

        assert!(!doc.is_connected(span));
        assert!(doc.elements_by_tag("span").is_empty());
    }

    #[test]
    fn append_rejects_cycles_and_double_attach() {
        let mut doc = Document::new();
        let outer = doc.append_element(doc.body(), "div", &[]).unwrap();
        let inner = doc.append_element(outer, "div", &[]).unwrap();

        assert_eq!(
            doc.append_child(doc.body(), inner),
            Err(DocumentError::AlreadyAttached(inner))
        );
        doc.remove_node(outer).unwrap();
        assert_eq!(
            doc.append_child(inner, outer),
            Err(DocumentError::Cycle {
                parent: inner,
                child: outer
            })
        );
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let mut doc = Document::new();
        let p = doc.append_element(doc.body(), "p", &[]).unwrap();
        doc.append_text(p, "hello ").unwrap();
        let b = doc.append_element(p, "b", &[]).unwrap();
        doc.append_text(b, "world").unwrap();
        assert_eq!(doc.text_content(p), "hello world");

        doc.set_text_content(p, "replaced").unwrap();
        assert_eq!(doc.text_content(p), "replaced");
        assert!(!doc.is_connected(b));
    }

    #[test]
    fn subtree_elements_in_document_order() {
        let mut doc = Document::new();
        let a = doc.append_element(doc.body(), "section", &[]).unwrap();
        let b = doc.append_element(a, "p", &[]).unwrap();
        let c = doc.append_element(a, "p", &[]).unwrap();
        let d = doc.append_element(b, "em", &[]).unwrap();
        assert_eq!(doc.subtree_elements(a), vec![a, b, d, c]);
    }

    #[test]
    fn lock_down_replaces_body_and_disables_links() {
        let mut doc = Document::new();
        let a = doc
            .append_element(doc.body(), "a", &[("href", "/home")])
            .unwrap();
        assert!(doc.is_activatable(a));

        doc.lock_down("locked").unwrap();
        assert!(!doc.is_interactive());
        assert!(!doc.is_activatable(a));
        assert_eq!(doc.text_content(doc.body()), "locked");
    }
}
