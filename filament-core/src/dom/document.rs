//! In-memory document tree.
//!
//! Nodes live in an arena owned by the [`Document`]; a [`NodeId`] is an index
//! into it. Removing a node only detaches it, the id stays valid so a manager
//! can keep referring to (and later re-insert) a detached subtree.

use std::fmt::Write as _;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::spec::NodeSpec;
use crate::error::DocumentError;

type Result<T> = std::result::Result<T, DocumentError>;

/// Handle to a node of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<NodeData>,
}

impl Arena {
    fn get(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes.get(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes.get_mut(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn detach(&mut self, id: NodeId) -> Result<()> {
        if let Some(parent) = self.get_mut(id)?.parent.take() {
            self.get_mut(parent)?.children.retain(|c| *c != id);
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> Result<bool> {
        loop {
            if node == ancestor {
                return Ok(true);
            }
            match self.get(node)?.parent {
                Some(parent) => node = parent,
                None => return Ok(false),
            }
        }
    }

    fn insert(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        self.get(parent)?;
        if self.is_ancestor_or_self(child, parent)? {
            return Err(DocumentError::Cycle(child));
        }
        if let Some(reference) = reference {
            if self.get(reference)?.parent != Some(parent) {
                return Err(DocumentError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }

        self.detach(child)?;
        let siblings = &mut self.get_mut(parent)?.children;
        let position = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        self.get_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn build(&mut self, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::Text(text) => self.alloc(NodeKind::Text(text.clone())),
            NodeSpec::Element {
                tag,
                attributes,
                children,
            } => {
                let id = self.alloc(NodeKind::Element {
                    tag: tag.clone(),
                    attributes: attributes.clone(),
                });
                for child in children {
                    let child = self.build(child);
                    self.nodes[child.0].parent = Some(id);
                    self.nodes[id.0].children.push(child);
                }
                id
            }
        }
    }

    fn deep_clone(&mut self, id: NodeId) -> Result<NodeId> {
        let source = self.get(id)?.clone();
        let copy = self.alloc(source.kind);
        for child in source.children {
            let child = self.deep_clone(child)?;
            self.nodes[child.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child);
        }
        Ok(copy)
    }
}

/// A shared, mutable document tree.
///
/// Cloning a `Document` yields another handle to the same tree.
#[derive(Debug, Clone)]
pub struct Document {
    arena: Arc<RwLock<Arena>>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut arena = Arena::default();
        let root = arena.alloc(NodeKind::Document);
        Self {
            arena: Arc::new(RwLock::new(arena)),
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&self, tag: impl Into<String>) -> NodeId {
        self.arena.write().alloc(NodeKind::Element {
            tag: tag.into(),
            attributes: IndexMap::new(),
        })
    }

    pub fn create_text(&self, text: impl Into<String>) -> NodeId {
        self.arena.write().alloc(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&self, text: impl Into<String>) -> NodeId {
        self.arena.write().alloc(NodeKind::Comment(text.into()))
    }

    /// Build a detached subtree from `spec`.
    pub fn build(&self, spec: &NodeSpec) -> NodeId {
        self.arena.write().build(spec)
    }

    /// Copy `node` and its whole subtree. The copy is detached.
    pub fn deep_clone(&self, node: NodeId) -> Result<NodeId> {
        self.arena.write().deep_clone(node)
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.arena.write().insert(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference`, or last when
    /// `reference` is `None`.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        self.arena.write().insert(parent, child, reference)
    }

    /// Detach `node` from its parent. Detaching a detached node is a no-op.
    pub fn remove(&self, node: NodeId) -> Result<()> {
        self.arena.write().detach(node)
    }

    /// Put `new` where `old` is and detach `old`.
    pub fn replace(&self, old: NodeId, new: NodeId) -> Result<()> {
        let mut arena = self.arena.write();
        let parent = arena.get(old)?.parent.ok_or(DocumentError::NoParent(old))?;
        arena.insert(parent, new, Some(old))?;
        arena.detach(old)
    }

    /// Replace every child of `parent` with nodes built from `specs`.
    pub fn replace_children(&self, parent: NodeId, specs: &[NodeSpec]) -> Result<Vec<NodeId>> {
        let mut arena = self.arena.write();
        let old = std::mem::take(&mut arena.get_mut(parent)?.children);
        for child in old {
            arena.get_mut(child)?.parent = None;
        }
        let mut built = Vec::with_capacity(specs.len());
        for spec in specs {
            let child = arena.build(spec);
            arena.insert(parent, child, None)?;
            built.push(child);
        }
        Ok(built)
    }

    /// Swap an element for a new one with tag `tag`, carrying over its
    /// attributes and children. Returns the new element.
    pub fn retag(&self, node: NodeId, tag: &str) -> Result<NodeId> {
        let mut arena = self.arena.write();
        let attributes = match &arena.get(node)?.kind {
            NodeKind::Element { attributes, .. } => attributes.clone(),
            _ => return Err(DocumentError::NotAnElement(node)),
        };
        let replacement = arena.alloc(NodeKind::Element {
            tag: tag.to_string(),
            attributes,
        });

        let children = std::mem::take(&mut arena.get_mut(node)?.children);
        for child in &children {
            arena.get_mut(*child)?.parent = Some(replacement);
        }
        arena.get_mut(replacement)?.children = children;

        if let Some(parent) = arena.get(node)?.parent {
            arena.insert(parent, replacement, Some(node))?;
            arena.detach(node)?;
        }
        Ok(replacement)
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.read().get(node).ok().and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.arena
            .read()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.arena
            .read()
            .get(parent)
            .ok()
            .and_then(|n| n.children.get(index).copied())
    }

    /// Position of `node` among its parent's children.
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        let arena = self.arena.read();
        let parent = arena.get(node).ok()?.parent?;
        arena.get(parent).ok()?.children.iter().position(|c| *c == node)
    }

    /// The sibling `offset` positions after `node`.
    pub fn sibling_at(&self, node: NodeId, offset: usize) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let index = self.index_of(node)?;
        self.child_at(parent, index + offset)
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.arena
            .read()
            .is_ancestor_or_self(ancestor, node)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    pub fn kind(&self, node: NodeId) -> Result<NodeKind> {
        Ok(self.arena.read().get(node)?.kind.clone())
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.kind(node), Ok(NodeKind::Element { .. }))
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.arena.read().get(node).ok()?.kind {
            NodeKind::Element { ref tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Attributes of an element in document order; empty for other nodes.
    pub fn attributes(&self, node: NodeId) -> IndexMap<String, String> {
        match self.arena.read().get(node).map(|n| &n.kind) {
            Ok(NodeKind::Element { attributes, .. }) => attributes.clone(),
            _ => IndexMap::new(),
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.arena.read().get(node).ok()?.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
            _ => None,
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
        match &mut self.arena.write().get_mut(node)?.kind {
            NodeKind::Element { attributes, .. } => {
                attributes.insert(name.to_string(), value.into());
                Ok(())
            }
            _ => Err(DocumentError::NotAnElement(node)),
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>> {
        match &mut self.arena.write().get_mut(node)?.kind {
            NodeKind::Element { attributes, .. } => Ok(attributes.shift_remove(name)),
            _ => Err(DocumentError::NotAnElement(node)),
        }
    }

    /// Data of a text or comment node.
    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.arena.read().get(node).ok()?.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn set_text(&self, node: NodeId, value: impl Into<String>) -> Result<()> {
        match &mut self.arena.write().get_mut(node)?.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => {
                *text = value.into();
                Ok(())
            }
            _ => Err(DocumentError::NotText(node)),
        }
    }

    /// Concatenated text of every text node below `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let arena = self.arena.read();
        let mut out = String::new();
        collect_text(&arena, node, &mut out);
        out
    }

    /// Serialize `node` as markup. Used for diagnostics and tests.
    pub fn markup(&self, node: NodeId) -> String {
        let arena = self.arena.read();
        let mut out = String::new();
        write_markup(&arena, node, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.arena.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_text(arena: &Arena, node: NodeId, out: &mut String) {
    let Ok(data) = arena.get(node) else { return };
    if let NodeKind::Text(text) = &data.kind {
        out.push_str(text);
    }
    for child in &data.children {
        collect_text(arena, *child, out);
    }
}

fn write_markup(arena: &Arena, node: NodeId, out: &mut String) {
    let Ok(data) = arena.get(node) else { return };
    match &data.kind {
        NodeKind::Document => {
            for child in &data.children {
                write_markup(arena, *child, out);
            }
        }
        NodeKind::Element { tag, attributes } => {
            let _ = write!(out, "<{tag}");
            for (name, value) in attributes {
                let _ = write!(out, " {name}=\"{value}\"");
            }
            out.push('>');
            for child in &data.children {
                write_markup(arena, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(text) => {
            let _ = write!(out, "<!--{text}-->");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_serialize() {
        let doc = Document::new();
        let ul = doc.build(
            &NodeSpec::element("ul")
                .attr("class", "list")
                .child(NodeSpec::element("li").child(NodeSpec::text("a"))),
        );
        doc.append_child(doc.root(), ul).unwrap();
        assert_eq!(
            doc.markup(doc.root()),
            r#"<ul class="list"><li>a</li></ul>"#
        );
        assert_eq!(doc.text_content(ul), "a");
    }

    #[test]
    fn insert_before_and_siblings() {
        let doc = Document::new();
        let root = doc.root();
        let a = doc.create_text("a");
        let c = doc.create_text("c");
        let b = doc.create_text("b");
        doc.append_child(root, a).unwrap();
        doc.append_child(root, c).unwrap();
        doc.insert_before(root, b, Some(c)).unwrap();

        assert_eq!(doc.children(root), vec![a, b, c]);
        assert_eq!(doc.index_of(c), Some(2));
        assert_eq!(doc.sibling_at(a, 2), Some(c));
        assert_eq!(doc.sibling_at(a, 3), None);
    }

    #[test]
    fn moving_a_node_detaches_it_first() {
        let doc = Document::new();
        let left = doc.create_element("div");
        let right = doc.create_element("div");
        let item = doc.create_element("span");
        doc.append_child(left, item).unwrap();
        doc.append_child(right, item).unwrap();
        assert!(doc.children(left).is_empty());
        assert_eq!(doc.parent(item), Some(right));
    }

    #[test]
    fn cycles_are_rejected() {
        let doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();
        assert_eq!(doc.append_child(inner, outer), Err(DocumentError::Cycle(outer)));
    }

    #[test]
    fn reference_must_be_a_child() {
        let doc = Document::new();
        let stray = doc.create_text("x");
        let node = doc.create_text("y");
        assert_eq!(
            doc.insert_before(doc.root(), node, Some(stray)),
            Err(DocumentError::NotAChild {
                parent: doc.root(),
                child: stray
            })
        );
    }

    #[test]
    fn retag_keeps_attributes_children_and_position() {
        let doc = Document::new();
        let root = doc.root();
        let before = doc.create_text("-");
        let node = doc.build(
            &NodeSpec::element("my-list")
                .attr("id", "l")
                .child(NodeSpec::text("x")),
        );
        doc.append_child(root, before).unwrap();
        doc.append_child(root, node).unwrap();

        let ul = doc.retag(node, "ul").unwrap();
        assert_eq!(doc.children(root), vec![before, ul]);
        assert_eq!(doc.attribute(ul, "id").as_deref(), Some("l"));
        assert_eq!(doc.markup(ul), r#"<ul id="l">x</ul>"#);
        assert_eq!(doc.parent(node), None);
    }

    #[test]
    fn deep_clone_is_detached_and_independent() {
        let doc = Document::new();
        let node = doc.build(&NodeSpec::element("p").child(NodeSpec::text("hi")));
        doc.append_child(doc.root(), node).unwrap();

        let copy = doc.deep_clone(node).unwrap();
        assert_eq!(doc.parent(copy), None);
        doc.set_text(doc.children(copy)[0], "bye").unwrap();
        assert_eq!(doc.text_content(node), "hi");
        assert_eq!(doc.text_content(copy), "bye");
    }

    #[test]
    fn replace_children_drops_old_content() {
        let doc = Document::new();
        let host = doc.build(&NodeSpec::element("div").child(NodeSpec::text("old")));
        let old = doc.children(host)[0];
        let built = doc
            .replace_children(host, &[NodeSpec::text("a"), NodeSpec::text("b")])
            .unwrap();
        assert_eq!(doc.children(host), built);
        assert_eq!(doc.parent(old), None);
        assert_eq!(doc.text_content(host), "ab");
    }

    #[test]
    fn content_apis_check_node_kind() {
        let doc = Document::new();
        let el = doc.create_element("b");
        assert_eq!(doc.set_text(el, "x"), Err(DocumentError::NotText(el)));
        let text = doc.create_text("t");
        assert_eq!(doc.set_attribute(text, "a", "b"), Err(DocumentError::NotAnElement(text)));
    }
}
