//! The DOM collaborator consumed by fragments, keyed blocks and transitions.
//!
//! The runtime only needs a handful of structural operations: insert before an
//! anchor, detach, inline style access, keyframe rules and event dispatch.
//! [`MemoryDom`] implements them over a node arena for hosts without a real
//! document and for tests.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    Missing { id: NodeId },
    NotAChild { parent: NodeId, child: NodeId },
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::Missing { id } => write!(f, "node {id} missing"),
            DomError::NotAChild { parent, child } => {
                write!(f, "node {child} is not a child of node {parent}")
            }
        }
    }
}

impl std::error::Error for DomError {}

pub trait Dom {
    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, data: &str) -> NodeId;

    /// Inserts `node` into `parent` before `anchor`, or at the end when no
    /// anchor is given. A node that already has a parent is moved.
    fn insert(&mut self, parent: NodeId, node: NodeId, anchor: Option<NodeId>)
        -> Result<(), DomError>;

    /// Removes `node` from its parent. Detaching an orphan is a no-op.
    fn detach(&mut self, node: NodeId) -> Result<(), DomError>;

    fn set_text(&mut self, node: NodeId, data: &str) -> Result<(), DomError>;

    fn set_style(&mut self, node: NodeId, property: &str, value: Option<&str>)
        -> Result<(), DomError>;

    fn style(&self, node: NodeId, property: &str) -> Option<String>;

    fn insert_keyframes(&mut self, name: &str, rule: &str);

    fn delete_keyframes(&mut self, name: &str);

    fn dispatch_event(&mut self, node: NodeId, event: &str) -> Result<(), DomError>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DomError>;
}

pub type SharedDom = Rc<RefCell<dyn Dom>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    style: HashMap<String, String>,
}

impl MemoryNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            style: HashMap::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDom {
    nodes: Vec<MemoryNode>,
    keyframes: HashMap<String, String>,
    events: Vec<(NodeId, String)>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<RefCell<MemoryDom>> {
        Rc::new(RefCell::new(Self::new()))
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, DomError> {
        self.nodes.get(id).ok_or(DomError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, DomError> {
        self.nodes.get_mut(id).ok_or(DomError::Missing { id })
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|node| &node.kind)
    }

    /// Concatenated text of every text node below `id`, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: NodeId, output: &mut String) {
        if let Some(node) = self.nodes.get(id) {
            if let NodeKind::Text(data) = &node.kind {
                output.push_str(data);
            }
            for child in &node.children {
                self.collect_text(*child, output);
            }
        }
    }

    pub fn keyframes(&self, name: &str) -> Option<&str> {
        self.keyframes.get(name).map(String::as_str)
    }

    pub fn keyframe_count(&self) -> usize {
        self.keyframes.len()
    }

    pub fn events(&self) -> &[(NodeId, String)] {
        &self.events
    }

    pub fn events_for(&self, node: NodeId) -> Vec<String> {
        self.events
            .iter()
            .filter(|(target, _)| *target == node)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn dump_tree(&self, root: NodeId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, root, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.nodes.get(id) {
            Some(node) => {
                match &node.kind {
                    NodeKind::Element(tag) => output.push_str(&format!("{indent}<{tag}>\n")),
                    NodeKind::Text(data) => output.push_str(&format!("{indent}{data:?}\n")),
                }
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            None => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }
}

impl Dom for MemoryDom {
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes
            .push(MemoryNode::new(NodeKind::Element(tag.to_string())));
        self.nodes.len() - 1
    }

    fn create_text(&mut self, data: &str) -> NodeId {
        self.nodes
            .push(MemoryNode::new(NodeKind::Text(data.to_string())));
        self.nodes.len() - 1
    }

    fn insert(
        &mut self,
        parent: NodeId,
        node: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.node(parent)?;
        self.node(node)?;
        if anchor == Some(node) {
            return Ok(());
        }
        self.detach(node)?;
        let position = match anchor {
            Some(anchor) => self
                .node(parent)?
                .children
                .iter()
                .position(|child| *child == anchor)
                .ok_or(DomError::NotAChild {
                    parent,
                    child: anchor,
                })?,
            None => self.node(parent)?.children.len(),
        };
        self.node_mut(parent)?.children.insert(position, node);
        self.node_mut(node)?.parent = Some(parent);
        Ok(())
    }

    fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let parent = self.node(node)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|child| *child != node);
            self.node_mut(node)?.parent = None;
        }
        Ok(())
    }

    fn set_text(&mut self, node: NodeId, data: &str) -> Result<(), DomError> {
        let target = self.node_mut(node)?;
        if let NodeKind::Text(current) = &mut target.kind {
            if current != data {
                *current = data.to_string();
            }
        }
        Ok(())
    }

    fn set_style(
        &mut self,
        node: NodeId,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), DomError> {
        let target = self.node_mut(node)?;
        match value {
            Some(value) if !value.is_empty() => {
                target.style.insert(property.to_string(), value.to_string());
            }
            _ => {
                target.style.remove(property);
            }
        }
        Ok(())
    }

    fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.nodes
            .get(node)
            .and_then(|node| node.style.get(property).cloned())
    }

    fn insert_keyframes(&mut self, name: &str, rule: &str) {
        self.keyframes.insert(name.to_string(), rule.to_string());
    }

    fn delete_keyframes(&mut self, name: &str) {
        self.keyframes.remove(name);
    }

    fn dispatch_event(&mut self, node: NodeId, event: &str) -> Result<(), DomError> {
        self.node(node)?;
        self.events.push((node, event.to_string()));
        Ok(())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|node| node.parent)
    }

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, DomError> {
        Ok(self.node(node)?.children.clone())
    }
}

#[cfg(test)]
#[path = "tests/dom_tests.rs"]
mod tests;
