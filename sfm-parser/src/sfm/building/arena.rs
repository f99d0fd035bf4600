//! Arena storage for the live import tree.
//!
//! Nodes are stored in a slot vector and referenced by index, so parent and
//! child links are plain integers with no ownership cycles. Flushed
//! subtrees release their slots for reuse; on a long input the arena stays
//! as small as the deepest unfinished entry.

use crate::sfm::morphology::MorphAnalysis;
use std::collections::HashSet;

/// One field value, already rendered to an XML fragment.
#[derive(Debug, Clone)]
pub struct RenderedField {
    pub marker: String,
    /// Output element name (the field's meaning id).
    pub element: String,
    pub xml_lang: Option<String>,
    pub line: usize,
    /// Escaped XML fragment; may contain inline-marker elements.
    pub text: String,
    pub abbreviation: bool,
    /// The field was auto-imported rather than declared for its node.
    pub auto: bool,
    pub morph: Option<MorphAnalysis>,
    /// Reference-function metadata carried through from the field
    /// description (e.g. a variant relation name).
    pub reference_func: Option<String>,
}

/// Ordered content of a node: field values and child nodes interleaved in
/// input order.
#[derive(Debug, Clone)]
pub enum NodeContent {
    Field(RenderedField),
    Child(usize),
}

/// One instantiated hierarchy level.
#[derive(Debug)]
pub struct ImportNode {
    /// Level name; doubles as the output element name.
    pub level: String,
    /// `None` only for the synthetic root.
    pub parent: Option<usize>,
    pub depth: usize,
    pub content: Vec<NodeContent>,
    /// Markers already attached, for uniqueness checks.
    pub used: HashSet<String>,
    pub open: bool,
    /// Line of the token that created the node.
    pub line: usize,
    /// Identifying text for diagnostics, set from the first field value of
    /// a top-level entry.
    pub entry_key: Option<String>,
    /// Created to repair an out-of-order marker rather than by a begin
    /// field of its own.
    pub synthesized: bool,
}

impl ImportNode {
    pub fn new(level: impl Into<String>, parent: Option<usize>, depth: usize, line: usize) -> Self {
        Self {
            level: level.into(),
            parent,
            depth,
            content: Vec::new(),
            used: HashSet::new(),
            open: true,
            line,
            entry_key: None,
            synthesized: false,
        }
    }

    pub fn child_ids(&self) -> Vec<usize> {
        self.content
            .iter()
            .filter_map(|c| match c {
                NodeContent::Child(id) => Some(*id),
                NodeContent::Field(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<ImportNode>>,
    free: Vec<usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: ImportNode) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    pub fn get(&self, id: usize) -> &ImportNode {
        self.slots[id].as_ref().expect("live import node")
    }

    pub fn get_mut(&mut self, id: usize) -> &mut ImportNode {
        self.slots[id].as_mut().expect("live import node")
    }

    pub fn release(&mut self, id: usize) {
        self.slots[id] = None;
        self.free.push(id);
    }

    /// Live node count; used to verify eviction keeps memory bounded.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
