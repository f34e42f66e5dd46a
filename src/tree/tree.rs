//! Decision tree container and cursor
//!
//! The tree owns its node graph as an arena keyed by node number. Slot
//! aliases produced by value merging mean a subtree may be reachable from
//! several slots; removal therefore walks owned slots only, so every node
//! is freed exactly once.
use crate::data::TargetKind;
use crate::errors::ArborError;
use crate::node::{Node, Slot};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

#[derive(Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: HashMap<usize, Node>,
    pub root: usize,
    /// Target column in the attribute set.
    pub target: usize,
    pub target_kind: TargetKind,
    /// Cached tree height; refreshed after growing and pruning.
    pub height: usize,
    pub(crate) next_num: usize,
}

impl DecisionTree {
    pub(crate) fn new(target: usize, target_kind: TargetKind) -> Self {
        DecisionTree {
            nodes: HashMap::new(),
            root: 0,
            target,
            target_kind,
            height: 0,
            next_num: 0,
        }
    }

    pub(crate) fn alloc_num(&mut self) -> usize {
        let num = self.next_num;
        self.next_num += 1;
        num
    }

    #[inline]
    pub fn node(&self, num: usize) -> &Node {
        &self.nodes[&num]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, num: usize) -> &mut Node {
        self.nodes.get_mut(&num).expect("node number in arena")
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn class_count(&self) -> usize {
        self.target_kind.class_count()
    }

    /// Total weight seen at the root.
    pub fn total_weight(&self) -> f64 {
        self.node(self.root).frequency
    }

    /// Remove a subtree, walking owned slots only so linked slots are
    /// never freed twice.
    pub(crate) fn remove_subtree(&mut self, num: usize) {
        let removed = self.nodes.remove(&num).expect("node number in arena");
        for slot in &removed.slots {
            if let Slot::Owned(child) = slot {
                self.remove_subtree(*child);
            }
        }
    }

    /// Remove the child subtrees of a node, leaving the node itself.
    pub(crate) fn remove_children_of(&mut self, num: usize) {
        let children: Vec<usize> = self.node(num).owned_children().collect();
        for child in children {
            self.remove_subtree(child);
        }
    }

    fn node_height(&self, num: usize) -> usize {
        let node = self.node(num);
        node.owned_children()
            .map(|c| 1 + self.node_height(c))
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn refresh_height(&mut self) {
        self.height = if self.nodes.is_empty() {
            0
        } else {
            self.node_height(self.root)
        };
    }

    /// Set one class weight of a leaf and re-derive its statistics.
    pub fn set_leaf_frequency(&mut self, num: usize, class: usize, weight: f64) {
        let node = self.node_mut(num);
        debug_assert!(node.is_leaf(), "frequency writes only apply to leaves");
        node.freqs[class] = weight;
        node.refresh_nominal_stats();
    }

    pub fn leaf_frequency(&self, num: usize, class: usize) -> f64 {
        self.node(num).freqs[class]
    }

    /// A read cursor positioned at the root.
    pub fn cursor(&self) -> TreeCursor<'_> {
        TreeCursor {
            tree: self,
            current: self.root,
            path: Vec::new(),
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter, num: usize, indent: usize) -> fmt::Result {
        let node = self.node(num);
        writeln!(f, "{:indent$}{}", "", node, indent = indent * 2)?;
        for slot in &node.slots {
            if let Slot::Owned(child) = slot {
                self.fmt_node(f, *child, indent + 1)?;
            }
        }
        Ok(())
    }
}

impl Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.nodes.is_empty() {
            return writeln!(f, "<empty tree>");
        }
        self.fmt_node(f, self.root, 0)
    }
}

/// Cursor for external navigation over the node graph. Descending resolves
/// link aliases, so the cursor only ever rests on owned nodes.
pub struct TreeCursor<'a> {
    tree: &'a DecisionTree,
    current: usize,
    path: Vec<usize>,
}

impl<'a> TreeCursor<'a> {
    pub fn to_root(&mut self) {
        self.current = self.tree.root;
        self.path.clear();
    }

    /// Step down into a slot of the current node.
    pub fn descend(&mut self, slot: usize) -> Result<(), ArborError> {
        let child = self
            .tree
            .node(self.current)
            .resolve(slot)
            .ok_or(ArborError::EmptySlot(slot))?;
        self.path.push(self.current);
        self.current = child;
        Ok(())
    }

    /// Step back up; returns false at the root.
    pub fn ascend(&mut self) -> bool {
        match self.path.pop() {
            Some(parent) => {
                self.current = parent;
                true
            }
            None => false,
        }
    }

    pub fn node(&self) -> &'a Node {
        self.tree.node(self.current)
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn attribute(&self) -> Option<usize> {
        self.node().split_attribute
    }

    pub fn cut(&self) -> Option<f64> {
        self.node().cut
    }

    pub fn frequency(&self) -> f64 {
        self.node().frequency
    }

    pub fn error(&self) -> f64 {
        self.node().error
    }

    pub fn majority(&self) -> Option<usize> {
        self.node().majority()
    }

    pub fn mean(&self) -> f64 {
        self.node().mean
    }

    pub fn frequency_of(&self, class: usize) -> f64 {
        self.node().freqs[class]
    }
}
