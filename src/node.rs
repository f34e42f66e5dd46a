//! Tree nodes
//!
//! A node is either a leaf or a test node with one slot per attribute value
//! (two for metric tests). A slot owns a child subtree, links to the slot
//! whose subtree it shares after value merging, or is empty for values
//! without support. Every node carries the statistics it would have as a
//! leaf; subtree errors are computed by recursion, never stored.
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// One branch slot of a test node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// The slot owns the subtree rooted at this node number.
    Owned(usize),
    /// Alias: this value was merged into another value's subtree; the index
    /// is the slot whose subtree is shared.
    Linked(usize),
    /// Unsupported value.
    Empty,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub num: usize,
    /// Tested attribute; `None` marks a leaf.
    pub split_attribute: Option<usize>,
    /// Cut value of a metric test; slot 0 holds values at or below it.
    pub cut: Option<f64>,
    pub slots: Vec<Slot>,
    /// Total weight that reached the node.
    pub frequency: f64,
    /// Weight with a known value of the tested attribute.
    pub known: f64,
    /// Per-class weights; empty for metric targets.
    pub freqs: Vec<f64>,
    /// Target mean for metric targets.
    pub mean: f64,
    /// The node's own error as a leaf: misclassification weight, or the sum
    /// of squared errors for metric targets.
    pub error: f64,
}

impl Node {
    /// Leaf for a nominal target, deriving frequency and error from the
    /// class weights.
    pub fn leaf_nominal(num: usize, freqs: Vec<f64>) -> Self {
        let frequency: f64 = freqs.iter().sum();
        let best = freqs.iter().copied().fold(0.0, f64::max);
        Node {
            num,
            split_attribute: None,
            cut: None,
            slots: Vec::new(),
            frequency,
            known: frequency,
            freqs,
            mean: 0.0,
            error: frequency - best,
        }
    }

    /// Leaf for a metric target.
    pub fn leaf_metric(num: usize, count: f64, mean: f64, sse: f64) -> Self {
        Node {
            num,
            split_attribute: None,
            cut: None,
            slots: Vec::new(),
            frequency: count,
            known: count,
            freqs: Vec::new(),
            mean,
            error: sse,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.split_attribute.is_none()
    }

    /// Class with the largest weight, if any weight was seen.
    pub fn majority(&self) -> Option<usize> {
        if self.frequency <= 0.0 {
            return None;
        }
        self.freqs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Re-derive frequency and error after the class weights changed.
    pub fn refresh_nominal_stats(&mut self) {
        self.frequency = self.freqs.iter().sum();
        let best = self.freqs.iter().copied().fold(0.0, f64::max);
        self.error = self.frequency - best;
        if self.is_leaf() {
            self.known = self.frequency;
        }
    }

    /// Turn the node into a leaf; the stored statistics stand. The caller
    /// is responsible for removing the child subtrees first.
    pub fn make_leaf(&mut self) {
        self.split_attribute = None;
        self.cut = None;
        self.slots.clear();
        self.known = self.frequency;
    }

    /// Resolve a slot through link aliases to the owned child, if any.
    /// Link chains terminate at an owned slot.
    pub fn resolve(&self, slot: usize) -> Option<usize> {
        let mut s = slot;
        loop {
            match self.slots.get(s)? {
                Slot::Owned(num) => return Some(*num),
                Slot::Linked(next) => s = *next,
                Slot::Empty => return None,
            }
        }
    }

    /// Node numbers of the directly owned children.
    pub fn owned_children(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.iter().filter_map(|s| match s {
            Slot::Owned(num) => Some(*num),
            _ => None,
        })
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_leaf() {
            if self.freqs.is_empty() {
                write!(
                    f,
                    "{}:leaf mean={:.4},n={:.2},err={:.4}",
                    self.num, self.mean, self.frequency, self.error
                )
            } else {
                write!(
                    f,
                    "{}:leaf class={},n={:.2},err={:.4}",
                    self.num,
                    self.majority().map_or(-1i64, |c| c as i64),
                    self.frequency,
                    self.error
                )
            }
        } else {
            match self.cut {
                Some(cut) => write!(
                    f,
                    "{}:[attr {} <= {}] n={:.2}",
                    self.num,
                    self.split_attribute.unwrap_or(0),
                    cut,
                    self.frequency
                ),
                None => write!(
                    f,
                    "{}:[attr {}] branches={},n={:.2}",
                    self.num,
                    self.split_attribute.unwrap_or(0),
                    self.slots.len(),
                    self.frequency
                ),
            }
        }
    }
}
