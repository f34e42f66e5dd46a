//! Tree pruning
//!
//! Two independent strategies. Analytic pruning estimates leaf and subtree
//! errors from the grown statistics alone, with a pessimistic or
//! confidence-level error estimator. Validation pruning re-derives every
//! node's statistics from a held-out table by re-partitioning it through the
//! existing tests, and can replace a node by its largest branch. Both
//! collapse a subtree whenever keeping it is not measurably better.
use crate::constants::{
    DEFAULT_PESSIMISTIC_INCREMENT, ERROR_EPSILON,
};
use crate::data::{AttributeSet, TargetKind, Tuple};
use crate::errors::ArborError;
use crate::grower::{leaf_stats, LeafStats};
use crate::node::{Node, Slot};
use crate::tree::tree::DecisionTree;
use crate::utils::{group_branches, normal_quantile, validate_float_parameter};
use hashbrown::HashMap;
use log::info;
use serde::{Deserialize, Serialize};

/// Analytic error estimation method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PruneMethod {
    /// Add a fixed increment to the observed error, clipped to the weight.
    Pessimistic,
    /// C4.5-style upper confidence bound on the error.
    ConfidenceLevel,
}

/// Parameters of a single prune call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PruneOptions {
    pub method: PruneMethod,
    /// Increment for `Pessimistic`, confidence level for `ConfidenceLevel`.
    pub param: f64,
    pub max_height: usize,
    /// Consider replacing a node by its largest branch (validation only).
    pub check_largest: bool,
    /// Two-class selection filter on the first class's relative frequency.
    pub selection_threshold: Option<f64>,
}

impl Default for PruneOptions {
    fn default() -> Self {
        PruneOptions {
            method: PruneMethod::Pessimistic,
            param: DEFAULT_PESSIMISTIC_INCREMENT,
            max_height: usize::MAX,
            check_largest: false,
            selection_threshold: None,
        }
    }
}

impl PruneOptions {
    /// Set the estimation method.
    /// * `method` - Pessimistic or confidence-level estimation.
    pub fn set_method(mut self, method: PruneMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the method parameter.
    /// * `param` - Error increment, or confidence level in (0, 1).
    pub fn set_param(mut self, param: f64) -> Self {
        self.param = param;
        self
    }

    /// Set the height budget of the pruned tree.
    /// * `max_height` - Maximum number of tests on any path.
    pub fn set_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height;
        self
    }

    /// Enable the largest-branch check of validation pruning.
    /// * `check_largest` - Consider hoisting the heaviest branch.
    pub fn set_check_largest(mut self, check_largest: bool) -> Self {
        self.check_largest = check_largest;
        self
    }

    /// Set the two-class selection threshold.
    /// * `selection_threshold` - Nodes whose first-class share does not
    ///   exceed it are collapsed.
    pub fn set_selection_threshold(mut self, selection_threshold: Option<f64>) -> Self {
        self.selection_threshold = selection_threshold;
        self
    }

    fn validate(&self) -> Result<(), ArborError> {
        match self.method {
            PruneMethod::Pessimistic => {
                validate_float_parameter(self.param, 0.0, f64::INFINITY, "param")
            }
            PruneMethod::ConfidenceLevel => {
                if self.param > 0.0 && self.param < 1.0 {
                    Ok(())
                } else {
                    Err(ArborError::InvalidParameter(
                        "param".to_string(),
                        "confidence level within (0, 1)".to_string(),
                        self.param.to_string(),
                    ))
                }
            }
        }
    }
}

/// Estimator turning an observed error and a weight into an expected error,
/// pre-initialized with its confidence parameter.
enum ErrorEstimator {
    Pessimistic { increment: f64 },
    ConfidenceLevel { level: f64, z: f64 },
}

impl ErrorEstimator {
    fn new(method: PruneMethod, param: f64) -> Self {
        match method {
            PruneMethod::Pessimistic => ErrorEstimator::Pessimistic { increment: param },
            PruneMethod::ConfidenceLevel => ErrorEstimator::ConfidenceLevel {
                level: param,
                z: normal_quantile(1.0 - param),
            },
        }
    }

    fn estimate(&self, n: f64, e: f64) -> f64 {
        match self {
            ErrorEstimator::Pessimistic { increment } => {
                if e >= n {
                    // a squared-error total can exceed the weight; the clip
                    // only applies to misclassification counts
                    e + increment
                } else {
                    (e + increment).min(n)
                }
            }
            ErrorEstimator::ConfidenceLevel { level, z } => {
                if n <= 0.0 {
                    return e;
                }
                if e > n {
                    // a squared-error total, not a misclassification count:
                    // normal-theory upper bound on the variance
                    return e * (1.0 + z * (2.0 / n).sqrt());
                }
                (e + added_errors(n, e, *level, *z)).min(n)
            }
        }
    }
}

/// Extra errors of the upper confidence bound, after C4.5. Exact for zero
/// observed errors, interpolated for observed errors below one.
fn added_errors(n: f64, e: f64, level: f64, z: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let base = n * (1.0 - level.powf(1.0 / n));
    if e < 1e-6 {
        base
    } else if e < 0.9999 {
        let at_one = added_errors(n, 1.0, level, z);
        base + e * (at_one - base)
    } else if e + 0.5 >= n {
        (0.67 * (n - e)).max(0.0)
    } else {
        let pr = (e + 0.5) / n;
        let v = pr
            + z * z / (2.0 * n)
            + z * (pr / n - pr * pr / n + z * z / (4.0 * n * n)).sqrt();
        let v = v / (1.0 + z * z / n);
        (n * v - e).max(0.0)
    }
}

enum Choice {
    Keep,
    Leaf,
    Hoist(usize),
}

impl DecisionTree {
    /// Prune in place with an analytic error estimator; no data needed.
    pub fn prune(&mut self, options: &PruneOptions) -> Result<(), ArborError> {
        options.validate()?;
        let est = ErrorEstimator::new(options.method, options.param);
        let before = self.size();
        self.prune_node(
            self.root,
            &est,
            options.max_height,
            options.selection_threshold,
        );
        self.refresh_height();
        info!("pruning: n_nodes: {} -> {}", before, self.size());
        Ok(())
    }

    /// Estimated error of the whole subtree; collapses it whenever the
    /// node's own leaf estimate is not worse.
    fn prune_node(
        &mut self,
        num: usize,
        est: &ErrorEstimator,
        height: usize,
        threshold: Option<f64>,
    ) -> f64 {
        let node = self.node(num);
        let leaf_est = est.estimate(node.frequency, node.error);
        if node.is_leaf() {
            return leaf_est;
        }
        if height == 0 {
            self.collapse(num);
            return self.estimate_as_leaf(num, est);
        }
        if let (Some(t), TargetKind::Classes(2)) = (threshold, self.target_kind) {
            let node = self.node(num);
            let selected = node.frequency > 0.0 && node.freqs[0] / node.frequency > t;
            if !selected {
                self.collapse(num);
                return self.estimate_as_leaf(num, est);
            }
        }
        let children: Vec<usize> = self.node(num).owned_children().collect();
        let mut subtree = 0.0;
        for child in children {
            subtree += self.prune_node(child, est, height - 1, threshold);
        }
        if leaf_est <= subtree * (1.0 + ERROR_EPSILON) {
            self.collapse(num);
            return self.estimate_as_leaf(num, est);
        }
        subtree
    }

    fn estimate_as_leaf(&self, num: usize, est: &ErrorEstimator) -> f64 {
        let node = self.node(num);
        est.estimate(node.frequency, node.error)
    }

    /// Collapse a subtree into a leaf. For nominal targets the reachable
    /// leaves' class frequencies are aggregated exactly once, skipping
    /// linked slots; for metric targets the children are discarded and the
    /// node's own statistics stand.
    pub(crate) fn collapse(&mut self, num: usize) {
        if self.node(num).is_leaf() {
            return;
        }
        match self.target_kind {
            TargetKind::Classes(k) => {
                let mut freqs = vec![0.0; k];
                self.collect_leaf_freqs(num, &mut freqs);
                self.remove_children_of(num);
                let node = self.node_mut(num);
                node.freqs = freqs;
                node.make_leaf();
                node.refresh_nominal_stats();
            }
            TargetKind::Metric => {
                self.remove_children_of(num);
                self.node_mut(num).make_leaf();
            }
        }
    }

    fn collect_leaf_freqs(&self, num: usize, acc: &mut [f64]) {
        let node = self.node(num);
        if node.is_leaf() {
            for (a, f) in acc.iter_mut().zip(node.freqs.iter()) {
                *a += f;
            }
        } else {
            for child in node.owned_children() {
                self.collect_leaf_freqs(child, acc);
            }
        }
    }

    /// Prune in place against a held-out validation table. Every node's
    /// statistics are re-derived from the table; the tuple slice is
    /// reordered in place.
    pub fn prune_with_table(
        &mut self,
        attrs: &AttributeSet,
        tuples: &mut [Tuple],
        options: &PruneOptions,
    ) -> Result<(), ArborError> {
        options.validate()?;
        for t in tuples.iter_mut() {
            t.reset_xweight();
        }
        let before = self.size();
        self.prune_validation(
            attrs,
            self.root,
            tuples,
            options.max_height,
            options.check_largest,
        );
        self.refresh_height();
        for t in tuples.iter_mut() {
            t.reset_xweight();
        }
        info!(
            "validation pruning: n_nodes: {} -> {}",
            before,
            self.size()
        );
        Ok(())
    }

    fn install_stats(&mut self, num: usize, stats: &LeafStats) {
        let node = self.node_mut(num);
        node.frequency = stats.frequency;
        node.freqs = stats.freqs.clone();
        node.mean = stats.mean;
        node.error = stats.error;
        if node.is_leaf() {
            node.known = stats.frequency;
        }
    }

    /// Collapse without touching the statistics already installed from the
    /// validation table.
    fn collapse_keep_stats(&mut self, num: usize) {
        self.remove_children_of(num);
        self.node_mut(num).make_leaf();
    }

    /// Realized validation error of the subtree after pruning it.
    fn prune_validation(
        &mut self,
        attrs: &AttributeSet,
        num: usize,
        tuples: &mut [Tuple],
        height: usize,
        check_largest: bool,
    ) -> f64 {
        let stats = leaf_stats(self.target_kind, self.target, tuples);
        let leaf_err = stats.error;
        self.install_stats(num, &stats);
        if self.node(num).is_leaf() {
            return leaf_err;
        }
        if height == 0 {
            self.collapse_keep_stats(num);
            return leaf_err;
        }

        let attr = self.node(num).split_attribute.expect("test node");
        let cut = self.node(num).cut;
        if cut.is_none() {
            // values seen at grow time may be fewer than the live domain
            let live = attrs.get(attr).value_count();
            let node = self.node_mut(num);
            if live > node.slots.len() {
                node.slots.resize(live, Slot::Empty);
            }
        }
        let slots = self.node(num).slots.clone();
        let branches = slots.len();
        let owned_slot = |slot: usize| -> Option<usize> {
            let mut s = slot;
            loop {
                match slots.get(s)? {
                    Slot::Owned(_) => return Some(s),
                    Slot::Linked(next) => s = *next,
                    Slot::Empty => return None,
                }
            }
        };
        let branch_of = |t: &Tuple| -> Option<usize> {
            match cut {
                Some(c) => t
                    .value(attr)
                    .metric()
                    .and_then(|v| owned_slot(if v <= c { 0 } else { 1 })),
                None => t.value(attr).nominal().and_then(|v| owned_slot(v)),
            }
        };

        let mut subtree_err = 0.0;
        group_branches(tuples, &branch_of, branches, |b, window| {
            if let Slot::Owned(child) = slots[b] {
                subtree_err += self.prune_validation(attrs, child, window, height - 1, check_largest);
            }
        });

        // the largest branch, re-scored on the whole window as if it
        // replaced this node; evaluated on a clone first, and pruned again
        // for real only if it wins
        let mut choice = Choice::Keep;
        let mut best_err = subtree_err;
        if check_largest {
            let node = self.node(num);
            let mut largest: Option<(usize, usize)> = None;
            let mut best_w = -1.0;
            for (s, slot) in node.slots.iter().enumerate() {
                if let Slot::Owned(c) = slot {
                    let w = self.node(*c).frequency;
                    if w > best_w {
                        best_w = w;
                        largest = Some((s, *c));
                    }
                }
            }
            if let Some((slot, child)) = largest {
                let mut scratch = self.clone_subtree_tree(child);
                let largest_err =
                    scratch.prune_validation(attrs, child, tuples, height, check_largest);
                if largest_err < best_err {
                    best_err = largest_err;
                    choice = Choice::Hoist(slot);
                }
            }
        }
        if leaf_err <= best_err * (1.0 + ERROR_EPSILON) {
            choice = Choice::Leaf;
        }

        match choice {
            Choice::Leaf => {
                self.collapse_keep_stats(num);
                leaf_err
            }
            Choice::Hoist(slot) => {
                self.hoist_child(num, slot);
                self.prune_validation(attrs, num, tuples, height, check_largest)
            }
            Choice::Keep => subtree_err,
        }
    }

    fn clone_subtree_tree(&self, num: usize) -> DecisionTree {
        let mut tree = DecisionTree::new(self.target, self.target_kind);
        tree.root = num;
        tree.next_num = self.next_num;
        self.clone_subtree_into(num, &mut tree.nodes);
        tree
    }

    fn clone_subtree_into(&self, num: usize, into: &mut HashMap<usize, Node>) {
        let node = self.node(num);
        into.insert(num, node.clone());
        for child in node.owned_children() {
            self.clone_subtree_into(child, into);
        }
    }

    /// Replace a node by the subtree of one of its slots, removing every
    /// other owned child.
    fn hoist_child(&mut self, num: usize, keep_slot: usize) {
        let slots = self.node(num).slots.clone();
        let kept = match slots[keep_slot] {
            Slot::Owned(c) => c,
            _ => unreachable!("hoisted branch is owned"),
        };
        for (s, slot) in slots.iter().enumerate() {
            if s == keep_slot {
                continue;
            }
            if let Slot::Owned(c) = slot {
                self.remove_subtree(*c);
            }
        }
        let mut child = self.nodes.remove(&kept).expect("kept child in arena");
        child.num = num;
        *self.node_mut(num) = child;
    }
}
