//! Tree growing
//!
//! Recursive top-down induction: evaluate every usable attribute with the
//! splitter, pick the best partition, regroup the tuple window in place,
//! redistribute the mass of unknown-valued tuples over the branches, recurse
//! and keep the grown subtree only if it beats the leaf it replaces.
use crate::constants::{DEFAULT_MAX_HEIGHT, DEFAULT_MIN_COUNT, ERROR_EPSILON, MIN_LEAF_ERROR};
use crate::data::{AttributeSet, TargetKind, Tuple};
use crate::errors::ArborError;
use crate::measure::{Measure, MeasureParams, WORTHLESS};
use crate::node::{Node, Slot};
use crate::splitter::{SplitStrategy, Splitter};
use crate::tree::tree::DecisionTree;
use crate::utils::{group_branches, validate_positive_float_parameter};
use hashbrown::HashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Parameters of a single grow call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GrowOptions {
    pub measure: Measure,
    pub params: MeasureParams,
    pub strategy: SplitStrategy,
    /// Splits below this worth are rejected.
    pub min_worth: f64,
    pub max_height: usize,
    /// Minimum weight per branch; nodes below twice this weight stay leaves.
    pub min_count: f64,
    /// Discard a freshly grown subtree that is not better than its leaf.
    pub trivial_prune: bool,
}

impl Default for GrowOptions {
    fn default() -> Self {
        GrowOptions {
            measure: Measure::InfoGainRatio,
            params: MeasureParams::default(),
            strategy: SplitStrategy::Multiway,
            min_worth: 0.0,
            max_height: DEFAULT_MAX_HEIGHT,
            min_count: DEFAULT_MIN_COUNT,
            trivial_prune: true,
        }
    }
}

impl GrowOptions {
    // Set methods for parameters

    /// Set the scoring measure.
    /// * `measure` - The measure used to score candidate splits.
    pub fn set_measure(mut self, measure: Measure) -> Self {
        self.measure = measure;
        self
    }

    /// Set the weighted flag of the measure parameters.
    /// * `weighted` - Scale worths by the share of known attribute values.
    pub fn set_weighted(mut self, weighted: bool) -> Self {
        self.params.weighted = weighted;
        self
    }

    /// Set the Dirichlet prior of the Bayesian measure.
    /// * `prior` - Per-cell prior weight.
    pub fn set_prior(mut self, prior: f64) -> Self {
        self.params.prior = prior;
        self
    }

    /// Set the partition strategy for nominal attributes.
    /// * `strategy` - Multiway, binary or subset merging.
    pub fn set_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the minimum worth a split must reach.
    /// * `min_worth` - Worth floor.
    pub fn set_min_worth(mut self, min_worth: f64) -> Self {
        self.min_worth = min_worth;
        self
    }

    /// Set the height budget.
    /// * `max_height` - Maximum number of tests on any path.
    pub fn set_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height;
        self
    }

    /// Set the minimum branch weight.
    /// * `min_count` - Minimum weight per branch.
    pub fn set_min_count(mut self, min_count: f64) -> Self {
        self.min_count = min_count;
        self
    }

    /// Enable or disable trivial pruning of freshly grown subtrees.
    /// * `trivial_prune` - Compare each subtree against its leaf.
    pub fn set_trivial_prune(mut self, trivial_prune: bool) -> Self {
        self.trivial_prune = trivial_prune;
        self
    }

    fn validate(&self) -> Result<(), ArborError> {
        validate_positive_float_parameter(self.min_count, "min_count")?;
        validate_positive_float_parameter(self.params.prior, "prior")?;
        if self.min_worth.is_nan() {
            return Err(ArborError::InvalidParameter(
                "min_worth".to_string(),
                "a real value".to_string(),
                self.min_worth.to_string(),
            ));
        }
        Ok(())
    }
}

/// Leaf statistics derived from a tuple window; shared between growing and
/// validation pruning.
#[derive(Clone, Debug)]
pub(crate) struct LeafStats {
    pub frequency: f64,
    pub freqs: Vec<f64>,
    pub mean: f64,
    pub error: f64,
}

pub(crate) fn leaf_stats(kind: TargetKind, target: usize, tuples: &[Tuple]) -> LeafStats {
    match kind {
        TargetKind::Classes(k) => {
            let mut freqs = vec![0.0; k];
            for t in tuples {
                if let Some(y) = t.value(target).nominal() {
                    freqs[y] += t.xweight;
                }
            }
            let frequency: f64 = freqs.iter().sum();
            let best = freqs.iter().copied().fold(0.0, f64::max);
            LeafStats {
                frequency,
                freqs,
                mean: 0.0,
                error: frequency - best,
            }
        }
        TargetKind::Metric => {
            let (mut cnt, mut sum, mut sqr) = (0.0, 0.0, 0.0);
            for t in tuples {
                if let Some(v) = t.value(target).metric() {
                    cnt += t.xweight;
                    sum += t.xweight * v;
                    sqr += t.xweight * v * v;
                }
            }
            let mean = if cnt > 0.0 { sum / cnt } else { 0.0 };
            let sse = if cnt > 0.0 {
                (sqr - sum * sum / cnt).max(0.0)
            } else {
                0.0
            };
            LeafStats {
                frequency: cnt,
                freqs: Vec::new(),
                mean,
                error: sse,
            }
        }
    }
}

impl LeafStats {
    pub(crate) fn into_leaf(self, num: usize) -> Node {
        if self.freqs.is_empty() {
            Node::leaf_metric(num, self.frequency, self.mean, self.error)
        } else {
            Node::leaf_nominal(num, self.freqs)
        }
    }
}

/// Grow a decision or regression tree for `target` over the tuple slice.
///
/// The tuple slice is reordered in place; execution weights are reset on
/// entry and on exit.
pub fn grow(
    attrs: &AttributeSet,
    tuples: &mut [Tuple],
    target: usize,
    options: &GrowOptions,
) -> Result<DecisionTree, ArborError> {
    options.validate()?;
    let kind = attrs.target_kind(target)?;
    for t in tuples.iter_mut() {
        t.reset_xweight();
    }
    let splitter = Splitter::new(
        attrs,
        target,
        kind,
        options.measure,
        options.params,
        options.strategy,
        options.min_count,
    );
    let mut ctx = GrowContext {
        attrs,
        target,
        kind,
        options,
        splitter,
        used: vec![false; attrs.len()],
        nodes: HashMap::new(),
        next_num: 0,
    };
    let grown = grow_node(&mut ctx, tuples, options.max_height);
    let mut tree = DecisionTree::new(target, kind);
    tree.nodes = ctx.nodes;
    tree.root = grown.num;
    tree.next_num = ctx.next_num;
    tree.refresh_height();
    for t in tuples.iter_mut() {
        t.reset_xweight();
    }
    info!("grown tree: {} nodes, height {}", tree.size(), tree.height);
    Ok(tree)
}

struct GrowContext<'a> {
    attrs: &'a AttributeSet,
    target: usize,
    kind: TargetKind,
    options: &'a GrowOptions,
    splitter: Splitter,
    used: Vec<bool>,
    nodes: HashMap<usize, Node>,
    next_num: usize,
}

impl GrowContext<'_> {
    fn alloc(&mut self) -> usize {
        let num = self.next_num;
        self.next_num += 1;
        num
    }
}

#[derive(Clone, Copy)]
struct Grown {
    num: usize,
    /// Error of the whole grown subtree.
    error: f64,
}

fn remove_subtree(nodes: &mut HashMap<usize, Node>, num: usize) {
    if let Some(node) = nodes.remove(&num) {
        for slot in &node.slots {
            if let Slot::Owned(child) = slot {
                remove_subtree(nodes, *child);
            }
        }
    }
}

fn grow_node(ctx: &mut GrowContext, tuples: &mut [Tuple], height: usize) -> Grown {
    let num = ctx.alloc();
    let leaf = leaf_stats(ctx.kind, ctx.target, tuples).into_leaf(num);

    if leaf.frequency < 2.0 * ctx.options.min_count
        || leaf.error <= MIN_LEAF_ERROR
        || height == 0
    {
        let error = leaf.error;
        ctx.nodes.insert(num, leaf);
        return Grown { num, error };
    }

    // best attribute, strictly-greater comparison so the first maximum wins
    let mut best_worth = WORTHLESS;
    let mut best_attr = None;
    let mut best_cut = None;
    for a in 0..ctx.attrs.len() {
        if a == ctx.target || ctx.used[a] {
            continue;
        }
        let attr = ctx.attrs.get(a);
        if attr.is_nominal() && attr.value_count() < 2 {
            continue;
        }
        let worth = ctx.splitter.evaluate(ctx.attrs, tuples, a);
        debug!("node {}: attribute {} worth {}", num, a, worth);
        if worth > best_worth {
            best_worth = worth;
            best_attr = Some(a);
            best_cut = ctx.splitter.current_cut();
            ctx.splitter.keep_current();
        }
    }
    let splittable = best_attr.is_some() && best_worth >= ctx.options.min_worth;
    let Some(attr) = best_attr.filter(|_| splittable) else {
        let error = leaf.error;
        ctx.nodes.insert(num, leaf);
        return Grown { num, error };
    };

    let is_nominal = ctx.attrs.get(attr).is_nominal();
    let values = if is_nominal {
        ctx.attrs.get(attr).value_count()
    } else {
        2
    };
    // copy the branch layout out of the splitter before the recursion
    // reuses its scratch tables
    let plan = ctx.splitter.branch_plan(values);
    let cut = best_cut;

    if is_nominal {
        ctx.used[attr] = true;
    }
    let mut children: Vec<Option<Grown>> = vec![None; values];
    {
        let branch_of = |t: &Tuple| -> Option<usize> {
            match cut {
                Some(c) => t.value(attr).metric().map(|v| if v <= c { 0 } else { 1 }),
                None => t.value(attr).nominal().map(|v| plan.dests[v]),
            }
        };
        group_branches(tuples, &branch_of, values, |b, window| {
            if window.is_empty() {
                return;
            }
            children[b] = Some(grow_node(ctx, window, height - 1));
        });
    }
    if is_nominal {
        ctx.used[attr] = false;
    }

    if children.iter().all(Option::is_none) {
        let error = leaf.error;
        ctx.nodes.insert(num, leaf);
        return Grown { num, error };
    }

    let subtree_error: f64 = children.iter().flatten().map(|g| g.error).sum();
    if ctx.options.trivial_prune && leaf.error <= subtree_error * (1.0 + ERROR_EPSILON) {
        for g in children.iter().flatten() {
            remove_subtree(&mut ctx.nodes, g.num);
        }
        let error = leaf.error;
        ctx.nodes.insert(num, leaf);
        return Grown { num, error };
    }

    let mut slots = Vec::with_capacity(values);
    let mut known = 0.0;
    for v in 0..values {
        let slot = if plan.dests[v] != v {
            match children[plan.dests[v]] {
                Some(_) => Slot::Linked(plan.dests[v]),
                None => Slot::Empty,
            }
        } else {
            match children[v] {
                Some(g) => {
                    known += ctx.nodes[&g.num].frequency;
                    Slot::Owned(g.num)
                }
                None => Slot::Empty,
            }
        };
        slots.push(slot);
    }

    let mut node = leaf;
    node.split_attribute = Some(attr);
    node.cut = cut;
    node.slots = slots;
    node.known = known;
    debug!(
        "node {}: split on attribute {} (worth {})",
        num, attr, best_worth
    );
    ctx.nodes.insert(num, node);
    Grown {
        num,
        error: subtree_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, Value};
    use crate::node::Slot;

    fn t(values: Vec<Value>, w: f64) -> Tuple {
        Tuple::new(values, w)
    }

    fn two_class_attrs() -> AttributeSet {
        AttributeSet::new(vec![
            Attribute::nominal("a", 2),
            Attribute::nominal("b", 2),
            Attribute::nominal("class", 2),
        ])
    }

    /// Attribute a matches the class exactly; attribute b is noise.
    fn separable_tuples() -> Vec<Tuple> {
        vec![
            t(vec![Value::Nominal(0), Value::Nominal(0), Value::Nominal(0)], 1.0),
            t(vec![Value::Nominal(0), Value::Nominal(1), Value::Nominal(0)], 1.0),
            t(vec![Value::Nominal(1), Value::Nominal(0), Value::Nominal(1)], 1.0),
            t(vec![Value::Nominal(1), Value::Nominal(1), Value::Nominal(1)], 1.0),
        ]
    }

    #[test]
    fn perfectly_separable_data_grows_one_test() {
        let attrs = two_class_attrs();
        let mut tuples = separable_tuples();
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_min_count(1.0)
            .set_min_worth(0.0);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        assert_eq!(tree.height, 1);
        assert_eq!(tree.size(), 3);
        let root = tree.node(tree.root);
        assert_eq!(root.split_attribute, Some(0));
        // both leaves are pure
        for child in root.owned_children() {
            assert_eq!(tree.node(child).error, 0.0);
        }
    }

    #[test]
    fn zero_height_budget_returns_majority_leaf() {
        let attrs = two_class_attrs();
        let mut tuples = separable_tuples();
        tuples.push(t(
            vec![Value::Nominal(0), Value::Nominal(0), Value::Nominal(0)],
            1.0,
        ));
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_max_height(0);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        assert_eq!(tree.size(), 1);
        let root = tree.node(tree.root);
        assert!(root.is_leaf());
        assert_eq!(root.majority(), Some(0));
        assert_eq!(root.frequency, 5.0);
    }

    #[test]
    fn constant_metric_target_stays_a_leaf() {
        let attrs = AttributeSet::new(vec![
            Attribute::nominal("g", 2),
            Attribute::float("y"),
        ]);
        let mut tuples = vec![
            t(vec![Value::Nominal(0), Value::Float(2.0)], 1.0),
            t(vec![Value::Nominal(1), Value::Float(2.0)], 1.0),
            t(vec![Value::Nominal(0), Value::Float(2.0)], 1.0),
            t(vec![Value::Nominal(1), Value::Float(2.0)], 1.0),
        ];
        let opts = GrowOptions::default()
            .set_measure(Measure::SseReduction)
            .set_min_count(1.0);
        let tree = grow(&attrs, &mut tuples, 1, &opts).unwrap();
        assert_eq!(tree.size(), 1);
        let root = tree.node(tree.root);
        assert_eq!(root.error, 0.0);
        assert_eq!(root.mean, 2.0);
    }

    #[test]
    fn metric_target_splits_on_a_cut() {
        let attrs = AttributeSet::new(vec![
            Attribute::float("x"),
            Attribute::float("y"),
        ]);
        let mut tuples = vec![
            t(vec![Value::Float(1.0), Value::Float(1.0)], 1.0),
            t(vec![Value::Float(2.0), Value::Float(1.0)], 1.0),
            t(vec![Value::Float(3.0), Value::Float(5.0)], 1.0),
            t(vec![Value::Float(4.0), Value::Float(5.0)], 1.0),
        ];
        let opts = GrowOptions::default()
            .set_measure(Measure::SseReduction)
            .set_min_count(1.0);
        let tree = grow(&attrs, &mut tuples, 1, &opts).unwrap();
        let root = tree.node(tree.root);
        assert_eq!(root.split_attribute, Some(0));
        let cut = root.cut.unwrap();
        assert!(cut > 2.0 && cut < 3.0);
        for child in root.owned_children() {
            assert_eq!(tree.node(child).error, 0.0);
        }
    }

    #[test]
    fn inapplicable_measure_yields_a_root_leaf() {
        let attrs = two_class_attrs();
        let mut tuples = separable_tuples();
        // a metric measure on a nominal target normalizes to None
        let opts = GrowOptions::default()
            .set_measure(Measure::SseReduction)
            .set_min_count(1.0);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn high_min_worth_blocks_splitting() {
        let attrs = two_class_attrs();
        let mut tuples = separable_tuples();
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_min_count(1.0)
            .set_min_worth(10.0);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn trivial_pruning_removes_useless_splits() {
        let attrs = two_class_attrs();
        // every (a, b) cell is an even class mix, so no split can help
        let mut tuples = Vec::new();
        for a in 0..2 {
            for b in 0..2 {
                for class in 0..2 {
                    tuples.push(t(
                        vec![Value::Nominal(a), Value::Nominal(b), Value::Nominal(class)],
                        1.0,
                    ));
                }
            }
        }
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_min_count(1.0);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn unknown_values_are_redistributed() {
        let attrs = two_class_attrs();
        let mut tuples = separable_tuples();
        tuples.push(t(vec![Value::Null, Value::Nominal(0), Value::Nominal(0)], 1.0));
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_min_count(1.0);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        let root = tree.node(tree.root);
        if !root.is_leaf() {
            // conservation: children's frequencies sum to the root's
            let sum: f64 = root.owned_children().map(|c| tree.node(c).frequency).sum();
            assert!((sum - root.frequency).abs() < 1e-9);
        }
        // execution weights are restored after growing
        assert!(tuples.iter().all(|tp| tp.xweight == tp.weight));
    }

    #[test]
    fn conservation_holds_throughout_the_tree() {
        let attrs = AttributeSet::new(vec![
            Attribute::nominal("a", 2),
            Attribute::nominal("b", 3),
            Attribute::nominal("class", 2),
        ]);
        let mut tuples = Vec::new();
        for i in 0..24 {
            let a = i % 2;
            let b = (i / 2) % 3;
            let class = if a == 0 && b != 1 { 0 } else { 1 };
            tuples.push(t(
                vec![Value::Nominal(a), Value::Nominal(b), Value::Nominal(class)],
                1.0,
            ));
        }
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_min_count(1.0)
            .set_trivial_prune(false);
        let tree = grow(&attrs, &mut tuples, 2, &opts).unwrap();
        for node in tree.nodes.values() {
            if node.is_leaf() {
                let sum: f64 = node.freqs.iter().sum();
                assert!((sum - node.frequency).abs() < 1e-9);
            } else {
                let sum: f64 = node.owned_children().map(|c| tree.node(c).frequency).sum();
                assert!((sum - node.frequency).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn subset_merging_produces_linked_slots() {
        let attrs = AttributeSet::new(vec![
            Attribute::nominal("a", 4),
            Attribute::nominal("class", 2),
        ]);
        let mut tuples = vec![
            t(vec![Value::Nominal(0), Value::Nominal(0)], 2.0),
            t(vec![Value::Nominal(1), Value::Nominal(0)], 2.0),
            t(vec![Value::Nominal(2), Value::Nominal(1)], 2.0),
            t(vec![Value::Nominal(3), Value::Nominal(1)], 2.0),
        ];
        let opts = GrowOptions::default()
            .set_measure(Measure::InfoGain)
            .set_strategy(SplitStrategy::SubsetMerge { binary: false })
            .set_min_count(1.0);
        let tree = grow(&attrs, &mut tuples, 1, &opts).unwrap();
        let root = tree.node(tree.root);
        assert_eq!(root.split_attribute, Some(0));
        assert_eq!(root.slots.len(), 4);
        let linked = root
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Linked(_)))
            .count();
        assert_eq!(linked, 2);
        // links resolve to owned subtrees
        assert!(root.resolve(1).is_some());
        assert!(root.resolve(3).is_some());
        assert_eq!(tree.size(), 3);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let attrs = two_class_attrs();
        let mut tuples = separable_tuples();
        let opts = GrowOptions::default().set_min_count(-1.0);
        assert!(grow(&attrs, &mut tuples, 2, &opts).is_err());
        let opts = GrowOptions::default();
        assert!(grow(&attrs, &mut tuples, 9, &opts).is_err());
    }
}
