//! Split evaluation
//!
//! Per attribute and per target type, build a statistics table over the
//! tuple window and search for the best partition: direct multi-way, binary
//! one-vs-rest, greedy subset merging, or a cut threshold for metric
//! attributes. The splitter owns two scratch tables of each kind sized once
//! from the attribute set; keeping a winning candidate is a buffer swap,
//! never a copy.
use crate::data::{AttributeKind, AttributeSet, TargetKind, Tuple, Value};
use crate::frequency::FrequencyTable;
use crate::measure::{Measure, MeasureParams, WORTHLESS};
use crate::variance::VarianceTable;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::mem;

/// How nominal attributes are partitioned. Metric attributes always use a
/// cut threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// One branch per attribute value.
    Multiway,
    /// Best single value against the rest.
    Binary,
    /// Greedy merging of value subsets; with `binary` set, merging
    /// continues until exactly two subsets remain.
    SubsetMerge { binary: bool },
}

/// Branch layout extracted from a winning table before recursion, so the
/// scratch tables can be reused for the subtrees.
#[derive(Clone, Debug)]
pub struct BranchPlan {
    /// Canonical column per attribute value; `dests[v] != v` marks a value
    /// merged into another value's branch.
    pub dests: Vec<usize>,
    /// Whether the canonical column carries weight.
    pub supported: Vec<bool>,
    /// Weight with both the attribute and the target known.
    pub known: f64,
}

/// Common surface of the two statistics tables, so the partition-search
/// strategies are written once.
trait SplitTable {
    fn reset_columns(&mut self, columns: usize);
    fn add_obs(&mut self, col: Option<usize>, target: Value, weight: f64);
    fn shift_obs(&mut self, src: usize, dst: usize, target: Value, weight: f64);
    fn marginalize(&mut self);
    fn columns(&self) -> usize;
    fn is_canonical(&self, x: usize) -> bool;
    fn support(&self, x: usize) -> f64;
    fn combine(&mut self, src: usize, dst: usize);
    fn uncombine(&mut self, src: usize);
    /// A key identifying the single target this column is pure for, if any.
    fn pure_key(&self, x: usize) -> Option<u64>;
    fn evaluate(&self, measure: Measure, params: &MeasureParams) -> f64;
}

impl SplitTable for FrequencyTable {
    fn reset_columns(&mut self, columns: usize) {
        let rows = self.rows();
        self.reset(columns, rows);
    }

    fn add_obs(&mut self, col: Option<usize>, target: Value, weight: f64) {
        self.add(col, target.nominal(), weight);
    }

    fn shift_obs(&mut self, src: usize, dst: usize, target: Value, weight: f64) {
        self.shift(src, dst, target.nominal(), weight);
    }

    fn marginalize(&mut self) {
        FrequencyTable::marginalize(self);
    }

    fn columns(&self) -> usize {
        FrequencyTable::columns(self)
    }

    fn is_canonical(&self, x: usize) -> bool {
        FrequencyTable::is_canonical(self, x)
    }

    fn support(&self, x: usize) -> f64 {
        self.column_total(Some(x))
    }

    fn combine(&mut self, src: usize, dst: usize) {
        FrequencyTable::combine(self, src, dst);
    }

    fn uncombine(&mut self, src: usize) {
        FrequencyTable::uncombine(self, src);
    }

    fn pure_key(&self, x: usize) -> Option<u64> {
        if self.column_total(Some(x)) <= 0.0 {
            return None;
        }
        let mut class = None;
        for (y, f) in self.class_frequencies(x).iter().enumerate() {
            if *f > 0.0 {
                if class.is_some() {
                    return None;
                }
                class = Some(y as u64);
            }
        }
        class
    }

    fn evaluate(&self, measure: Measure, params: &MeasureParams) -> f64 {
        measure.evaluate_frequency(self, params)
    }
}

impl SplitTable for VarianceTable {
    fn reset_columns(&mut self, columns: usize) {
        self.reset(columns);
    }

    fn add_obs(&mut self, col: Option<usize>, target: Value, weight: f64) {
        if let Some(v) = target.metric() {
            self.add(col, v, weight);
        }
    }

    fn shift_obs(&mut self, src: usize, dst: usize, target: Value, weight: f64) {
        if let Some(v) = target.metric() {
            self.shift(src, dst, v, weight);
        }
    }

    fn marginalize(&mut self) {
        VarianceTable::marginalize(self);
    }

    fn columns(&self) -> usize {
        VarianceTable::columns(self)
    }

    fn is_canonical(&self, x: usize) -> bool {
        VarianceTable::is_canonical(self, x)
    }

    fn support(&self, x: usize) -> f64 {
        self.count(Some(x))
    }

    fn combine(&mut self, src: usize, dst: usize) {
        VarianceTable::combine(self, src, dst);
    }

    fn uncombine(&mut self, src: usize) {
        VarianceTable::uncombine(self, src);
    }

    fn pure_key(&self, x: usize) -> Option<u64> {
        if self.count(Some(x)) > 0.0 && self.sse(Some(x)) <= 1e-12 {
            Some(self.mean(Some(x)).to_bits())
        } else {
            None
        }
    }

    fn evaluate(&self, measure: Measure, params: &MeasureParams) -> f64 {
        measure.evaluate_variance(self, params)
    }
}

fn canonical_columns<T: SplitTable>(t: &T) -> Vec<usize> {
    (0..t.columns())
        .filter(|&x| t.is_canonical(x) && t.support(x) > 0.0)
        .collect()
}

fn fill_nominal<T: SplitTable>(t: &mut T, tuples: &[Tuple], attribute: usize, target: usize) {
    for tuple in tuples {
        if tuple.xweight <= 0.0 {
            continue;
        }
        t.add_obs(
            tuple.value(attribute).nominal(),
            tuple.value(target),
            tuple.xweight,
        );
    }
    t.marginalize();
}

/// Seed the cut search: all known mass on the high side, unknown mass in the
/// unknown slot, observations sorted by attribute value.
fn fill_cut_seed<T: SplitTable>(
    t: &mut T,
    obs: &mut Vec<(f64, Value, f64)>,
    tuples: &[Tuple],
    attribute: usize,
    target: usize,
) {
    obs.clear();
    for tuple in tuples {
        if tuple.xweight <= 0.0 {
            continue;
        }
        let tv = tuple.value(target);
        match tuple.value(attribute).metric() {
            Some(v) => {
                obs.push((v, tv, tuple.xweight));
                t.add_obs(Some(1), tv, tuple.xweight);
            }
            None => t.add_obs(None, tv, tuple.xweight),
        }
    }
    obs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    t.marginalize();
}

fn rebuild_with_cut<T: SplitTable>(
    t: &mut T,
    tuples: &[Tuple],
    attribute: usize,
    target: usize,
    cut: f64,
) {
    t.reset_columns(2);
    for tuple in tuples {
        if tuple.xweight <= 0.0 {
            continue;
        }
        let col = tuple
            .value(attribute)
            .metric()
            .map(|v| if v <= cut { 0 } else { 1 });
        t.add_obs(col, tuple.value(target), tuple.xweight);
    }
    t.marginalize();
}

/// Slide the boundary one observation at a time, scoring at every point
/// where the attribute value changes; the first strictly best cut wins.
fn eval_cut<T: SplitTable>(
    t: &mut T,
    obs: &[(f64, Value, f64)],
    measure: Measure,
    params: &MeasureParams,
    min_count: f64,
) -> (f64, Option<f64>) {
    let mut best = WORTHLESS;
    let mut cut = None;
    for i in 0..obs.len() {
        let (v, target, w) = obs[i];
        t.shift_obs(1, 0, target, w);
        if let Some(&(next_v, _, _)) = obs.get(i + 1) {
            if next_v > v && t.support(0) >= min_count && t.support(1) >= min_count {
                let worth = t.evaluate(measure, params);
                if worth > best {
                    best = worth;
                    cut = Some((v + next_v) / 2.0);
                }
            }
        }
    }
    (best, cut)
}

/// One-vs-rest: score every value against the merger of all others, then
/// leave the winning two-column merge applied.
fn eval_binary<T: SplitTable>(t: &mut T, measure: Measure, params: &MeasureParams) -> f64 {
    let cols = canonical_columns(t);
    if cols.len() < 2 {
        return WORTHLESS;
    }
    if cols.len() == 2 {
        return t.evaluate(measure, params);
    }
    let mut best = WORTHLESS;
    let mut best_v = cols[0];
    for &v in &cols {
        let rest: Vec<usize> = cols.iter().copied().filter(|&c| c != v).collect();
        for &w in &rest[1..] {
            t.combine(w, rest[0]);
        }
        let worth = t.evaluate(measure, params);
        for &w in rest[1..].iter().rev() {
            t.uncombine(w);
        }
        if worth > best {
            best = worth;
            best_v = v;
        }
    }
    let rest: Vec<usize> = cols.iter().copied().filter(|&c| c != best_v).collect();
    for &w in &rest[1..] {
        t.combine(w, rest[0]);
    }
    best
}

/// Greedy subset merging: pre-merge columns pure for the same target, then
/// repeatedly apply the best-scoring pair merge. Merging is voluntary while
/// it improves the worth, and forced while columns below `min_count`
/// remain (or until two columns remain when a binary result is required);
/// the largest column is exempt from forced merging while at least two
/// reasonable sets remain.
fn eval_subset<T: SplitTable>(
    t: &mut T,
    measure: Measure,
    params: &MeasureParams,
    min_count: f64,
    force_binary: bool,
) -> f64 {
    let mut pure_anchor: HashMap<u64, usize> = HashMap::new();
    for x in canonical_columns(t) {
        if let Some(key) = t.pure_key(x) {
            match pure_anchor.get(&key) {
                Some(&anchor) => t.combine(x, anchor),
                None => {
                    pure_anchor.insert(key, x);
                }
            }
        }
    }
    let mut worth = t.evaluate(measure, params);
    loop {
        let cols = canonical_columns(t);
        if cols.len() <= 2 {
            break;
        }
        let reasonable = cols.iter().filter(|&&x| t.support(x) >= min_count).count();
        let largest = cols
            .iter()
            .copied()
            .max_by(|&a, &b| {
                t.support(a)
                    .partial_cmp(&t.support(b))
                    .unwrap_or(Ordering::Equal)
            })
            .expect("at least three columns");
        let small_sets = cols.iter().any(|&x| t.support(x) < min_count);
        let forced = small_sets || force_binary;
        let exempt_largest = small_sets && !force_binary && reasonable >= 2;

        let mut pair_best = WORTHLESS;
        let mut pair: Option<(usize, usize)> = None;
        for i in 0..cols.len() {
            for j in (i + 1)..cols.len() {
                let (d, s) = (cols[i], cols[j]);
                if exempt_largest && (d == largest || s == largest) {
                    continue;
                }
                t.combine(s, d);
                let w = t.evaluate(measure, params);
                t.uncombine(s);
                if w > pair_best {
                    pair_best = w;
                    pair = Some((s, d));
                }
            }
        }
        let Some((s, d)) = pair else { break };
        if !forced && pair_best <= worth {
            break;
        }
        t.combine(s, d);
        worth = pair_best;
    }
    worth
}

fn eval_strategy<T: SplitTable>(
    t: &mut T,
    strategy: SplitStrategy,
    measure: Measure,
    params: &MeasureParams,
    min_count: f64,
) -> f64 {
    match strategy {
        SplitStrategy::Multiway => t.evaluate(measure, params),
        SplitStrategy::Binary => eval_binary(t, measure, params),
        SplitStrategy::SubsetMerge { binary } => {
            eval_subset(t, measure, params, min_count, binary)
        }
    }
}

/// Per-attribute split search with reusable scratch tables.
pub struct Splitter {
    pub measure: Measure,
    pub params: MeasureParams,
    pub strategy: SplitStrategy,
    pub min_count: f64,
    target: usize,
    kind: TargetKind,
    curr_freq: FrequencyTable,
    best_freq: FrequencyTable,
    curr_var: VarianceTable,
    best_var: VarianceTable,
    obs: Vec<(f64, Value, f64)>,
    cut: Option<f64>,
}

impl Splitter {
    pub fn new(
        attrs: &AttributeSet,
        target: usize,
        kind: TargetKind,
        measure: Measure,
        params: MeasureParams,
        strategy: SplitStrategy,
        min_count: f64,
    ) -> Self {
        let xcap = attrs.max_cardinality().max(2);
        let ycap = kind.class_count().max(1);
        Splitter {
            measure: measure.normalized_for(kind),
            params,
            strategy,
            min_count,
            target,
            kind,
            curr_freq: FrequencyTable::new(xcap, ycap),
            best_freq: FrequencyTable::new(xcap, ycap),
            curr_var: VarianceTable::new(xcap),
            best_var: VarianceTable::new(xcap),
            obs: Vec::new(),
            cut: None,
        }
    }

    /// Worth of the best partition on `attribute` over the tuple window.
    /// The candidate's table and cut stay available until the next call;
    /// `keep_current` preserves them across it.
    pub fn evaluate(&mut self, attrs: &AttributeSet, tuples: &[Tuple], attribute: usize) -> f64 {
        let (measure, params) = (self.measure, self.params);
        let (strategy, min_count, target) = (self.strategy, self.min_count, self.target);
        self.cut = None;
        match (attrs.get(attribute).kind, self.kind) {
            (AttributeKind::Nominal { values }, TargetKind::Classes(classes)) => {
                let t = &mut self.curr_freq;
                t.reset(values, classes);
                fill_nominal(t, tuples, attribute, target);
                eval_strategy(t, strategy, measure, &params, min_count)
            }
            (AttributeKind::Nominal { values }, TargetKind::Metric) => {
                let t = &mut self.curr_var;
                t.reset(values);
                fill_nominal(t, tuples, attribute, target);
                eval_strategy(t, strategy, measure, &params, min_count)
            }
            (_, TargetKind::Classes(classes)) => {
                let t = &mut self.curr_freq;
                let obs = &mut self.obs;
                t.reset(2, classes);
                fill_cut_seed(t, obs, tuples, attribute, target);
                let (worth, cut) = eval_cut(t, obs, measure, &params, min_count);
                if let Some(c) = cut {
                    rebuild_with_cut(t, tuples, attribute, target, c);
                }
                self.cut = cut;
                worth
            }
            (_, TargetKind::Metric) => {
                let t = &mut self.curr_var;
                let obs = &mut self.obs;
                t.reset(2);
                fill_cut_seed(t, obs, tuples, attribute, target);
                let (worth, cut) = eval_cut(t, obs, measure, &params, min_count);
                if let Some(c) = cut {
                    rebuild_with_cut(t, tuples, attribute, target, c);
                }
                self.cut = cut;
                worth
            }
        }
    }

    /// Keep the most recent candidate as the best one. A buffer exchange,
    /// not a copy.
    pub fn keep_current(&mut self) {
        mem::swap(&mut self.curr_freq, &mut self.best_freq);
        mem::swap(&mut self.curr_var, &mut self.best_var);
    }

    pub fn current_cut(&self) -> Option<f64> {
        self.cut
    }

    pub fn best_frequency(&self) -> &FrequencyTable {
        &self.best_freq
    }

    pub fn best_variance(&self) -> &VarianceTable {
        &self.best_var
    }

    /// Extract the branch layout of the kept best table for `values`
    /// attribute values (2 for a metric attribute).
    pub fn branch_plan(&self, values: usize) -> BranchPlan {
        let mut dests = Vec::with_capacity(values);
        let mut supported = Vec::with_capacity(values);
        let known;
        match self.kind {
            TargetKind::Classes(_) => {
                let t = &self.best_freq;
                for v in 0..values {
                    dests.push(t.destination(v));
                    supported.push(t.column_total(Some(v)) > 0.0);
                }
                known = t.known();
            }
            TargetKind::Metric => {
                let t = &self.best_var;
                for v in 0..values {
                    dests.push(t.destination(v));
                    supported.push(t.count(Some(v)) > 0.0);
                }
                known = t.known();
            }
        }
        BranchPlan {
            dests,
            supported,
            known,
        }
    }
}
