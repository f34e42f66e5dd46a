//! Tuple execution
//!
//! Classifying a tuple follows attribute tests from the root. An unknown
//! test value distributes the tuple over every owned branch, weighted by the
//! branch's share of the known mass, so the result can aggregate several
//! leaves.
use crate::data::{TargetKind, Tuple};
use crate::node::Node;
use crate::tree::tree::DecisionTree;

/// Result of executing a tuple against a tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Majority class for nominal targets.
    pub class: Option<usize>,
    /// Predicted mean for metric targets.
    pub value: f64,
    /// Weight of the leaf mass the tuple reached.
    pub support: f64,
    /// Per-class confidence, normalized to sum 1; empty for metric targets.
    pub confidence: Vec<f64>,
}

struct Accumulator {
    freqs: Vec<f64>,
    value_sum: f64,
    weight_sum: f64,
    support: f64,
}

impl DecisionTree {
    /// Execute a tuple, returning the prediction, its support and, for
    /// nominal targets, a per-class confidence vector.
    pub fn exec(&self, tuple: &Tuple, weight: f64) -> Prediction {
        let mut acc = Accumulator {
            freqs: vec![0.0; self.class_count()],
            value_sum: 0.0,
            weight_sum: 0.0,
            support: 0.0,
        };
        if !self.nodes.is_empty() {
            self.walk(self.root, tuple, weight, &mut acc);
        }
        match self.target_kind {
            TargetKind::Classes(_) => {
                let total: f64 = acc.freqs.iter().sum();
                let class = if total > 0.0 {
                    acc.freqs
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                        .map(|(i, _)| i)
                } else {
                    None
                };
                let confidence = if total > 0.0 {
                    acc.freqs.iter().map(|f| f / total).collect()
                } else {
                    acc.freqs.clone()
                };
                Prediction {
                    class,
                    value: class.map_or(f64::NAN, |c| c as f64),
                    support: acc.support,
                    confidence,
                }
            }
            TargetKind::Metric => Prediction {
                class: None,
                value: if acc.weight_sum > 0.0 {
                    acc.value_sum / acc.weight_sum
                } else {
                    f64::NAN
                },
                support: acc.support,
                confidence: Vec::new(),
            },
        }
    }

    fn deposit(&self, node: &Node, weight: f64, acc: &mut Accumulator) {
        acc.support += weight * node.frequency;
        match self.target_kind {
            TargetKind::Classes(_) => {
                if node.frequency > 0.0 {
                    for (a, f) in acc.freqs.iter_mut().zip(node.freqs.iter()) {
                        *a += weight * f / node.frequency;
                    }
                }
            }
            TargetKind::Metric => {
                if node.frequency > 0.0 {
                    acc.value_sum += weight * node.mean;
                    acc.weight_sum += weight;
                }
            }
        }
    }

    fn walk(&self, num: usize, tuple: &Tuple, weight: f64, acc: &mut Accumulator) {
        let node = self.node(num);
        if node.is_leaf() {
            self.deposit(node, weight, acc);
            return;
        }
        let attr = node.split_attribute.expect("test node has an attribute");
        let slot = match node.cut {
            Some(cut) => tuple
                .value(attr)
                .metric()
                .map(|v| if v <= cut { 0 } else { 1 }),
            None => tuple.value(attr).nominal(),
        };
        match slot {
            Some(s) => match node.resolve(s) {
                Some(child) => self.walk(child, tuple, weight, acc),
                // unsupported value: answer with the node's own statistics
                None => self.deposit(node, weight, acc),
            },
            None => {
                // unknown value: spread over the branches by known mass
                if node.known <= 0.0 {
                    self.deposit(node, weight, acc);
                    return;
                }
                for child in node.owned_children().collect::<Vec<_>>() {
                    let share = self.node(child).frequency / node.known;
                    self.walk(child, tuple, weight * share, acc);
                }
            }
        }
    }
}
