//! Scoring measures
//!
//! Pure functions mapping a finalized statistics table to a scalar split
//! worth; larger is better. Every measure is evaluable from the table's
//! current cells and marginals alone, so merge/unmerge plus marginalize is
//! the only cost of exploring alternative partitions.
use crate::constants::{DEFAULT_PRIOR, PROB_CLAMP};
use crate::data::TargetKind;
use crate::errors::ArborError;
use crate::frequency::FrequencyTable;
use crate::utils::{items_to_strings, ln_gamma};
use crate::variance::VarianceTable;
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;
use std::fmt;
use std::str::FromStr;

/// Worth signalling "do not split here".
pub const WORTHLESS: f64 = f64::NEG_INFINITY;

/// Numeric parameters shared by all measures.
///
/// With `weighted` set, the worth is scaled by known/total weight so that
/// attributes with many missing values are not unfairly rewarded. `prior`
/// is the per-cell Dirichlet prior of the Bayesian measure.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MeasureParams {
    pub weighted: bool,
    pub prior: f64,
}

impl Default for MeasureParams {
    fn default() -> Self {
        MeasureParams {
            weighted: false,
            prior: DEFAULT_PRIOR,
        }
    }
}

/// Split evaluation measure selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measure {
    None,
    InfoGain,
    InfoGainRatio,
    SymInfoGainRatio,
    GiniGain,
    GiniGainRatio,
    ChiSquare,
    NormChiSquare,
    WeightOfEvidence,
    Relevance,
    BayesianDirichlet,
    ReductionOfDescriptionLength,
    SpecificityGain,
    SseReduction,
    MseReduction,
    RmseReduction,
    VarianceReduction,
    StdevReduction,
}

const MEASURE_NAMES: [(&str, Measure); 18] = [
    ("None", Measure::None),
    ("InfoGain", Measure::InfoGain),
    ("InfoGainRatio", Measure::InfoGainRatio),
    ("SymInfoGainRatio", Measure::SymInfoGainRatio),
    ("GiniGain", Measure::GiniGain),
    ("GiniGainRatio", Measure::GiniGainRatio),
    ("ChiSquare", Measure::ChiSquare),
    ("NormChiSquare", Measure::NormChiSquare),
    ("WeightOfEvidence", Measure::WeightOfEvidence),
    ("Relevance", Measure::Relevance),
    ("BayesianDirichlet", Measure::BayesianDirichlet),
    ("ReductionOfDescriptionLength", Measure::ReductionOfDescriptionLength),
    ("SpecificityGain", Measure::SpecificityGain),
    ("SseReduction", Measure::SseReduction),
    ("MseReduction", Measure::MseReduction),
    ("RmseReduction", Measure::RmseReduction),
    ("VarianceReduction", Measure::VarianceReduction),
    ("StdevReduction", Measure::StdevReduction),
];

impl FromStr for Measure {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MEASURE_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, m)| *m)
            .ok_or_else(|| {
                let names: Vec<&str> = MEASURE_NAMES.iter().map(|(n, _)| *n).collect();
                ArborError::ParseString(
                    s.to_string(),
                    "Measure".to_string(),
                    items_to_strings(&names),
                )
            })
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = MEASURE_NAMES
            .iter()
            .find(|(_, m)| m == self)
            .map(|(n, _)| *n)
            .unwrap_or("None");
        write!(f, "{}", name)
    }
}

impl Measure {
    pub fn for_nominal_target(&self) -> bool {
        !matches!(
            self,
            Measure::SseReduction
                | Measure::MseReduction
                | Measure::RmseReduction
                | Measure::VarianceReduction
                | Measure::StdevReduction
        )
    }

    pub fn for_metric_target(&self) -> bool {
        matches!(
            self,
            Measure::None
                | Measure::SseReduction
                | Measure::MseReduction
                | Measure::RmseReduction
                | Measure::VarianceReduction
                | Measure::StdevReduction
        )
    }

    /// Normalize an inapplicable selector to `None` for the given target;
    /// a policy decision, not an error. Growing with `None` yields a
    /// single root leaf.
    pub fn normalized_for(&self, kind: TargetKind) -> Measure {
        let ok = match kind {
            TargetKind::Classes(_) => self.for_nominal_target(),
            TargetKind::Metric => self.for_metric_target(),
        };
        if ok {
            *self
        } else {
            Measure::None
        }
    }

    /// Worth of the partition described by a marginalized frequency table.
    pub fn evaluate_frequency(&self, t: &FrequencyTable, params: &MeasureParams) -> f64 {
        if matches!(self, Measure::None) || !self.for_nominal_target() {
            return WORTHLESS;
        }
        if t.supported_columns() < 2 {
            return WORTHLESS;
        }
        let n = t.known();
        if n <= 0.0 {
            return 0.0;
        }
        let worth = match self {
            Measure::InfoGain => info_gain(t),
            Measure::InfoGainRatio => info_gain_ratio(t),
            Measure::SymInfoGainRatio => sym_info_gain_ratio(t),
            Measure::GiniGain => gini_gain(t),
            Measure::GiniGainRatio => gini_gain_ratio(t),
            Measure::ChiSquare => chi_square(t),
            Measure::NormChiSquare => chi_square(t) / n,
            Measure::WeightOfEvidence => weight_of_evidence(t),
            Measure::Relevance => relevance(t),
            Measure::BayesianDirichlet => bayesian_dirichlet(t, params.prior),
            Measure::ReductionOfDescriptionLength => description_length_reduction(t),
            Measure::SpecificityGain => specificity_gain(t),
            _ => unreachable!("nominal-target measure"),
        };
        if worth == WORTHLESS {
            return worth;
        }
        if params.weighted && t.total() > 0.0 {
            worth * n / t.total()
        } else {
            worth
        }
    }

    /// Worth of the partition described by a marginalized variance table.
    pub fn evaluate_variance(&self, t: &VarianceTable, params: &MeasureParams) -> f64 {
        if matches!(self, Measure::None) || !self.for_metric_target() {
            return WORTHLESS;
        }
        if t.supported_columns() < 2 {
            return WORTHLESS;
        }
        let n = t.known();
        if n <= 0.0 {
            return 0.0;
        }
        let (cnt, sum, sqr) = t.aggregate();
        let sse_root = (sqr - sum * sum / cnt).max(0.0);
        let cols: Vec<usize> = var_columns(t).collect();
        let worth = match self {
            Measure::SseReduction => {
                sse_root - cols.iter().map(|&x| t.sse(Some(x))).sum::<f64>()
            }
            Measure::MseReduction => {
                (sse_root - cols.iter().map(|&x| t.sse(Some(x))).sum::<f64>()) / n
            }
            Measure::RmseReduction => {
                let split: f64 = cols
                    .iter()
                    .map(|&x| {
                        let nx = t.count(Some(x));
                        nx / n * (t.sse(Some(x)) / nx).sqrt()
                    })
                    .sum();
                (sse_root / n).sqrt() - split
            }
            Measure::VarianceReduction => {
                let root = if n > 1.0 { sse_root / (n - 1.0) } else { 0.0 };
                root - cols.iter().map(|&x| t.count(Some(x)) / n * variance(t, x)).sum::<f64>()
            }
            Measure::StdevReduction => {
                let root = if n > 1.0 {
                    (sse_root / (n - 1.0)).sqrt()
                } else {
                    0.0
                };
                root - cols
                    .iter()
                    .map(|&x| t.count(Some(x)) / n * variance(t, x).sqrt())
                    .sum::<f64>()
            }
            _ => unreachable!("metric-target measure"),
        };
        if params.weighted && t.total() > 0.0 {
            worth * n / t.total()
        } else {
            worth
        }
    }
}

/// Canonical columns carrying weight.
fn columns(t: &FrequencyTable) -> impl Iterator<Item = usize> + '_ {
    (0..t.columns()).filter(move |&x| t.is_canonical(x) && t.column_total(Some(x)) > 0.0)
}

fn var_columns(t: &VarianceTable) -> impl Iterator<Item = usize> + '_ {
    (0..t.columns()).filter(move |&x| t.is_canonical(x) && t.count(Some(x)) > 0.0)
}

fn variance(t: &VarianceTable, x: usize) -> f64 {
    let nx = t.count(Some(x));
    if nx > 1.0 {
        t.sse(Some(x)) / (nx - 1.0)
    } else {
        0.0
    }
}

#[inline]
fn h(p: f64) -> f64 {
    if p > 0.0 {
        -p * p.log2()
    } else {
        0.0
    }
}

fn class_entropy(t: &FrequencyTable) -> f64 {
    let n = t.known();
    (0..t.rows()).map(|y| h(t.row_total(Some(y)) / n)).sum()
}

fn column_entropy(t: &FrequencyTable) -> f64 {
    let n = t.known();
    columns(t).map(|x| h(t.column_total(Some(x)) / n)).sum()
}

fn info_gain(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let mut hyx = 0.0;
    for x in columns(t) {
        let nx = t.column_total(Some(x));
        let hcol: f64 = (0..t.rows())
            .map(|y| h(t.frequency(Some(x), Some(y)) / nx))
            .sum();
        hyx += nx / n * hcol;
    }
    class_entropy(t) - hyx
}

fn info_gain_ratio(t: &FrequencyTable) -> f64 {
    let hx = column_entropy(t);
    if hx <= 0.0 {
        return WORTHLESS;
    }
    info_gain(t) / hx
}

fn sym_info_gain_ratio(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let mut hxy = 0.0;
    for x in columns(t) {
        for y in 0..t.rows() {
            hxy += h(t.frequency(Some(x), Some(y)) / n);
        }
    }
    if hxy <= 0.0 {
        return WORTHLESS;
    }
    info_gain(t) / hxy
}

fn gini(parts: impl Iterator<Item = f64>, n: f64) -> f64 {
    1.0 - parts.map(|f| (f / n) * (f / n)).sum::<f64>()
}

fn gini_gain(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let gy = gini((0..t.rows()).map(|y| t.row_total(Some(y))), n);
    let mut split = 0.0;
    for x in columns(t) {
        let nx = t.column_total(Some(x));
        let gx = gini((0..t.rows()).map(|y| t.frequency(Some(x), Some(y))), nx);
        split += nx / n * gx;
    }
    gy - split
}

fn gini_gain_ratio(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let gx = gini(columns(t).map(|x| t.column_total(Some(x))), n);
    if gx <= 0.0 {
        return WORTHLESS;
    }
    gini_gain(t) / gx
}

fn chi_square(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let mut chi2 = 0.0;
    for x in columns(t) {
        let nx = t.column_total(Some(x));
        for y in 0..t.rows() {
            let e = nx * t.row_total(Some(y)) / n;
            if e > 0.0 {
                let d = t.frequency(Some(x), Some(y)) - e;
                chi2 += d * d / e;
            }
        }
    }
    chi2
}

fn weight_of_evidence(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let mut wev = 0.0;
    for y in 0..t.rows() {
        let py = t.row_total(Some(y)) / n;
        if py <= 0.0 || py >= 1.0 {
            continue;
        }
        let odds_y = py / (1.0 - py);
        let mut s = 0.0;
        for x in columns(t) {
            let nx = t.column_total(Some(x));
            let pyx = (t.frequency(Some(x), Some(y)) / nx).clamp(PROB_CLAMP, 1.0 - PROB_CLAMP);
            let odds_yx = pyx / (1.0 - pyx);
            s += nx / n * (odds_yx / odds_y).log2().abs();
        }
        wev += py * s;
    }
    wev
}

fn relevance(t: &FrequencyTable) -> f64 {
    let n = t.known();
    let best_class = (0..t.rows())
        .map(|y| t.row_total(Some(y)))
        .fold(0.0, f64::max);
    let den = n - best_class;
    if den <= 0.0 {
        return 0.0;
    }
    let hits: f64 = columns(t)
        .map(|x| {
            (0..t.rows())
                .map(|y| t.frequency(Some(x), Some(y)))
                .fold(0.0, f64::max)
        })
        .sum();
    (hits - best_class) / den
}

fn bayesian_dirichlet(t: &FrequencyTable, prior: f64) -> f64 {
    let a = if prior > 0.0 { prior } else { DEFAULT_PRIOR };
    let r = t.rows() as f64;
    let ra = r * a;
    let family = |counts: &mut dyn Iterator<Item = f64>, m: f64| -> f64 {
        let mut s = ln_gamma(ra) - ln_gamma(ra + m);
        for c in counts {
            s += ln_gamma(a + c) - ln_gamma(a);
        }
        s
    };
    let mut split = 0.0;
    for x in columns(t) {
        let nx = t.column_total(Some(x));
        split += family(
            &mut (0..t.rows()).map(|y| t.frequency(Some(x), Some(y))),
            nx,
        );
    }
    let root = family(&mut (0..t.rows()).map(|y| t.row_total(Some(y))), t.known());
    (split - root) / LN_2
}

fn description_length_reduction(t: &FrequencyTable) -> f64 {
    let r = t.rows() as f64;
    // code length of a frequency vector: distribution plus assignment
    let dl = |counts: &mut dyn Iterator<Item = f64>, m: f64| -> f64 {
        let mut s = ln_gamma(m + r) - ln_gamma(r);
        for c in counts {
            s -= ln_gamma(c + 1.0);
        }
        s
    };
    let root = dl(&mut (0..t.rows()).map(|y| t.row_total(Some(y))), t.known());
    let mut split = 0.0;
    for x in columns(t) {
        let nx = t.column_total(Some(x));
        split += dl(&mut (0..t.rows()).map(|y| t.frequency(Some(x), Some(y))), nx);
    }
    (root - split) / LN_2
}

/// U-uncertainty of the possibility distribution obtained by
/// max-normalizing a frequency vector.
fn nonspecificity(mut v: Vec<f64>) -> f64 {
    v.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let max = v[0];
    if max <= 0.0 {
        return 0.0;
    }
    let mut u = 0.0;
    for (i, p) in v.iter().enumerate().skip(1) {
        u += p / max * (((i + 1) as f64) / (i as f64)).log2();
    }
    u
}

fn specificity_gain(t: &FrequencyTable) -> f64 {
    let ux = nonspecificity(columns(t).map(|x| t.column_total(Some(x))).collect());
    let uy = nonspecificity((0..t.rows()).map(|y| t.row_total(Some(y))).collect());
    let mut cells = Vec::new();
    for x in columns(t) {
        for y in 0..t.rows() {
            cells.push(t.frequency(Some(x), Some(y)));
        }
    }
    ux + uy - nonspecificity(cells)
}
