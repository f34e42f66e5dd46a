/// Relative slack used when comparing a leaf error against a subtree error.
pub const ERROR_EPSILON: f64 = 1e-6;
/// Leaf errors at or below this floor stop further splitting.
pub const MIN_LEAF_ERROR: f64 = 1e-10;
/// Probabilities are clamped away from 0 and 1 before odds ratios.
pub const PROB_CLAMP: f64 = 1e-12;
pub const DEFAULT_MIN_COUNT: f64 = 2.0;
pub const DEFAULT_MAX_HEIGHT: usize = 64;
pub const DEFAULT_PRIOR: f64 = 0.5;
pub const DEFAULT_PESSIMISTIC_INCREMENT: f64 = 0.5;
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.25;
