//! Data model
//!
//! Typed instance values, weighted tuples and attribute metadata. Table
//! storage and parsing belong to the caller; the induction core only reads
//! values and weights through these types.
use crate::errors::ArborError;
use serde::{Deserialize, Serialize};

/// A single typed instance value.
///
/// `Null` is the distinguished unknown sentinel for every type; a `Float`
/// holding NaN is treated as unknown as well.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Nominal(usize),
    Int(i64),
    Float(f64),
}

impl Value {
    #[inline]
    pub fn is_unknown(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// The nominal value index, if known and nominal.
    #[inline]
    pub fn nominal(&self) -> Option<usize> {
        match self {
            Value::Nominal(v) => Some(*v),
            _ => None,
        }
    }

    /// The value widened to f64, if known and metric.
    #[inline]
    pub fn metric(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }
}

/// A weighted tuple of instance values.
///
/// `weight` is the base case weight. `xweight` is the execution weight that
/// growing and pruning rescale to redistribute the mass of tuples with an
/// unknown test value; outside an induction call the two are equal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tuple {
    pub values: Vec<Value>,
    pub weight: f64,
    pub xweight: f64,
}

impl Tuple {
    pub fn new(values: Vec<Value>, weight: f64) -> Self {
        Tuple {
            values,
            weight,
            xweight: weight,
        }
    }

    #[inline]
    pub fn value(&self, column: usize) -> Value {
        self.values[column]
    }

    pub fn reset_xweight(&mut self) {
        self.xweight = self.weight;
    }
}

/// The kind of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeKind {
    /// Nominal attribute with a fixed number of values.
    Nominal { values: usize },
    Integer,
    Float,
}

/// Attribute metadata: a name and a kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn nominal(name: &str, values: usize) -> Self {
        Attribute {
            name: name.to_string(),
            kind: AttributeKind::Nominal { values },
        }
    }

    pub fn integer(name: &str) -> Self {
        Attribute {
            name: name.to_string(),
            kind: AttributeKind::Integer,
        }
    }

    pub fn float(name: &str) -> Self {
        Attribute {
            name: name.to_string(),
            kind: AttributeKind::Float,
        }
    }

    #[inline]
    pub fn is_nominal(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal { .. })
    }

    #[inline]
    pub fn is_metric(&self) -> bool {
        !self.is_nominal()
    }

    /// Number of nominal values; 0 for metric attributes.
    #[inline]
    pub fn value_count(&self) -> usize {
        match self.kind {
            AttributeKind::Nominal { values } => values,
            _ => 0,
        }
    }
}

/// The attribute-domain collaborator: an ordered set of attribute
/// descriptions matching the column order of every tuple.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeSet {
    attrs: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new(attrs: Vec<Attribute>) -> Self {
        AttributeSet { attrs }
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Attribute {
        &self.attrs[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attrs.iter()
    }

    /// Largest nominal cardinality over all attributes; statistics tables
    /// are sized once from this value.
    pub fn max_cardinality(&self) -> usize {
        self.attrs.iter().map(|a| a.value_count()).max().unwrap_or(0)
    }

    /// Classify the target column, rejecting out-of-range columns and
    /// nominal targets without at least two classes.
    pub fn target_kind(&self, target: usize) -> Result<TargetKind, ArborError> {
        let attr = self
            .attrs
            .get(target)
            .ok_or(ArborError::InvalidTarget(target))?;
        match attr.kind {
            AttributeKind::Nominal { values } if values >= 2 => Ok(TargetKind::Classes(values)),
            AttributeKind::Nominal { .. } => Err(ArborError::InvalidTarget(target)),
            _ => Ok(TargetKind::Metric),
        }
    }
}

/// Whether a tree predicts a nominal class or a metric value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetKind {
    Classes(usize),
    Metric,
}

impl TargetKind {
    #[inline]
    pub fn is_metric(&self) -> bool {
        matches!(self, TargetKind::Metric)
    }

    /// Number of classes; 0 marks a metric target.
    #[inline]
    pub fn class_count(&self) -> usize {
        match self {
            TargetKind::Classes(n) => *n,
            TargetKind::Metric => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_values() {
        assert!(Value::Null.is_unknown());
        assert!(Value::Float(f64::NAN).is_unknown());
        assert!(!Value::Float(0.0).is_unknown());
        assert!(!Value::Nominal(0).is_unknown());
        assert!(!Value::Int(-1).is_unknown());
    }

    #[test]
    fn metric_widening() {
        assert_eq!(Value::Int(3).metric(), Some(3.0));
        assert_eq!(Value::Float(2.5).metric(), Some(2.5));
        assert_eq!(Value::Nominal(1).metric(), None);
        assert_eq!(Value::Null.metric(), None);
    }

    #[test]
    fn target_kinds() {
        let attrs = AttributeSet::new(vec![
            Attribute::nominal("color", 3),
            Attribute::float("length"),
            Attribute::nominal("flag", 1),
        ]);
        assert_eq!(attrs.target_kind(0).unwrap(), TargetKind::Classes(3));
        assert_eq!(attrs.target_kind(1).unwrap(), TargetKind::Metric);
        assert!(attrs.target_kind(2).is_err());
        assert!(attrs.target_kind(9).is_err());
        assert_eq!(attrs.max_cardinality(), 3);
    }

    #[test]
    fn tuple_xweight() {
        let mut t = Tuple::new(vec![Value::Nominal(0)], 2.0);
        assert_eq!(t.xweight, 2.0);
        t.xweight = 0.5;
        t.reset_xweight();
        assert_eq!(t.xweight, 2.0);
    }
}
