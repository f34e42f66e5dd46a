pub mod predict;
pub mod tree;

pub use predict::Prediction;
pub use tree::{DecisionTree, TreeCursor};
