pub mod config;
pub mod dtype;
pub mod numeric_tensor;
pub mod random_graph;
pub mod rewrite;
pub mod value_type;

pub use config::{ConfigError, RewriteConfig};
pub use random_graph::{GraphError, NodeId, RandomGraph, ValueId};
pub use rewrite::{EquilibriumReport, EquilibriumRewriter, LiftRewrite, RewriteError};
