pub mod bisection;
pub mod condition;
pub mod pagination;

pub use bisection::{BisectionExtractor, BisectionSettings, ProgressSink};
pub use condition::{Condition, DialectOracle, Inference};
pub use pagination::{pool_size, row_indices, run_pool};
