pub mod extraction;
pub mod report;
pub mod vector;
pub mod verdict;

pub use extraction::{Charset, ExtractionResult, ExtractionTarget, Window};
pub use report::{BaselineSummary, InjectionReport};
pub use vector::{Comparison, Technique, TechniqueSet, Vector, VectorSet};
pub use verdict::{OracleVerdict, Outcome};
