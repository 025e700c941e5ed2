use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::models::{OracleVerdict, Technique};
use crate::oracle::Oracle;

/// A question the extractor asks, independent of SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    LengthGreaterThan { expression: String, threshold: u64 },
    ValueGreaterThan { expression: String, threshold: u64 },
    CharGreaterThan { expression: String, position: usize, ordinal: u32 },
    CharEquals { expression: String, position: usize, ordinal: u32 },
}

impl Condition {
    pub fn render(&self, dialect: &Dialect) -> String {
        match self {
            Condition::LengthGreaterThan { expression, threshold } => {
                format!("{}>{}", dialect.length(expression), threshold)
            }
            Condition::ValueGreaterThan { expression, threshold } => format!("({})>{}", expression, threshold),
            Condition::CharGreaterThan { expression, position, ordinal } => {
                format!("{}>{}", dialect.char_ordinal(expression, *position), ordinal)
            }
            Condition::CharEquals { expression, position, ordinal } => {
                format!("{}={}", dialect.char_ordinal(expression, *position), ordinal)
            }
        }
    }
}

/// Answers extractor conditions. One instance per worker.
#[async_trait]
pub trait Inference: Send {
    async fn infer(&mut self, condition: &Condition) -> OracleVerdict;

    fn technique(&self) -> Technique;
}

/// Renders conditions for a backend and asks a confirmed oracle.
pub struct DialectOracle {
    oracle: Box<dyn Oracle>,
    dialect: Dialect,
}

impl DialectOracle {
    pub fn new(oracle: Box<dyn Oracle>, dialect: Dialect) -> Self {
        Self { oracle, dialect }
    }
}

#[async_trait]
impl Inference for DialectOracle {
    async fn infer(&mut self, condition: &Condition) -> OracleVerdict {
        let predicate = condition.render(&self.dialect);
        self.oracle.ask(&predicate).await
    }

    fn technique(&self) -> Technique {
        self.oracle.technique()
    }
}
