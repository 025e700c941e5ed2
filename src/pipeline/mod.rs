pub mod decision;
pub mod events;
pub mod extraction;
pub mod orchestrator;

pub use decision::{BatchDecider, Decider, Question};
pub use events::EngineEvent;
pub use extraction::{Fetched, TableDump, TargetExtraction};
pub use orchestrator::Orchestrator;
