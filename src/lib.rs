//! Confirms blind, error and time-based SQL injection in HTTP parameters and
//! extracts data through it, one yes/no question at a time.

pub mod cli;
pub mod config;
pub mod confirmation;
pub mod dialect;
pub mod errors;
pub mod extractor;
pub mod http;
pub mod models;
pub mod oracle;
pub mod payloads;
pub mod pipeline;
pub mod probe;
pub mod session;
pub mod utils;

pub use errors::BlindsightError;
pub use pipeline::Orchestrator;
