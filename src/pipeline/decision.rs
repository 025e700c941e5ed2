use crate::dialect::Backend;

/// A yes/no choice the engine would otherwise ask the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    /// A `*` marker was found in the request
    ProcessCustomMarker,
    ProcessJsonBody,
    ProcessMultipartBody,
    /// Skip payloads for other engines once a backend looks likely
    SkipOtherBackends { backend: Backend },
    /// Keep testing the remaining techniques after a confirmation
    ContinueOtherTechniques { parameter: String },
}

impl Question {
    pub fn default_answer(&self) -> bool {
        match self {
            Question::ProcessCustomMarker => true,
            Question::ProcessJsonBody => true,
            Question::ProcessMultipartBody => true,
            Question::SkipOtherBackends { .. } => true,
            Question::ContinueOtherTechniques { .. } => false,
        }
    }

    pub fn prompt(&self) -> String {
        match self {
            Question::ProcessCustomMarker => {
                "custom injection marker ('*') found in the request. Do you want to process it?".to_string()
            }
            Question::ProcessJsonBody => "JSON data found in POST body. Do you want to process it?".to_string(),
            Question::ProcessMultipartBody => {
                "Multipart-like data found in POST body. Do you want to process it?".to_string()
            }
            Question::SkipOtherBackends { backend } => format!(
                "it looks like the back-end DBMS is '{}'. Do you want to skip test payloads specific for other DBMSes?",
                backend
            ),
            Question::ContinueOtherTechniques { parameter } => format!(
                "parameter '{}' is vulnerable. Do you want to keep testing the other techniques?",
                parameter
            ),
        }
    }
}

/// Resolves questions without the engine touching interactive I/O.
pub trait Decider: Send + Sync {
    fn confirm(&self, question: &Question) -> bool;
}

/// Answers every question with its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchDecider;

impl Decider for BatchDecider {
    fn confirm(&self, question: &Question) -> bool {
        question.default_answer()
    }
}
