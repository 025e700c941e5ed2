use crate::dialect::Backend;
use crate::http::InjectionPoint;
use crate::models::Technique;

/// Messages sent from the engine to a progress view or other consumer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Baseline requests answered
    TargetProbed {
        is_dynamic: bool,
        possible_backend: Option<Backend>,
    },
    /// A parameter is being tested
    ParameterTesting {
        point: InjectionPoint,
    },
    /// A technique is being tried against the current parameter
    TechniqueTrying {
        parameter: String,
        technique: Technique,
    },
    /// A vector proved injectable
    VectorConfirmed {
        parameter: String,
        technique: Technique,
        title: String,
    },
    /// Every technique failed for a parameter
    ParameterExhausted {
        parameter: String,
    },
    /// A confirmed vector was loaded from the session
    SessionResumed {
        parameter: String,
    },
    /// Extraction of a value started
    ExtractionStarted {
        key: String,
    },
    /// Length discovery finished
    LengthResolved {
        key: String,
        length: usize,
    },
    /// One more character is known
    CharacterResolved {
        key: String,
        position: usize,
        partial: String,
    },
    /// A value was fully resolved
    ValueFetched {
        key: String,
        value: String,
    },
    /// Extraction aborted with a partial value
    ExtractionFailed {
        key: String,
        partial: String,
    },
}
