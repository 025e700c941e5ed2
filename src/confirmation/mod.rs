pub mod selector;
pub mod state;

pub use selector::{Confirmation, TechniqueSelector};
pub use state::ConfirmationState;
