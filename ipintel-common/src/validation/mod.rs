//! API key validation: state machine and workflow

pub mod state;
pub mod workflow;

pub use state::{transition, ValidationEvent, ValidationStage, ValidationState, REDIRECT_MESSAGE};
pub use workflow::{ValidationWorkflow, DEFAULT_REDIRECT_DELAY};
