//! Guided conversation flows driven by the server-supplied chat config.

pub mod engine;
pub mod model;
pub mod state;

pub use engine::FlowEngine;
pub use model::{
    ChatConfig, DisplayAs, InputRequirement, Instruction, InstructionPath, MenuItem, Product,
    Submission, UserData,
};
pub use state::{FlowState, StepInput};
