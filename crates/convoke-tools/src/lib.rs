//! convoke-tools — deterministic tools and the sequence executor.
//!
//! The [`traits::Tool`] contract, schema validation against declared
//! parameter specs, the built-in tools (calculator, file reader, JSON
//! parser), the `${...}` template micro-language, and the policy-driven
//! [`sequence::SequenceRunner`].

pub mod builtin;
pub mod error;
pub mod schema;
pub mod sequence;
pub mod template;
pub mod traits;

pub use builtin::{Calculator, FileReader, JsonParser};
pub use error::{Result, ToolError};
pub use schema::validate_params;
pub use sequence::{
    CompiledSequence, CompiledStep, DEFAULT_STEP_TIMEOUT_MS, SequenceReport, SequenceRunner,
    StepDispatcher, StepOutcome, StepTarget, compile,
};
pub use template::{Template, TemplateError};
pub use traits::{Tool, require_f64, require_str};
