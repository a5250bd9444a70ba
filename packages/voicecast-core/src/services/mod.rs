//! Application services layer.
//!
//! Services sit between the API layer and the session registry: they turn
//! chat text into commands and transport notifications into session events.

pub mod command_router;
pub mod lifecycle_processor;

pub use command_router::{help_text, parse_command, CommandRouter, ParsedInput};
pub use lifecycle_processor::LifecycleProcessor;
