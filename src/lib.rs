//! LLM-driven UI test agent. The oracle (an LLM behind an opaque
//! invoke boundary) decides what to do next; this crate observes page
//! state, grounds the oracle, and executes its decisions until a
//! verdict lands or the interaction budget runs out.

pub mod artifacts;
pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod oracle;
pub mod parser;
pub mod prompt;
pub mod queue;
pub mod sanitizer;
pub mod session;
pub mod types;
