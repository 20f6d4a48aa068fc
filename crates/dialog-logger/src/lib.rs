//! Dialog Logger (spec §6): an append-only per-chat transcript, distinct
//! from process-wide `tracing` output, for auditing what a chat's pipeline
//! run actually sent to and received from the LLM.

pub mod error;
pub mod logger;

pub use error::{DialogLogError, DialogLogResult};
pub use logger::DialogLogger;
