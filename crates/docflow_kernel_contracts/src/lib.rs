#![forbid(unsafe_code)]

pub mod command;
pub mod common;
pub mod escalation;
pub mod guard;
pub mod resolution;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};
