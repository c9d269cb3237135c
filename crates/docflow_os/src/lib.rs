#![forbid(unsafe_code)]

pub mod pipeline_runner;
pub mod resolve_wiring;
