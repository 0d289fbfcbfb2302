//! stratforge: compiles declarative trading-strategy documents into
//! executable source for JavaScript, Python and MQL5.
//!
//! Hexagonal architecture: the pipeline (build, validate, generate) lives in
//! [`domain`], port traits in [`ports`], code generators and file access in
//! [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
