//! Core domain types and the compiler pipeline.

pub mod builder;
pub mod compiler;
pub mod config_validation;
pub mod crossover;
pub mod error;
pub mod eval;
pub mod expression;
pub mod index;
pub mod registry;
pub mod strategy;
pub mod validation;
