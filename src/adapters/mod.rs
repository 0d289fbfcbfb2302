//! Concrete adapter implementations for ports.

pub mod codegen;
pub mod file_config_adapter;
pub mod json_file_adapter;
