//! Port traits at the seams between the pipeline and its collaborators.

pub mod codegen_port;
pub mod config_port;
pub mod document_port;
