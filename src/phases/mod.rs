//! Phase collaborators for the code generation loop.
//!
//! Each phase is a thin function over the generation backend: it builds
//! a prompt, calls the backend, and shapes the response. The state
//! machine in `run` sequences them.

pub mod backend;
pub mod design;
pub mod diagnosis;
pub mod programming;
pub mod repair;
pub mod understanding;

pub use backend::{Backend, CliBackend, GenerateRequest, RequestKind};
pub use design::Blueprint;
pub use programming::CodeArtifact;
pub use understanding::TaskAnalysis;
