//! # Code Execution Runtime
//!
//! Runs untrusted Python, JavaScript and TypeScript snippets inside persistent,
//! sandboxed interpreter workers. Every execution is watched for wall-clock and
//! memory ceilings and always ends in one canonical [`ExecutionResult`].

pub mod config;
mod error;
pub mod executor;
pub mod languages;
pub mod monitor;
mod protocol;
pub mod registry;
pub mod result;
pub mod sandbox;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use config::{InterpreterConfig, RuntimeConfig, SandboxConfig};
pub use error::{CodeErrorKind, Error};
pub use executor::{LanguageEngine, ProcessEngine};
pub use registry::{EngineFactory, EngineLease, EngineRegistry};
pub use service::CodeExecutionService;
pub use types::{
    CodeError, EngineState, ExecuteRequest, ExecutionLimits, ExecutionMetrics, ExecutionOutcome,
    ExecutionRequest, ExecutionResult, Language, ReadinessEvent, SecurityPosture, Termination,
    DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIMEOUT_MS,
};

/// Result type for code execution operations
pub type Result<T> = std::result::Result<T, Error>;
