//! Language-specific interpreter runtimes

mod javascript;
mod node;
mod python;
mod typescript;

pub use javascript::JavaScriptRuntime;
pub use python::PythonRuntime;
pub use typescript::TypeScriptRuntime;

use async_trait::async_trait;
use std::path::PathBuf;
use which::which;

use crate::{error::Error, sandbox::LaunchSpec, types::Language};

/// Knows how to launch the sandboxed worker for one language.
#[async_trait]
pub trait LanguageRuntime: ToolCheck + Send + Sync + 'static {
    fn language(&self) -> Language;

    /// Resolve the interpreter, check its capabilities and describe how to
    /// launch the worker driver.
    async fn prepare(&self) -> Result<LaunchSpec, Error>;
}

pub trait ToolCheck {
    fn required_tools(&self) -> Vec<&str>;

    fn check_tools(&self) -> Result<(), Error> {
        let missing: Vec<_> = self
            .required_tools()
            .iter()
            .filter(|tool| which(tool).is_err())
            .map(|s| (*s).to_string())
            .collect();

        if !missing.is_empty() {
            return Err(Error::Initialization(format!(
                "Missing required tools: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_command(cmd: &str) -> bool {
    which(cmd).is_ok()
}

/// Absolute path of `program`, looked up on `PATH` when it is a bare name.
pub(crate) fn resolve_program(program: &str) -> Result<PathBuf, Error> {
    which(program)
        .map_err(|e| Error::Initialization(format!("Cannot locate {}: {}", program, e)))
}

#[cfg(test)]
pub(crate) fn skip_if_not_available(tools: &[&str]) -> bool {
    let missing: Vec<_> = tools
        .iter()
        .filter(|tool| !check_command(tool))
        .map(|s| (*s).to_string())
        .collect();

    if !missing.is_empty() {
        eprintln!("Skipping test: {} not available", missing.join(", "));
        return true;
    }
    false
}
