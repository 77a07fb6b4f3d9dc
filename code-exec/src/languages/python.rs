use async_trait::async_trait;
use tracing::debug;

use crate::{
    config::RuntimeConfig,
    error::Error,
    languages::{resolve_program, LanguageRuntime, ToolCheck},
    sandbox::LaunchSpec,
    types::Language,
};

const DRIVER: &str = include_str!("drivers/python_driver.py");

pub struct PythonRuntime {
    program: String,
    address_space_mb: u64,
}

impl PythonRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        // An explicit interpreter heap ceiling takes precedence over the shared backstop
        let address_space_mb = if config.python.heap_limit_mb > 0 {
            config.python.heap_limit_mb
        } else {
            config.sandbox.worker_address_space_mb
        };
        Self {
            program: config.python.program.clone(),
            address_space_mb,
        }
    }

    fn args() -> Vec<String> {
        // -I isolated mode, -S skip site, -B no bytecode files, -u unbuffered
        ["-I", "-S", "-B", "-u", "-c", DRIVER]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl ToolCheck for PythonRuntime {
    fn required_tools(&self) -> Vec<&str> {
        vec![self.program.as_str()]
    }
}

#[async_trait]
impl LanguageRuntime for PythonRuntime {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn prepare(&self) -> Result<LaunchSpec, Error> {
        let program = resolve_program(&self.program)?;
        debug!(program = %program.display(), "Resolved Python interpreter");

        Ok(LaunchSpec {
            program,
            args: Self::args(),
            env: Vec::new(),
            address_space_limit: (self.address_space_mb > 0)
                .then(|| self.address_space_mb * 1024 * 1024),
        })
    }
}
