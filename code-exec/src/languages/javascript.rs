use async_trait::async_trait;

use crate::{
    config::RuntimeConfig,
    error::Error,
    languages::{node, resolve_program, LanguageRuntime, ToolCheck},
    sandbox::LaunchSpec,
    types::Language,
};

pub struct JavaScriptRuntime {
    program: String,
    heap_limit_mb: u64,
}

impl JavaScriptRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            program: config.node.program.clone(),
            heap_limit_mb: config.node.heap_limit_mb,
        }
    }
}

impl ToolCheck for JavaScriptRuntime {
    fn required_tools(&self) -> Vec<&str> {
        vec![self.program.as_str()]
    }
}

#[async_trait]
impl LanguageRuntime for JavaScriptRuntime {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    async fn prepare(&self) -> Result<LaunchSpec, Error> {
        let program = resolve_program(&self.program)?;
        let version = node::detect_version(&program).await?;
        Ok(node::launch_spec(
            program,
            version,
            Language::JavaScript,
            self.heap_limit_mb,
            None,
        ))
    }
}
