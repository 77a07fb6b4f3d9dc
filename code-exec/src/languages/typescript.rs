use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use which::which;

use crate::{
    config::RuntimeConfig,
    error::Error,
    languages::{node, resolve_program, LanguageRuntime, ToolCheck},
    sandbox::LaunchSpec,
    types::Language,
};

/// TypeScript on the Node.js worker: types are stripped before evaluation,
/// no type checking takes place.
pub struct TypeScriptRuntime {
    program: String,
    heap_limit_mb: u64,
}

impl TypeScriptRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            program: config.node.program.clone(),
            heap_limit_mb: config.node.heap_limit_mb,
        }
    }

    /// Locate an installed `typescript` package through its `tsc` launcher.
    fn find_typescript_package() -> Option<PathBuf> {
        let tsc = which("tsc").ok()?.canonicalize().ok()?;
        // <package>/bin/tsc
        let package = tsc.parent()?.parent()?;
        package_has_compiler(package).then(|| package.to_path_buf())
    }
}

fn package_has_compiler(package: &Path) -> bool {
    package.join("package.json").is_file() && package.join("lib/typescript.js").is_file()
}

impl ToolCheck for TypeScriptRuntime {
    fn required_tools(&self) -> Vec<&str> {
        vec![self.program.as_str()]
    }
}

#[async_trait]
impl LanguageRuntime for TypeScriptRuntime {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    async fn prepare(&self) -> Result<LaunchSpec, Error> {
        let program = resolve_program(&self.program)?;
        let version = node::detect_version(&program).await?;

        let package = if version.strips_typescript() {
            debug!("Using built-in TypeScript type stripping");
            None
        } else {
            let package = Self::find_typescript_package().ok_or_else(|| {
                Error::Initialization(format!(
                    "Node.js {}.{}.{} cannot strip TypeScript types and no typescript package is installed",
                    version.major, version.minor, version.patch
                ))
            })?;
            info!(package = %package.display(), "Using installed TypeScript compiler");
            Some(package)
        };

        Ok(node::launch_spec(
            program,
            version,
            Language::TypeScript,
            self.heap_limit_mb,
            package.as_deref(),
        ))
    }
}
