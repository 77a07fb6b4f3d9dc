use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    error::Error,
    types::{ExecutionLimits, Language, SecurityPosture, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIMEOUT_MS},
};

/// Runtime configuration, loadable from a TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Timeout applied when a request does not name one (milliseconds)
    pub default_timeout_ms: u64,
    /// Memory ceiling applied when a request does not name one (MB)
    pub default_memory_limit_mb: f64,
    /// Largest timeout a request may ask for (milliseconds)
    pub max_timeout_ms: u64,
    /// Largest memory ceiling a request may ask for (MB)
    pub max_memory_limit_mb: f64,
    /// Largest accepted source text (bytes)
    pub max_code_bytes: usize,
    /// Output kept per execution (bytes)
    pub max_output_bytes: usize,
    /// Resource monitor sampling period (milliseconds)
    pub monitor_interval_ms: u64,
    /// How long callers wait for an engine that is still loading (milliseconds)
    pub init_timeout_ms: u64,
    /// Engines initialized at startup instead of on first use
    pub eager_languages: Vec<Language>,
    pub sandbox: SandboxConfig,
    pub python: InterpreterConfig,
    pub node: InterpreterConfig,
}

/// Process-level isolation settings shared by every worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Move workers into fresh user + network namespaces when the kernel allows it
    pub isolate_network: bool,
    /// RLIMIT_NOFILE for worker processes
    pub max_open_files: u64,
    /// Address space backstop for interpreters that tolerate RLIMIT_AS (MB)
    pub worker_address_space_mb: u64,
    /// Parent directory for per-worker scratch directories
    pub work_root: Option<PathBuf>,
}

/// Interpreter executable and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Program name or absolute path
    pub program: String,
    /// Heap ceiling handed to the interpreter itself, where supported (MB)
    pub heap_limit_mb: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_timeout_ms: 60_000,
            max_memory_limit_mb: 512.0,
            max_code_bytes: 1024 * 1024,     // 1MB
            max_output_bytes: 1024 * 1024,   // 1MB
            monitor_interval_ms: 10,
            init_timeout_ms: 30_000,
            eager_languages: Vec::new(),
            sandbox: SandboxConfig::default(),
            python: InterpreterConfig {
                program: "python3".to_string(),
                heap_limit_mb: 0,
            },
            node: InterpreterConfig {
                program: "node".to_string(),
                heap_limit_mb: 256,
            },
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            isolate_network: true,
            max_open_files: 64,
            worker_address_space_mb: 2048,
            work_root: None,
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            heap_limit_mb: 0,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        let config: RuntimeConfig =
            toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.default_timeout_ms == 0 || self.default_timeout_ms > self.max_timeout_ms {
            return Err(Error::Config(format!(
                "default_timeout_ms must be in 1..={}, got {}",
                self.max_timeout_ms, self.default_timeout_ms
            )));
        }
        if !(self.default_memory_limit_mb > 0.0
            && self.default_memory_limit_mb <= self.max_memory_limit_mb)
        {
            return Err(Error::Config(format!(
                "default_memory_limit_mb must be in (0, {}], got {}",
                self.max_memory_limit_mb, self.default_memory_limit_mb
            )));
        }
        if self.monitor_interval_ms == 0 {
            return Err(Error::Config("monitor_interval_ms must be positive".into()));
        }
        if self.init_timeout_ms == 0 {
            return Err(Error::Config("init_timeout_ms must be positive".into()));
        }
        if self.max_output_bytes == 0 || self.max_code_bytes == 0 {
            return Err(Error::Config(
                "max_output_bytes and max_code_bytes must be positive".into(),
            ));
        }
        if self.python.program.is_empty() || self.node.program.is_empty() {
            return Err(Error::Config("interpreter program must not be empty".into()));
        }
        Ok(())
    }

    pub fn default_limits(&self) -> ExecutionLimits {
        ExecutionLimits::new(
            Duration::from_millis(self.default_timeout_ms),
            self.default_memory_limit_mb,
        )
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn security_posture(&self) -> SecurityPosture {
        SecurityPosture {
            memory_limit_mb: self.default_memory_limit_mb,
            timeout_ms: self.default_timeout_ms,
            network_access: false,
            file_system_access: false,
            host_access: false,
            resource_monitoring: true,
        }
    }
}
