use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CodeErrorKind, Error};

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MEMORY_LIMIT_MB: f64 = 32.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::TypeScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Human readable label for status displays.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Lifecycle state of one language engine, owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Failed(_))
    }
}

/// Resource ceilings applied to one execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionLimits {
    /// Wall-clock ceiling
    pub timeout: Duration,
    /// Memory ceiling in bytes
    pub memory_limit_bytes: u64,
}

impl ExecutionLimits {
    pub fn new(timeout: Duration, memory_limit_mb: f64) -> Self {
        Self {
            timeout,
            memory_limit_bytes: (memory_limit_mb * BYTES_PER_MB) as u64,
        }
    }

    pub fn memory_limit_mb(&self) -> f64 {
        self.memory_limit_bytes as f64 / BYTES_PER_MB
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
            DEFAULT_MEMORY_LIMIT_MB,
        )
    }
}

/// Validated code execution request
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Programming language
    pub language: Language,
    /// Source code to execute
    pub code: String,
    /// Time and memory ceilings
    pub limits: ExecutionLimits,
}

impl ExecutionRequest {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            limits: ExecutionLimits::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    pub fn with_memory_limit_mb(mut self, memory_limit_mb: f64) -> Self {
        self.limits = ExecutionLimits::new(self.limits.timeout, memory_limit_mb);
        self
    }
}

/// Request as it arrives from a caller, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
    #[serde(rename = "timeoutMs", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(
        rename = "memoryLimitMB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_limit_mb: Option<f64>,
}

impl ExecuteRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            timeout_ms: None,
            memory_limit_mb: None,
        }
    }
}

/// How a single run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    TimedOut,
    MemoryExceeded,
}

/// First unhandled error captured from user code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeError {
    pub kind: CodeErrorKind,
    pub message: String,
}

impl CodeError {
    pub fn compile(message: impl Into<String>) -> Self {
        Self {
            kind: CodeErrorKind::Compile,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: CodeErrorKind::Runtime,
            message: message.into(),
        }
    }
}

/// Raw result of one engine run, consumed by the result builder
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub error: Option<CodeError>,
    pub elapsed: Duration,
    pub peak_memory_bytes: u64,
    pub termination: Termination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    #[serde(rename = "executionTimeMs")]
    pub execution_time_ms: u64,
    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: f64,
}

/// Canonical execution result returned for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub metrics: ExecutionMetrics,
}

/// Emitted once per engine reaching `Ready` or `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessEvent {
    pub language: Language,
    pub ready: bool,
}

/// Guarantees the runtime upholds, as communicated to operators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPosture {
    #[serde(rename = "memoryLimitMB")]
    pub memory_limit_mb: f64,
    pub timeout_ms: u64,
    pub network_access: bool,
    pub file_system_access: bool,
    pub host_access: bool,
    pub resource_monitoring: bool,
}
