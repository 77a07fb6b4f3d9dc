use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    config::RuntimeConfig,
    error::Error,
    registry::{process_engine_factory, EngineFactory, EngineRegistry},
    result::{build_result, failure_result},
    types::{
        EngineState, ExecuteRequest, ExecutionLimits, ExecutionRequest, ExecutionResult, Language,
        ReadinessEvent, SecurityPosture,
    },
};

/// Public entry point of the runtime.
#[derive(Clone)]
pub struct CodeExecutionService {
    registry: Arc<EngineRegistry>,
    config: Arc<RuntimeConfig>,
}

impl CodeExecutionService {
    /// Create a service backed by sandboxed interpreter workers and start
    /// warming the configured eager languages in the background.
    pub async fn new(config: RuntimeConfig) -> Result<Self, Error> {
        let factory = process_engine_factory(config.clone());
        let service = Self::with_factory(config, factory)?;

        for &language in &service.config.eager_languages {
            let registry = service.registry.clone();
            tokio::spawn(async move {
                if let Err(e) = registry.ensure_engine(language).await {
                    warn!(%language, "Eager initialization failed: {}", e);
                }
            });
        }

        Ok(service)
    }

    /// Create a service whose engines come from `factory`.
    pub fn with_factory(config: RuntimeConfig, factory: EngineFactory) -> Result<Self, Error> {
        config.validate()?;
        let registry = EngineRegistry::new(factory, config.init_timeout());
        Ok(Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Check a wire request against the configured policy. Nothing is executed.
    pub fn validate(&self, request: ExecuteRequest) -> Result<ExecutionRequest, Error> {
        let language: Language = request.language.parse()?;

        let timeout_ms = match request.timeout_ms {
            None => self.config.default_timeout_ms,
            Some(ms) if ms <= 0 => {
                return Err(Error::InvalidRequest(format!(
                    "timeoutMs must be positive, got {}",
                    ms
                )))
            }
            Some(ms) if ms as u64 > self.config.max_timeout_ms => {
                return Err(Error::InvalidRequest(format!(
                    "timeoutMs must not exceed {}, got {}",
                    self.config.max_timeout_ms, ms
                )))
            }
            Some(ms) => ms as u64,
        };

        let memory_limit_mb = match request.memory_limit_mb {
            None => self.config.default_memory_limit_mb,
            Some(mb) if !mb.is_finite() || mb <= 0.0 => {
                return Err(Error::InvalidRequest(format!(
                    "memoryLimitMB must be a positive number, got {}",
                    mb
                )))
            }
            Some(mb) if mb > self.config.max_memory_limit_mb => {
                return Err(Error::InvalidRequest(format!(
                    "memoryLimitMB must not exceed {}, got {}",
                    self.config.max_memory_limit_mb, mb
                )))
            }
            Some(mb) => mb,
        };

        if request.code.len() > self.config.max_code_bytes {
            return Err(Error::InvalidRequest(format!(
                "code is {} bytes, limit is {}",
                request.code.len(),
                self.config.max_code_bytes
            )));
        }

        Ok(ExecutionRequest {
            language,
            code: request.code,
            limits: ExecutionLimits::new(Duration::from_millis(timeout_ms), memory_limit_mb),
        })
    }

    /// Validate and execute a wire request.
    ///
    /// `Err` is returned only for rejected requests; every accepted request
    /// yields a result, failures included.
    pub async fn submit(&self, request: ExecuteRequest) -> Result<ExecutionResult, Error> {
        let request = self.validate(request)?;
        Ok(self.execute(request).await)
    }

    /// Execute a validated request. Never fails: errors are encoded in the result.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let span = info_span!(
            "execution",
            request_id = %Uuid::new_v4(),
            language = %request.language
        );
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: ExecutionRequest) -> ExecutionResult {
        let ExecutionRequest {
            language,
            code,
            limits,
        } = request;
        debug!(
            code_bytes = code.len(),
            timeout = ?limits.timeout,
            memory_limit_mb = limits.memory_limit_mb(),
            "Starting code execution"
        );

        let outcome = self
            .registry
            .with_engine(language, |mut lease| async move {
                lease.run(&code, &limits).await
            })
            .await
            .and_then(|outcome| outcome);

        let result = match outcome {
            Ok(outcome) => build_result(outcome),
            Err(e) => {
                error!("Code execution failed: {}", e);
                failure_result(&e)
            }
        };

        info!(
            success = result.success,
            execution_time_ms = result.metrics.execution_time_ms,
            memory_used_mb = result.metrics.memory_used_mb,
            "Code execution finished"
        );
        result
    }

    pub fn engine_states(&self) -> Vec<(Language, EngineState)> {
        self.registry.states()
    }

    pub fn subscribe_readiness(&self) -> broadcast::Receiver<ReadinessEvent> {
        self.registry.subscribe()
    }

    pub fn security_posture(&self) -> SecurityPosture {
        self.config.security_posture()
    }

    /// Re-create an engine that is in the `Failed` state.
    pub async fn reset_engine(&self, language: Language) -> Result<(), Error> {
        self.registry.reset(language).await
    }

    /// Initialize the given engines concurrently and report how each ended up.
    pub async fn warm_up(&self, languages: &[Language]) -> Vec<(Language, Result<(), Error>)> {
        let handles: Vec<_> = languages
            .iter()
            .map(|&language| {
                let registry = self.registry.clone();
                (
                    language,
                    tokio::spawn(async move { registry.ensure_engine(language).await }),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (language, handle) in handles {
            let result = handle
                .await
                .map_err(|e| Error::System(format!("Warm-up task failed: {}", e)))
                .and_then(|result| result);
            results.push((language, result));
        }
        results
    }

    pub async fn shutdown(&self) {
        info!("Shutting down engines");
        self.registry.shutdown().await;
    }
}
