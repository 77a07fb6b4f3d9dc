pub mod defaults {
    use crate::{
        config::RuntimeConfig, sandbox::SandboxPolicy, CodeExecutionService, ExecutionRequest,
        Language, Result,
    };
    use tokio::time::Duration;

    pub fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            init_timeout_ms: 20_000,
            ..RuntimeConfig::default()
        }
    }

    pub fn test_policy() -> SandboxPolicy {
        SandboxPolicy::from(&test_config().sandbox)
    }

    pub async fn test_service() -> Result<CodeExecutionService> {
        CodeExecutionService::new(test_config()).await
    }

    pub fn default_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn short_timeout() -> Duration {
        Duration::from_millis(200)
    }

    pub fn request(language: Language, code: &str) -> ExecutionRequest {
        ExecutionRequest::new(language, code).with_timeout(default_timeout())
    }
}

/// In-memory engine for exercising the registry and coordinator without interpreters.
///
/// `run` echoes the submitted code as one output line, except for a few
/// magic snippets: `boom` raises a runtime error, `crash` breaks the engine
/// and `sleep:<ms>` holds the engine for that long.
pub mod fake {
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use crate::{
        error::Error,
        executor::LanguageEngine,
        registry::EngineFactory,
        types::{CodeError, ExecutionLimits, ExecutionOutcome, Language, Termination},
    };

    #[derive(Debug, Clone, Default)]
    pub struct FakeBehavior {
        pub init_delay: Duration,
        pub init_error: Option<String>,
        pub init_panics: bool,
    }

    #[derive(Debug, Default)]
    pub struct FakeStats {
        pub initializations: AtomicUsize,
        pub shutdowns: AtomicUsize,
        pub active: AtomicUsize,
        pub max_active: AtomicUsize,
    }

    pub struct FakeEngine {
        language: Language,
        behavior: FakeBehavior,
        stats: Arc<FakeStats>,
    }

    #[async_trait]
    impl LanguageEngine for FakeEngine {
        fn language(&self) -> Language {
            self.language
        }

        async fn initialize(&mut self) -> Result<(), Error> {
            self.stats.initializations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.behavior.init_delay).await;
            if self.behavior.init_panics {
                panic!("interpreter blew up");
            }
            match &self.behavior.init_error {
                Some(message) => Err(Error::Initialization(message.clone())),
                None => Ok(()),
            }
        }

        async fn run(
            &mut self,
            code: &str,
            _limits: &ExecutionLimits,
        ) -> Result<ExecutionOutcome, Error> {
            let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.max_active.fetch_max(active, Ordering::SeqCst);

            let delay = code
                .strip_prefix("sleep:")
                .and_then(|ms| ms.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or_default();
            tokio::time::sleep(delay).await;
            self.stats.active.fetch_sub(1, Ordering::SeqCst);

            let (stdout, error) = match code {
                "crash" => return Err(Error::Protocol("worker vanished".into())),
                "boom" => (String::new(), Some(CodeError::runtime("Error: boom"))),
                other => (format!("{}\n", other), None),
            };
            Ok(ExecutionOutcome {
                stdout,
                error,
                elapsed: delay,
                peak_memory_bytes: 1024 * 1024,
                termination: Termination::Completed,
            })
        }

        async fn shutdown(&mut self) {
            self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn fake_factory_with_stats(behavior: FakeBehavior) -> (EngineFactory, Arc<FakeStats>) {
        let stats = Arc::new(FakeStats::default());
        let shared = stats.clone();
        let factory: EngineFactory = Arc::new(move |language| {
            Box::new(FakeEngine {
                language,
                behavior: behavior.clone(),
                stats: shared.clone(),
            }) as Box<dyn LanguageEngine>
        });
        (factory, stats)
    }

    pub fn fake_factory(behavior: FakeBehavior) -> EngineFactory {
        fake_factory_with_stats(behavior).0
    }
}

/// Execute `code` and skip (returning `None`) when the engine cannot start on this host.
pub async fn execute_or_skip(
    service: &crate::CodeExecutionService,
    request: crate::ExecutionRequest,
) -> Option<crate::ExecutionResult> {
    let language = request.language;
    if let Some((_, Err(e))) = service.warm_up(&[language]).await.pop() {
        eprintln!("Skipping test: {} engine unavailable: {}", language, e);
        return None;
    }
    Some(service.execute(request).await)
}
