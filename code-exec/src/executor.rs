use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    config::RuntimeConfig,
    error::Error,
    languages::{JavaScriptRuntime, LanguageRuntime, PythonRuntime, TypeScriptRuntime},
    monitor::{Breach, ProcessMemorySampler, ResourceMonitor},
    protocol::{self, WireErrorKind, WorkerEvent},
    sandbox::{LaunchSpec, Sandbox, SandboxPolicy, WorkerProcess},
    types::{CodeError, ExecutionLimits, ExecutionOutcome, Language, Termination},
};

/// One engine per language, driven exclusively by the registry.
#[async_trait]
pub trait LanguageEngine: Send {
    fn language(&self) -> Language;

    /// One-time interpreter setup. Called exactly once per engine lifetime.
    async fn initialize(&mut self) -> Result<(), Error>;

    /// Run `code` to completion or forced termination.
    ///
    /// Failures of the user code are reported inside the outcome; `Err` means
    /// the engine itself can no longer be trusted.
    async fn run(&mut self, code: &str, limits: &ExecutionLimits)
        -> Result<ExecutionOutcome, Error>;

    /// Stop any worker the engine owns.
    async fn shutdown(&mut self);
}

/// Build the process-backed engine for `language`.
pub fn create_engine(language: Language, config: &RuntimeConfig) -> Box<dyn LanguageEngine> {
    match language {
        Language::Python => Box::new(ProcessEngine::new(PythonRuntime::new(config), config)),
        Language::JavaScript => {
            Box::new(ProcessEngine::new(JavaScriptRuntime::new(config), config))
        }
        Language::TypeScript => {
            Box::new(ProcessEngine::new(TypeScriptRuntime::new(config), config))
        }
    }
}

/// Engine backed by a persistent sandboxed interpreter worker.
///
/// After a forced termination the worker is discarded and a fresh one is
/// started lazily by the next `run`.
pub struct ProcessEngine<R: LanguageRuntime> {
    runtime: R,
    policy: SandboxPolicy,
    monitor_interval: Duration,
    startup_timeout: Duration,
    max_output_bytes: usize,
    launch: Option<LaunchSpec>,
    worker: Option<WorkerProcess>,
    next_job: u64,
}

impl<R: LanguageRuntime> ProcessEngine<R> {
    pub fn new(runtime: R, config: &RuntimeConfig) -> Self {
        Self {
            runtime,
            policy: SandboxPolicy::from(&config.sandbox),
            monitor_interval: config.monitor_interval(),
            startup_timeout: config.init_timeout(),
            max_output_bytes: config.max_output_bytes,
            launch: None,
            worker: None,
            next_job: 0,
        }
    }

    fn start_worker(&self) -> impl Future<Output = Result<WorkerProcess, Error>> + Send + 'static {
        let language = self.runtime.language();
        let launch = self.launch.clone();
        let policy = self.policy.clone();
        let startup_timeout = self.startup_timeout;
        async move {
            let launch = launch
                .ok_or_else(|| Error::Initialization("engine was never initialized".into()))?;
            spawn_worker(language, launch, policy, startup_timeout).await
        }
    }
}

/// Start a worker in a fresh sandbox and wait for its ready handshake.
async fn spawn_worker(
    language: Language,
    launch: LaunchSpec,
    policy: SandboxPolicy,
    startup_timeout: Duration,
) -> Result<WorkerProcess, Error> {
    let sandbox = Sandbox::new(policy)?;
    let mut worker = sandbox.spawn(&launch)?;

    match time::timeout(startup_timeout, await_ready(&mut worker)).await {
        Ok(Ok(runtime)) => {
            info!(
                %language,
                pid = worker.pid(),
                network_isolated = worker.network_isolated(),
                "Worker ready: {}", runtime
            );
            Ok(worker)
        }
        Ok(Err(e)) => {
            worker.terminate().await;
            Err(e)
        }
        Err(_) => {
            worker.terminate().await;
            Err(Error::Initialization(format!(
                "worker did not become ready within {:?}",
                startup_timeout
            )))
        }
    }
}

async fn await_ready(worker: &mut WorkerProcess) -> Result<String, Error> {
    match worker.next_line().await? {
        Some(line) => match WorkerEvent::parse(&line)? {
            WorkerEvent::Ready { runtime } => Ok(runtime),
            WorkerEvent::InitFailed { message } => Err(Error::Initialization(message)),
            other => Err(Error::Protocol(format!(
                "Expected ready message, got {:?}",
                other
            ))),
        },
        None => Err(Error::Initialization(format!(
            "worker exited during startup: {}",
            worker.stderr_tail()
        ))),
    }
}

/// How the event loop for one job ended
enum Completion {
    Done(Instant),
    Exited(Instant),
    Aborted(Breach),
    /// The worker wrote something that is not a well-formed event for this job
    Violated(Instant, String),
}

/// Output buffer that keeps at most `limit` bytes.
struct OutputBuffer {
    text: String,
    limit: usize,
    dropped: usize,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, data: &str) {
        let room = self.limit.saturating_sub(self.text.len());
        if data.len() <= room {
            self.text.push_str(data);
            return;
        }
        let mut cut = room;
        while !data.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&data[..cut]);
        self.dropped += data.len() - cut;
    }
}

#[async_trait]
impl<R: LanguageRuntime> LanguageEngine for ProcessEngine<R> {
    fn language(&self) -> Language {
        self.runtime.language()
    }

    async fn initialize(&mut self) -> Result<(), Error> {
        self.runtime.check_tools()?;
        self.launch = Some(self.runtime.prepare().await?);
        self.worker = Some(self.start_worker().await?);
        Ok(())
    }

    async fn run(
        &mut self,
        code: &str,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, Error> {
        let language = self.runtime.language();
        let mut worker = match self.worker.take() {
            Some(worker) => worker,
            None => {
                debug!(%language, "Starting replacement worker");
                self.start_worker().await?
            }
        };

        self.next_job += 1;
        let job = self.next_job;
        let line = protocol::encode_job(job, code)?;

        let sampler = Arc::new(ProcessMemorySampler::new(worker.pid()));
        let mut monitor = ResourceMonitor::start(sampler, *limits, self.monitor_interval);
        let started = monitor.started();

        if let Err(e) = worker.send_line(&line).await {
            monitor.finish().await;
            worker.terminate().await;
            return Err(Error::Protocol(format!("Failed to submit job: {}", e)));
        }

        let mut output = OutputBuffer::new(self.max_output_bytes);
        let mut error: Option<(WireErrorKind, String)> = None;

        let completion = loop {
            tokio::select! {
                biased;
                breach = monitor.tripped() => break Completion::Aborted(breach),
                line = worker.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break Completion::Exited(Instant::now()),
                        Err(e) => {
                            monitor.finish().await;
                            worker.terminate().await;
                            return Err(Error::Protocol(format!("Failed to read from worker: {}", e)));
                        }
                    };
                    match WorkerEvent::parse(&line) {
                        Ok(WorkerEvent::Stdout { id, data }) if id == job => output.push(&data),
                        Ok(WorkerEvent::Error { id, kind, message }) if id == job => {
                            error.get_or_insert((kind, message));
                        }
                        Ok(WorkerEvent::Done { id }) if id == job => {
                            break Completion::Done(Instant::now())
                        }
                        Ok(other) => break Completion::Violated(
                            Instant::now(),
                            format!("unexpected message for job {}: {:?}", job, other),
                        ),
                        Err(e) => break Completion::Violated(Instant::now(), e.to_string()),
                    }
                }
            }
        };

        let report = monitor.finish().await;
        if output.dropped > 0 {
            warn!(%language, dropped = output.dropped, "Output exceeded buffer limit");
        }

        let (termination, finished) = match completion {
            Completion::Done(at) => {
                self.worker = Some(worker);
                match report.breach {
                    // A ceiling breached before the job finished still decides the outcome
                    Some(breach) if breach.at <= at => (breach.cause, breach.at),
                    _ => (Termination::Completed, at),
                }
            }
            Completion::Aborted(breach) => {
                debug!(%language, cause = ?breach.cause, pid = worker.pid(), "Terminating worker");
                worker.terminate().await;
                (breach.cause, breach.at)
            }
            Completion::Violated(at, reason) => {
                warn!(%language, pid = worker.pid(), "Discarding worker after protocol violation: {}", reason);
                worker.terminate().await;
                error.get_or_insert((
                    WireErrorKind::Runtime,
                    "engine protocol violation; the worker was restarted".to_string(),
                ));
                match report.breach {
                    Some(breach) if breach.at <= at => (breach.cause, breach.at),
                    _ => (Termination::Completed, at),
                }
            }
            Completion::Exited(at) => {
                let stderr = worker.stderr_tail();
                worker.terminate().await;
                match report.breach {
                    Some(breach) => (breach.cause, breach.at.min(at)),
                    None if report.peak_memory_bytes > limits.memory_limit_bytes => {
                        (Termination::MemoryExceeded, at)
                    }
                    None => {
                        warn!(%language, stderr = %stderr, "Worker exited during execution");
                        error.get_or_insert((
                            WireErrorKind::Runtime,
                            "engine process exited unexpectedly".to_string(),
                        ));
                        (Termination::Completed, at)
                    }
                }
            }
        };

        let termination = match (termination, &error) {
            (Termination::Completed, Some((WireErrorKind::Memory, _))) => Termination::MemoryExceeded,
            (termination, _) => termination,
        };

        Ok(ExecutionOutcome {
            stdout: output.text,
            error: error.map(|(kind, message)| CodeError {
                kind: kind.code_error_kind(),
                message,
            }),
            elapsed: finished.saturating_duration_since(started),
            peak_memory_bytes: report.peak_memory_bytes,
            termination,
        })
    }

    async fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
    }
}
