//! Owner of every language engine and its lifecycle state.
//!
//! Each language has a fixed slot holding its [`EngineState`] and the engine
//! itself behind a FIFO-fair async mutex, so executions for one language are
//! served one at a time in arrival order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::{broadcast, watch, Mutex, OwnedMutexGuard},
    time,
};
use tracing::{debug, error, info};

use crate::{
    config::RuntimeConfig,
    error::Error,
    executor::{create_engine, LanguageEngine},
    types::{EngineState, ExecutionLimits, ExecutionOutcome, Language, ReadinessEvent},
};

/// Builds a fresh, uninitialized engine for a language.
pub type EngineFactory = Arc<dyn Fn(Language) -> Box<dyn LanguageEngine> + Send + Sync>;

type EngineHandle = Arc<Mutex<Option<Box<dyn LanguageEngine>>>>;

const READINESS_CAPACITY: usize = 16;

/// Factory producing the sandboxed process engines described by `config`.
pub fn process_engine_factory(config: RuntimeConfig) -> EngineFactory {
    Arc::new(move |language| create_engine(language, &config))
}

struct EngineSlot {
    language: Language,
    state: watch::Sender<EngineState>,
    engine: EngineHandle,
}

impl EngineSlot {
    fn new(language: Language) -> Arc<Self> {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Arc::new(Self {
            language,
            state,
            engine: Arc::new(Mutex::new(None)),
        })
    }

    fn current(&self) -> EngineState {
        self.state.borrow().clone()
    }
}

pub struct EngineRegistry {
    python: Arc<EngineSlot>,
    javascript: Arc<EngineSlot>,
    typescript: Arc<EngineSlot>,
    factory: EngineFactory,
    init_timeout: Duration,
    readiness: broadcast::Sender<ReadinessEvent>,
}

impl EngineRegistry {
    pub fn new(factory: EngineFactory, init_timeout: Duration) -> Self {
        let (readiness, _) = broadcast::channel(READINESS_CAPACITY);
        Self {
            python: EngineSlot::new(Language::Python),
            javascript: EngineSlot::new(Language::JavaScript),
            typescript: EngineSlot::new(Language::TypeScript),
            factory,
            init_timeout,
            readiness,
        }
    }

    fn slot(&self, language: Language) -> &Arc<EngineSlot> {
        match language {
            Language::Python => &self.python,
            Language::JavaScript => &self.javascript,
            Language::TypeScript => &self.typescript,
        }
    }

    pub fn state(&self, language: Language) -> EngineState {
        self.slot(language).current()
    }

    /// Snapshot of every engine's state, in a fixed language order.
    pub fn states(&self) -> Vec<(Language, EngineState)> {
        Language::ALL
            .iter()
            .map(|&language| (language, self.state(language)))
            .collect()
    }

    /// Notifications for engines reaching `Ready` or `Failed`.
    pub fn subscribe(&self) -> broadcast::Receiver<ReadinessEvent> {
        self.readiness.subscribe()
    }

    /// Bring the engine for `language` to a terminal state.
    ///
    /// The first caller to find the slot `Uninitialized` starts initialization;
    /// everyone else waits for that same attempt. A `Failed` engine is reported
    /// immediately and never retried here.
    pub async fn ensure_engine(&self, language: Language) -> Result<(), Error> {
        let slot = self.slot(language);
        let claimed = slot.state.send_if_modified(|state| {
            if *state == EngineState::Uninitialized {
                *state = EngineState::Loading;
                true
            } else {
                false
            }
        });
        if claimed {
            self.spawn_initialization(slot.clone());
        }

        let mut state = slot.state.subscribe();
        let settled = time::timeout(self.init_timeout, async {
            state
                .wait_for(EngineState::is_terminal)
                .await
                .map(|state| state.clone())
        })
        .await;

        match settled {
            Ok(Ok(EngineState::Ready)) => Ok(()),
            Ok(Ok(EngineState::Failed(reason))) => Err(Error::EngineNotReady { language, reason }),
            Ok(Ok(other)) => Err(Error::EngineNotReady {
                language,
                reason: format!("unexpected state {:?}", other),
            }),
            Ok(Err(_)) => Err(Error::EngineNotReady {
                language,
                reason: "engine registry closed".into(),
            }),
            Err(_) => Err(Error::EngineNotReady {
                language,
                reason: format!("still loading after {:?}", self.init_timeout),
            }),
        }
    }

    /// Initialization runs on its own task so that a caller giving up cannot
    /// leave the slot stuck in `Loading`.
    fn spawn_initialization(&self, slot: Arc<EngineSlot>) {
        let factory = self.factory.clone();
        let readiness = self.readiness.clone();

        tokio::spawn(async move {
            let language = slot.language;
            info!(%language, "Initializing engine");

            let attempt = tokio::spawn(async move {
                let mut engine = factory(language);
                let result = engine.initialize().await;
                (engine, result)
            });

            let state = match attempt.await {
                Ok((engine, Ok(()))) => {
                    *slot.engine.lock().await = Some(engine);
                    EngineState::Ready
                }
                Ok((mut engine, Err(e))) => {
                    engine.shutdown().await;
                    EngineState::Failed(e.to_string())
                }
                Err(e) => EngineState::Failed(format!("initialization aborted: {}", e)),
            };

            match &state {
                EngineState::Failed(reason) => error!(%language, "Engine failed to initialize: {}", reason),
                _ => info!(%language, "Engine ready"),
            }
            let ready = state == EngineState::Ready;
            slot.state.send_replace(state);
            let _ = readiness.send(ReadinessEvent { language, ready });
        });
    }

    /// Exclusive access to a ready engine. Waiters are served in arrival order.
    pub async fn acquire(&self, language: Language) -> Result<EngineLease, Error> {
        self.ensure_engine(language).await?;

        let slot = self.slot(language).clone();
        let guard = slot.engine.clone().lock_owned().await;

        // The engine may have failed while this caller was queued
        match slot.current() {
            EngineState::Ready if guard.is_some() => {}
            EngineState::Failed(reason) => return Err(Error::EngineNotReady { language, reason }),
            other => {
                return Err(Error::EngineNotReady {
                    language,
                    reason: format!("engine is {:?}", other),
                })
            }
        }

        debug!(%language, "Engine acquired");
        Ok(EngineLease {
            language,
            guard,
            slot,
            readiness: self.readiness.clone(),
        })
    }

    /// Run `f` with exclusive access to the engine, releasing it on every exit path.
    pub async fn with_engine<F, Fut, T>(&self, language: Language, f: F) -> Result<T, Error>
    where
        F: FnOnce(EngineLease) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.acquire(language).await?;
        Ok(f(lease).await)
    }

    /// Explicitly re-create a failed engine. Only valid from `Failed`.
    pub async fn reset(&self, language: Language) -> Result<(), Error> {
        let slot = self.slot(language);
        if !matches!(slot.current(), EngineState::Failed(_)) {
            return Err(Error::InvalidRequest(format!(
                "{} engine is not in a failed state",
                language
            )));
        }

        let mut engine = slot.engine.lock().await;
        if let Some(mut stale) = engine.take() {
            stale.shutdown().await;
        }
        let reset = slot.state.send_if_modified(|state| {
            if matches!(state, EngineState::Failed(_)) {
                *state = EngineState::Uninitialized;
                true
            } else {
                false
            }
        });
        drop(engine);

        if reset {
            info!(%language, "Engine reset");
            Ok(())
        } else {
            Err(Error::InvalidRequest(format!(
                "{} engine is not in a failed state",
                language
            )))
        }
    }

    /// Stop every engine. Engines are unusable afterwards.
    pub async fn shutdown(&self) {
        for language in Language::ALL {
            let slot = self.slot(language);
            let mut engine = slot.engine.lock().await;
            if let Some(mut engine) = engine.take() {
                engine.shutdown().await;
                debug!(%language, "Engine stopped");
            }
            slot.state.send_if_modified(|state| {
                if *state == EngineState::Ready {
                    *state = EngineState::Failed("runtime shut down".into());
                    true
                } else {
                    false
                }
            });
        }
    }
}

/// Exclusive, scoped access to one ready engine; released on drop.
pub struct EngineLease {
    language: Language,
    guard: OwnedMutexGuard<Option<Box<dyn LanguageEngine>>>,
    slot: Arc<EngineSlot>,
    readiness: broadcast::Sender<ReadinessEvent>,
}

impl EngineLease {
    pub fn language(&self) -> Language {
        self.language
    }

    /// Run one submission. An engine-level error marks the engine `Failed`.
    pub async fn run(
        &mut self,
        code: &str,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, Error> {
        let language = self.language;
        let engine = self.guard.as_mut().ok_or_else(|| Error::EngineNotReady {
            language,
            reason: "engine unavailable".into(),
        })?;

        match engine.run(code, limits).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(%language, "Engine failed: {}", e);
                self.slot.state.send_replace(EngineState::Failed(e.to_string()));
                let _ = self.readiness.send(ReadinessEvent {
                    language,
                    ready: false,
                });
                Err(e)
            }
        }
    }
}
