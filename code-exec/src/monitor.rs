//! Wall-clock and memory watchdog for one in-flight execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    sandbox,
    types::{ExecutionLimits, Termination},
};

/// Source of the current memory footprint of a running execution.
pub trait MemorySampler: Send + Sync + 'static {
    /// Resident bytes right now, or `None` when it cannot be observed.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads resident memory of a worker process from procfs
pub struct ProcessMemorySampler {
    pid: u32,
}

impl ProcessMemorySampler {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn resident_bytes(&self) -> Option<u64> {
        sandbox::resident_bytes(self.pid)
    }
}

/// First ceiling breach, with the instant it was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breach {
    pub cause: Termination,
    pub at: Instant,
}

/// What the monitor observed over the whole execution
#[derive(Debug, Clone, Copy)]
pub struct MonitorReport {
    pub peak_memory_bytes: u64,
    pub breach: Option<Breach>,
}

pub struct ResourceMonitor;

impl ResourceMonitor {
    /// Start watching an execution that begins now.
    pub fn start(
        sampler: Arc<dyn MemorySampler>,
        limits: ExecutionLimits,
        interval: Duration,
    ) -> MonitorHandle {
        let started = Instant::now();
        let (signal_tx, signal_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(watch_execution(
            sampler, limits, interval, started, signal_tx, stop_rx,
        ));

        MonitorHandle {
            started,
            signal: signal_rx,
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running monitor
pub struct MonitorHandle {
    started: Instant,
    signal: watch::Receiver<Option<Breach>>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<MonitorReport>,
}

impl MonitorHandle {
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Resolves once a ceiling is breached; never resolves otherwise.
    /// Cancel safe.
    pub async fn tripped(&mut self) -> Breach {
        loop {
            if let Some(breach) = *self.signal.borrow_and_update() {
                return breach;
            }
            if self.signal.changed().await.is_err() {
                // Monitor finished without a breach
                std::future::pending::<()>().await;
            }
        }
    }

    /// Stop monitoring and collect the report.
    pub async fn finish(mut self) -> MonitorReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                warn!("Resource monitor task failed: {}", e);
                MonitorReport {
                    peak_memory_bytes: 0,
                    breach: *self.signal.borrow(),
                }
            }
        }
    }
}

async fn watch_execution(
    sampler: Arc<dyn MemorySampler>,
    limits: ExecutionLimits,
    interval: Duration,
    started: Instant,
    signal: watch::Sender<Option<Breach>>,
    mut stop: oneshot::Receiver<()>,
) -> MonitorReport {
    let baseline = sampler.resident_bytes();
    if baseline.is_none() {
        debug!("Memory footprint not observable; relying on backstop limits");
    }
    let baseline = baseline.unwrap_or(0);
    let footprint = |sampler: &dyn MemorySampler| {
        sampler
            .resident_bytes()
            .map(|now| now.saturating_sub(baseline))
            .unwrap_or(0)
    };

    let deadline = time::Instant::from_std(started + limits.timeout);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut peak = 0u64;
    let breach = loop {
        tokio::select! {
            biased;
            _ = &mut stop => break None,
            _ = time::sleep_until(deadline) => {
                break Some(Breach { cause: Termination::TimedOut, at: Instant::now() });
            }
            _ = ticker.tick() => {
                let used = footprint(sampler.as_ref());
                peak = peak.max(used);
                if used > limits.memory_limit_bytes {
                    break Some(Breach { cause: Termination::MemoryExceeded, at: Instant::now() });
                }
            }
        }
    };

    if let Some(breach) = breach {
        debug!(cause = ?breach.cause, elapsed = ?started.elapsed(), "Resource ceiling breached");
        let _ = signal.send(Some(breach));
    } else {
        peak = peak.max(footprint(sampler.as_ref()));
    }

    MonitorReport {
        peak_memory_bytes: peak,
        breach,
    }
}
