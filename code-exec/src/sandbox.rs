//! Process-level capability sandbox for interpreter workers.
//!
//! A worker is spawned with a cleared environment, an empty private working
//! directory, pipes as its only I/O channels and kernel resource limits that
//! forbid writing files. On Linux it is additionally moved into fresh user and
//! network namespaces, so no network interface exists for it to reach.

use crate::{config::SandboxConfig, error::Error};
use std::{
    collections::VecDeque,
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    time,
};
use tracing::{debug, warn};
use uuid::Uuid;

const STDERR_TAIL_LINES: usize = 20;

/// What to launch inside the sandbox
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Resolved interpreter executable
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment on top of the minimal sandbox environment
    pub env: Vec<(String, String)>,
    /// RLIMIT_AS backstop in bytes, for interpreters that tolerate it
    pub address_space_limit: Option<u64>,
}

/// Kernel-enforced restrictions applied to every worker
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub isolate_network: bool,
    pub max_open_files: u64,
    /// RLIMIT_FSIZE; zero forbids writing any file
    pub max_file_size: u64,
    pub work_root: Option<PathBuf>,
}

impl From<&SandboxConfig> for SandboxPolicy {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            isolate_network: config.isolate_network,
            max_open_files: config.max_open_files,
            max_file_size: 0,
            work_root: config.work_root.clone(),
        }
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

/// Sandbox environment for one interpreter worker
pub struct Sandbox {
    /// Empty private working directory, removed on drop
    root_dir: TempDir,
    policy: SandboxPolicy,
    id: String,
}

impl Sandbox {
    /// Create a new sandbox environment
    pub fn new(policy: SandboxPolicy) -> Result<Self, Error> {
        let id = Uuid::new_v4().to_string();
        let mut builder = tempfile::Builder::new();
        builder.prefix("sandbox-");
        let root_dir = match &policy.work_root {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::Sandbox(format!("Failed to create sandbox directory: {}", e)))?;

        debug!(sandbox = %id, root = %root_dir.path().display(), "Created sandbox");
        Ok(Self {
            root_dir,
            policy,
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_dir(&self) -> PathBuf {
        self.root_dir.path().to_path_buf()
    }

    /// Build the restricted command for `launch` without spawning it.
    pub fn command(&self, launch: &LaunchSpec) -> Command {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .env_clear()
            .env("PATH", "/usr/bin:/bin")
            .env("HOME", self.root_dir.path())
            .env("LANG", "C.UTF-8")
            .envs(launch.env.iter().map(|(k, v)| (k, v)))
            .current_dir(self.root_dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            command.process_group(0);

            let file_size = self.policy.max_file_size;
            let open_files = self.policy.max_open_files;
            let address_space = launch.address_space_limit;
            let isolate_network = self.policy.isolate_network;

            // Runs in the forked child: only async-signal-safe syscalls here.
            unsafe {
                command.pre_exec(move || {
                    use nix::sys::resource::{getrlimit, setrlimit, Resource};

                    #[cfg(target_os = "linux")]
                    {
                        use nix::sched::{unshare, CloneFlags};
                        if isolate_network
                            && unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET)
                                .is_err()
                        {
                            let _ = unshare(CloneFlags::CLONE_NEWNET);
                        }
                    }
                    #[cfg(not(target_os = "linux"))]
                    let _ = isolate_network;

                    setrlimit(Resource::RLIMIT_FSIZE, file_size, file_size)?;
                    let (_, hard_files) = getrlimit(Resource::RLIMIT_NOFILE)?;
                    let open_files = open_files.min(hard_files);
                    setrlimit(Resource::RLIMIT_NOFILE, open_files, open_files)?;
                    setrlimit(Resource::RLIMIT_CORE, 0, 0)?;

                    #[cfg(target_os = "linux")]
                    {
                        if let Some(limit) = address_space {
                            let (_, hard_as) = getrlimit(Resource::RLIMIT_AS)?;
                            let limit = limit.min(hard_as);
                            setrlimit(Resource::RLIMIT_AS, limit, limit)?;
                        }
                    }
                    #[cfg(not(target_os = "linux"))]
                    let _ = address_space;

                    Ok(())
                });
            }
        }

        command
    }

    /// Spawn a worker inside this sandbox. The worker keeps the sandbox alive.
    pub fn spawn(self, launch: &LaunchSpec) -> Result<WorkerProcess, Error> {
        debug!(sandbox = %self.id, program = %launch.program.display(), args = ?launch.args, "Spawning worker");

        let mut child = self
            .command(launch)
            .spawn()
            .map_err(|e| Error::Sandbox(format!("Failed to spawn process: {}", e)))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Sandbox("Worker exited before it could be tracked".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Sandbox("Worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Sandbox("Worker stdout unavailable".into()))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        if let Some(stderr) = child.stderr.take() {
            let tail = stderr_tail.clone();
            let sandbox_id = self.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(sandbox = %sandbox_id, "worker stderr: {}", line);
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            });
        }

        let network_isolated = if self.policy.isolate_network {
            let isolated = network_namespace_differs(pid).unwrap_or(false);
            if !isolated {
                warn!(
                    sandbox = %self.id,
                    "Network namespace isolation unavailable; relying on interpreter-level denial"
                );
            }
            isolated
        } else {
            false
        };

        Ok(WorkerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            pid,
            stderr_tail,
            network_isolated,
            _sandbox: self,
        })
    }
}

/// A running interpreter worker and its protocol pipes
pub struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    pid: u32,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    network_isolated: bool,
    _sandbox: Sandbox,
}

impl WorkerProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn network_isolated(&self) -> bool {
        self.network_isolated
    }

    /// Write one protocol line to the worker.
    pub async fn send_line(&mut self, line: &str) -> Result<(), Error> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Next protocol line, or `None` once the worker closed its stdout.
    /// Cancel safe.
    pub async fn next_line(&mut self) -> Result<Option<String>, Error> {
        Ok(self.stdout.next_line().await?)
    }

    /// Last lines the worker wrote to stderr, for diagnostics.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    /// Forcibly stop the worker and everything in its process group.
    pub async fn terminate(mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            let _ = killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL);
        }
        let _ = self.child.start_kill();
        if let Err(e) = self.child.wait().await {
            warn!(pid = self.pid, "Failed to reap worker: {}", e);
        }
    }

    /// Close the protocol channel and give the worker a moment to exit on its own.
    pub async fn shutdown(mut self) {
        let _ = self.stdin.shutdown().await;
        match time::timeout(Duration::from_secs(1), self.child.wait()).await {
            Ok(_) => debug!(pid = self.pid, "Worker exited"),
            Err(_) => self.terminate().await,
        }
    }
}

/// Memory held by `pid` and its direct children, in bytes.
///
/// The worker itself is measured by its resident set. Children forked from it
/// share most pages copy-on-write, so only their private pages are added.
#[cfg(target_os = "linux")]
pub fn resident_bytes(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    let own = parse_vm_rss(&status)?;
    let children: u64 = child_pids(pid).into_iter().filter_map(private_bytes).sum();
    Some(own + children)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_bytes(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn child_pids(pid: u32) -> Vec<u32> {
    if let Ok(list) = std::fs::read_to_string(format!("/proc/{0}/task/{0}/children", pid)) {
        return list.split_whitespace().filter_map(|p| p.parse().ok()).collect();
    }

    // Kernels without CONFIG_PROC_CHILDREN: scan for processes naming `pid` as parent
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
        .filter(|candidate| {
            std::fs::read_to_string(format!("/proc/{}/stat", candidate))
                .ok()
                .and_then(|stat| parse_parent_pid(&stat))
                == Some(pid)
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn private_bytes(pid: u32) -> Option<u64> {
    match std::fs::read_to_string(format!("/proc/{}/smaps_rollup", pid)) {
        Ok(rollup) => parse_private(&rollup),
        Err(_) => {
            let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
            parse_vm_rss(&status)
        }
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(parse_kb)
}

fn parse_private(rollup: &str) -> Option<u64> {
    let fields: Vec<u64> = rollup
        .lines()
        .filter_map(|line| {
            line.strip_prefix("Private_Clean:")
                .or_else(|| line.strip_prefix("Private_Dirty:"))
        })
        .filter_map(parse_kb)
        .collect();
    (!fields.is_empty()).then(|| fields.iter().sum())
}

fn parse_kb(field: &str) -> Option<u64> {
    field
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse::<u64>()
        .ok()
        .map(|kb| kb * 1024)
}

/// Parent pid from a `/proc/<pid>/stat` line. The command name may itself
/// contain spaces and parentheses, so fields are counted from the last `)`.
fn parse_parent_pid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// Whether `pid` lives in a different network namespace than this process.
#[cfg(target_os = "linux")]
fn network_namespace_differs(pid: u32) -> Option<bool> {
    let own = std::fs::read_link("/proc/self/ns/net").ok()?;
    let worker = std::fs::read_link(format!("/proc/{}/ns/net", pid)).ok()?;
    Some(own != worker)
}

#[cfg(not(target_os = "linux"))]
fn network_namespace_differs(_pid: u32) -> Option<bool> {
    None
}
