//! Launch plumbing shared by the Node.js based runtimes.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{error::Error, sandbox::LaunchSpec, types::Language};

const DRIVER: &str = include_str!("drivers/node_driver.js");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct NodeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl NodeVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        let re = Regex::new(r"v?(\d+)\.(\d+)\.(\d+)").ok()?;
        let caps = re.captures(raw.trim())?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
        })
    }

    /// Flag enabling the process permission model, if this release has one.
    pub fn permission_flag(&self) -> Option<&'static str> {
        let stable = match self.major {
            22 => self.minor >= 13,
            23 => self.minor >= 5,
            major => major >= 24,
        };
        if stable {
            Some("--permission")
        } else if self.major >= 20 {
            Some("--experimental-permission")
        } else {
            None
        }
    }

    /// Whether `module.stripTypeScriptTypes` is built in.
    pub fn strips_typescript(&self) -> bool {
        match self.major {
            22 => self.minor >= 13,
            23 => self.minor >= 2,
            major => major >= 24,
        }
    }
}

pub(crate) async fn detect_version(program: &Path) -> Result<NodeVersion, Error> {
    let output = Command::new(program)
        .arg("--version")
        .env_clear()
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::Initialization(format!("Failed to query Node.js version: {}", e)))?;

    let raw = String::from_utf8_lossy(&output.stdout);
    let version = NodeVersion::parse(&raw).ok_or_else(|| {
        Error::Initialization(format!("Unrecognized Node.js version output: {}", raw.trim()))
    })?;
    debug!(program = %program.display(), ?version, "Detected Node.js");
    Ok(version)
}

/// Build the sandboxed worker launch for a Node.js driver.
pub(crate) fn launch_spec(
    program: PathBuf,
    version: NodeVersion,
    language: Language,
    heap_limit_mb: u64,
    typescript_package: Option<&Path>,
) -> LaunchSpec {
    let mut args = vec!["--disallow-code-generation-from-strings".to_string()];
    match version.permission_flag() {
        Some(flag) => {
            args.push(flag.to_string());
            if let Some(package) = typescript_package {
                // Experimental releases only match directory contents by wildcard
                let suffix = if flag == "--permission" { "" } else { "/*" };
                args.push(format!("--allow-fs-read={}{}", package.display(), suffix));
            }
        }
        None => warn!(
            "Node.js {}.{} has no permission model; relying on context isolation",
            version.major, version.minor
        ),
    }
    if heap_limit_mb > 0 {
        args.push(format!("--max-old-space-size={}", heap_limit_mb));
    }
    args.push("-e".to_string());
    args.push(DRIVER.to_string());

    let mut env = vec![("SANDBOX_LANGUAGE".to_string(), language.as_str().to_string())];
    if let Some(package) = typescript_package {
        env.push(("SANDBOX_TS_PATH".to_string(), package.display().to_string()));
    }

    LaunchSpec {
        program,
        args,
        env,
        // V8 reserves large virtual regions up front; RLIMIT_AS would break it
        address_space_limit: None,
    }
}
