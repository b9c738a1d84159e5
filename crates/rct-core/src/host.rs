//! Host process probes and application launches.
//!
//! The container runtime is probed with `docker info` rather than by process
//! name: Docker Desktop runs under helper names such as `com.docker.backend`,
//! so `pgrep -x Docker` reports false negatives.

use crate::error::{RctError, Result};
use crate::scheduler::JOB_PATH_DIRS;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Find `docker` on `PATH`, then in the Docker Desktop and Homebrew install
/// locations a launchd job's minimal `PATH` leaves out.
pub fn locate_docker(path: Option<&str>, home: Option<&str>) -> Option<PathBuf> {
    let mut dirs: Vec<String> = path
        .unwrap_or_default()
        .split(':')
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(home) = home {
        dirs.push(format!("{home}/.docker/bin"));
    }
    dirs.extend(JOB_PATH_DIRS.iter().map(|d| d.to_string()));
    which::which_in("docker", Some(dirs.join(":")), "/").ok()
}

pub trait Host {
    /// True if the container runtime answers a status request.
    fn runtime_alive(&self) -> bool;
    /// Launch a desktop application by name.
    fn launch_app(&self, app: &str) -> Result<()>;
    /// True if a process with exactly this name is running.
    fn app_running(&self, app: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn runtime_alive(&self) -> bool {
        let path = std::env::var("PATH").ok();
        let home = std::env::var("HOME").ok();
        let Some(docker) = locate_docker(path.as_deref(), home.as_deref()) else {
            debug!("docker binary not found");
            return false;
        };
        Command::new(docker)
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn launch_app(&self, app: &str) -> Result<()> {
        let status = Command::new("open")
            .args(["-a", app])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| RctError::LaunchFailed {
                app: app.to_string(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            return Err(RctError::LaunchFailed {
                app: app.to_string(),
                reason: format!("open exited with {:?}", status.code()),
            });
        }
        Ok(())
    }

    fn app_running(&self, app: &str) -> bool {
        Command::new("pgrep")
            .args(["-x", app])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
