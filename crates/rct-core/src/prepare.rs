//! Pre-flight bring-up of the container runtime and the capture application.
//!
//! [`Preparator::ensure_ready`] either returns `Ok` or has already sent
//! exactly one alert describing why it gave up.

use crate::alert::{AlertMessage, Notifier};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{RctError, Result};
use crate::host::Host;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Launch-and-poll attempts before giving up.
    pub attempts: u32,
    /// Wait after failed attempt `n` (0-based). No wait follows the last one.
    pub backoff: Vec<Duration>,
    pub poll_interval: Duration,
    pub polls_per_attempt: u32,
    /// Pause after launching the capture application.
    pub capture_grace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: vec![Duration::from_secs(10), Duration::from_secs(20)],
            poll_interval: Duration::from_secs(2),
            polls_per_attempt: 90,
            capture_grace: Duration::from_secs(5),
        }
    }
}

pub struct Preparator<'a> {
    host: &'a dyn Host,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
    runtime_app: &'a str,
    capture_app: &'a str,
    policy: RetryPolicy,
}

impl<'a> Preparator<'a> {
    pub fn new(
        config: &'a Config,
        host: &'a dyn Host,
        clock: &'a dyn Clock,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            host,
            clock,
            notifier,
            runtime_app: &config.runtime_app,
            capture_app: &config.capture_app,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn ensure_ready(&self) -> Result<()> {
        info!("--- checking environment pre-flight ---");
        self.ensure_runtime()?;
        self.ensure_capture_app()?;
        info!("--- environment preparation complete ---");
        Ok(())
    }

    fn ensure_runtime(&self) -> Result<()> {
        if self.host.runtime_alive() {
            info!("{} is already running", self.runtime_app);
            return Ok(());
        }

        let attempts = self.policy.attempts;
        for attempt in 0..attempts {
            info!("{} startup attempt {}/{attempts}", self.runtime_app, attempt + 1);
            if let Err(e) = self.host.launch_app(self.runtime_app) {
                // The app may still be coming up from an earlier launch.
                warn!("{e}");
            }
            if self.wait_for_runtime() {
                info!("{} started successfully", self.runtime_app);
                return Ok(());
            }
            if attempt + 1 < attempts {
                let pause = self
                    .policy
                    .backoff
                    .get(attempt as usize)
                    .or(self.policy.backoff.last())
                    .copied()
                    .unwrap_or_default();
                warn!(
                    "{} failed to start, retrying in {}s",
                    self.runtime_app,
                    pause.as_secs()
                );
                self.clock.sleep(pause);
            }
        }

        error!("{} failed to start after all retries", self.runtime_app);
        self.notifier.send(&AlertMessage::new(
            format!("{} failed to start", self.runtime_app),
            format!(
                "{} did not become ready after {attempts} launch attempts.\n\
                 Manual intervention is required.\n\nTime: {}",
                self.runtime_app,
                self.clock.now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ));
        Err(RctError::RuntimeUnavailable { attempts })
    }

    fn wait_for_runtime(&self) -> bool {
        info!("waiting for {} to be ready", self.runtime_app);
        for _ in 0..self.policy.polls_per_attempt {
            if self.host.runtime_alive() {
                return true;
            }
            self.clock.sleep(self.policy.poll_interval);
        }
        warn!("Timed out waiting for {}", self.runtime_app);
        false
    }

    fn ensure_capture_app(&self) -> Result<()> {
        if self.host.app_running(self.capture_app) {
            info!("{} is already running", self.capture_app);
            return Ok(());
        }
        info!("{} is not running, launching", self.capture_app);
        if let Err(e) = self.host.launch_app(self.capture_app) {
            error!("{e}");
            self.notifier.send(&AlertMessage::new(
                format!("{} failed to launch", self.capture_app),
                format!(
                    "The capture application could not be launched: {e}\n\nTime: {}",
                    self.clock.now().format("%Y-%m-%d %H:%M:%S UTC")
                ),
            ));
            return Err(e);
        }
        self.clock.sleep(self.policy.capture_grace);
        Ok(())
    }
}
