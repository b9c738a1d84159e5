//! Go-live and go-dark orchestration.
//!
//! The remote platform is connected lazily through a factory so that an
//! authentication failure is reported as a stage of the run (and, on the stop
//! path, only after local transmission has been stopped).

use crate::alert::{AlertMessage, Notifier};
use crate::clock::Clock;
use crate::config::Config;
use crate::control::{ControlClient, ControlPlane};
use crate::error::{RctError, Result};
use crate::remote::{local_to_utc, BroadcastPlatform, GoDarkOutcome, LifecycleManager, LiveTarget};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tracing::{error, info, warn};

/// Local start is issued this long before the target time.
pub const SAFETY_BUFFER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    Reconcile,
    Connect,
    Start,
    Stop,
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Authenticate => "authenticate",
            Stage::Reconcile => "reconcile",
            Stage::Connect => "connect",
            Stage::Start => "start",
            Stage::Stop => "stop",
            Stage::Cleanup => "cleanup",
        })
    }
}

type StageResult<T> = std::result::Result<T, (Stage, RctError)>;

/// The occurrence of `start` (local wall-clock) closest to `now`, with the
/// local date it falls on.
pub fn nearest_start(
    now: DateTime<Utc>,
    start: NaiveTime,
    tz: &Tz,
) -> Result<(NaiveDate, DateTime<Utc>)> {
    let today = now.with_timezone(tz).date_naive();
    [today.pred_opt(), Some(today), today.succ_opt()]
        .into_iter()
        .flatten()
        .filter_map(|d| local_to_utc(d, start, tz).ok().map(|at| (d, at)))
        .min_by_key(|(_, at)| (*at - now).num_seconds().abs())
        .ok_or_else(|| {
            RctError::InvalidConfig(format!(
                "start time {} does not occur near {now}",
                start.format("%H:%M")
            ))
        })
}

/// Time left until `target - SAFETY_BUFFER`, or `None` if already past.
pub fn wait_before(target: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let buffer = chrono::Duration::from_std(SAFETY_BUFFER).ok()?;
    (target - buffer - now)
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
}

pub struct Sequencer<'a, C: ControlPlane> {
    control: ControlClient<'a, C>,
    config: &'a Config,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
}

impl<'a, C: ControlPlane> Sequencer<'a, C> {
    pub fn new(plane: C, config: &'a Config, clock: &'a dyn Clock, notifier: &'a dyn Notifier) -> Self {
        Self {
            control: ControlClient::new(plane, &config.control, clock),
            config,
            clock,
            notifier,
        }
    }

    fn lifecycle<P: BroadcastPlatform>(&self, platform: P) -> LifecycleManager<'a, P> {
        let config: &'a Config = self.config;
        LifecycleManager::new(
            platform,
            &config.broadcast,
            config.schedule.start,
            config.schedule.timezone,
        )
    }

    pub fn go_live<P, F>(&mut self, connect_remote: F) -> Result<LiveTarget>
    where
        P: BroadcastPlatform,
        F: FnOnce() -> Result<P>,
    {
        info!("--- starting stream process ---");
        self.run_go_live(connect_remote)
            .map_err(|(stage, e)| self.fail("go-live", stage, e))
    }

    fn run_go_live<P, F>(&mut self, connect_remote: F) -> StageResult<LiveTarget>
    where
        P: BroadcastPlatform,
        F: FnOnce() -> Result<P>,
    {
        let config: &'a Config = self.config;
        let schedule = &config.schedule;
        let now = self.clock.now();
        let (date, target) = nearest_start(now, schedule.start, &schedule.timezone)
            .map_err(|e| (Stage::Reconcile, e))?;
        info!(%date, target = %target.with_timezone(&schedule.timezone), "go-live target");

        let platform = connect_remote().map_err(|e| (Stage::Authenticate, e))?;
        let live = self
            .lifecycle(platform)
            .go_live(date, now)
            .map_err(|e| (Stage::Reconcile, e))?;

        if !self.control.connect() {
            return Err((
                Stage::Connect,
                RctError::ControlUnreachable {
                    endpoint: self.control.endpoint().display(),
                    reason: "connection failed".into(),
                },
            ));
        }
        self.control
            .set_ingestion_target(&live.stream.ingestion_key, &live.stream.ingestion_server_url);

        match wait_before(target, self.clock.now()) {
            Some(wait) => {
                info!("waiting {}s until {}s before start", wait.as_secs(), SAFETY_BUFFER.as_secs());
                self.clock.sleep(wait);
            }
            None => info!("start time already reached, starting immediately"),
        }

        if !self.control.start_transmission() {
            return Err((Stage::Start, RctError::TransmissionNotActive));
        }
        info!(broadcast = %live.broadcast.id, "stream started successfully");
        Ok(live)
    }

    pub fn go_dark<P, F>(&mut self, connect_remote: F) -> Result<GoDarkOutcome>
    where
        P: BroadcastPlatform,
        F: FnOnce() -> Result<P>,
    {
        info!("--- stopping stream process ---");
        self.run_go_dark(connect_remote)
            .map_err(|(stage, e)| self.fail("go-dark", stage, e))
    }

    fn run_go_dark<P, F>(&mut self, connect_remote: F) -> StageResult<GoDarkOutcome>
    where
        P: BroadcastPlatform,
        F: FnOnce() -> Result<P>,
    {
        if self.control.connect() {
            if !self.control.stop_transmission() {
                return Err((
                    Stage::Stop,
                    RctError::control("StopStream", "stream output did not stop"),
                ));
            }
        } else {
            warn!("control plane unreachable, nothing to stop");
        }

        let today = self
            .clock
            .now()
            .with_timezone(&self.config.schedule.timezone)
            .date_naive();
        let platform = connect_remote().map_err(|e| (Stage::Authenticate, e))?;
        let outcome = self
            .lifecycle(platform)
            .go_dark(today)
            .map_err(|e| (Stage::Cleanup, e))?;
        info!(tomorrow = %outcome.tomorrow.id, "stop stream sequence completed");
        Ok(outcome)
    }

    fn fail(&self, op: &str, stage: Stage, err: RctError) -> RctError {
        error!(%stage, "{op} failed: {err}");
        if !err.already_alerted() {
            self.notifier.send(&AlertMessage::new(
                format!("{op} failed at {stage} stage"),
                format!(
                    "Operation: {op}\nStage: {stage}\nCause: {err}\n\nTime: {}",
                    self.clock.now().format("%Y-%m-%d %H:%M:%S UTC")
                ),
            ));
        }
        err
    }
}
