//! In-memory fakes for the trait seams. Each fake is cheaply cloneable and
//! clones share state, so a test can hand one copy to the component under
//! test and inspect the other.

use crate::alert::{AlertMessage, Notifier};
use crate::clock::Clock;
use crate::config::{BroadcastConfig, Config, ControlConfig, PrivacyStatus};
use crate::control::{ControlEndpoint, ControlPlane};
use crate::error::{RctError, Result};
use crate::host::Host;
use crate::remote::{Broadcast, BroadcastPlatform, LifecycleState, Stream};
use crate::scheduler::TaskScheduler;
use chrono::{DateTime, NaiveDate, Utc};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Matches a recorded call by exact text or by its leading word.
fn matches_call(call: &str, name: &str) -> bool {
    call == name || call.split(' ').next() == Some(name)
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Cross-fake ordering log.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.borrow().iter().position(|e| matches_call(e, name))
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct FakeClock {
    now: Cell<DateTime<Utc>>,
    sleeps: RefCell<Vec<Duration>>,
    log: Option<EventLog>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
            sleeps: RefCell::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: &EventLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        self.now.set(self.now.get() + step);
        if let Some(log) = &self.log {
            log.push(format!("sleep {}", duration.as_secs()));
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<AlertMessage>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, message: &AlertMessage) {
        self.sent.borrow_mut().push(message.clone());
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

pub fn config(root: &Path) -> Config {
    Config::from_vars(root, &HashMap::new()).unwrap()
}

pub fn control_config(media: Option<&str>) -> ControlConfig {
    let mut control = config(Path::new("/tmp")).control;
    control.media_source = media.map(str::to_string);
    control
}

pub fn broadcast_config() -> BroadcastConfig {
    BroadcastConfig {
        title: "Radio Calisthenics Together".into(),
        description: "Daily morning exercise".into(),
        privacy: PrivacyStatus::Public,
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HostState {
    probes: u32,
    alive_after: Option<u32>,
    running: Vec<String>,
    launch_fails: Vec<String>,
    launches: Vec<String>,
}

/// Runtime is down and no apps are running unless configured otherwise.
#[derive(Clone, Default)]
pub struct FakeHost(Rc<RefCell<HostState>>);

impl FakeHost {
    pub fn runtime_up(self) -> Self {
        self.runtime_up_after(0)
    }

    /// The runtime probe starts succeeding once `probes` probes have failed.
    pub fn runtime_up_after(self, probes: u32) -> Self {
        self.0.borrow_mut().alive_after = Some(probes);
        self
    }

    pub fn running(self, app: &str) -> Self {
        self.0.borrow_mut().running.push(app.to_string());
        self
    }

    pub fn launch_fails(self, app: &str) -> Self {
        self.0.borrow_mut().launch_fails.push(app.to_string());
        self
    }

    pub fn launches(&self) -> Vec<String> {
        self.0.borrow().launches.clone()
    }

    pub fn probes(&self) -> u32 {
        self.0.borrow().probes
    }
}

impl Host for FakeHost {
    fn runtime_alive(&self) -> bool {
        let mut s = self.0.borrow_mut();
        let alive = s.alive_after.is_some_and(|n| s.probes >= n);
        s.probes += 1;
        alive
    }

    fn launch_app(&self, app: &str) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.launches.push(app.to_string());
        if s.launch_fails.iter().any(|a| a == app) {
            return Err(RctError::LaunchFailed {
                app: app.to_string(),
                reason: "Unable to find application".into(),
            });
        }
        s.running.push(app.to_string());
        Ok(())
    }

    fn app_running(&self, app: &str) -> bool {
        self.0.borrow().running.iter().any(|a| a == app)
    }
}

// ---------------------------------------------------------------------------
// TaskScheduler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SchedulerState {
    loaded: Vec<String>,
    load_fails: Vec<String>,
    list_fails: bool,
    loads: Vec<PathBuf>,
    calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeScheduler(Rc<RefCell<SchedulerState>>);

impl FakeScheduler {
    pub fn with_loaded(self, labels: &[String]) -> Self {
        self.0.borrow_mut().loaded.extend(labels.iter().cloned());
        self
    }

    pub fn load_fails(self, label: &str) -> Self {
        self.0.borrow_mut().load_fails.push(label.to_string());
        self
    }

    pub fn list_fails(self) -> Self {
        self.0.borrow_mut().list_fails = true;
        self
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.0.borrow().loads.clone()
    }

    /// `load <path>` / `unload <path>` in call order.
    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }
}

fn label_of(path: &Path) -> String {
    path.file_stem()
        .map(|l| l.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl TaskScheduler for FakeScheduler {
    fn list(&self) -> Result<Vec<String>> {
        let s = self.0.borrow();
        if s.list_fails {
            return Err(RctError::Scheduler("launchctl list exited with 1".into()));
        }
        Ok(s.loaded.clone())
    }

    fn load(&self, path: &Path) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.loads.push(path.to_path_buf());
        s.calls.push(format!("load {}", path.display()));
        let label = label_of(path);
        if s.load_fails.contains(&label) || s.loaded.contains(&label) {
            return Err(RctError::Scheduler(format!(
                "Load failed: 5: Input/output error ({label})"
            )));
        }
        s.loaded.push(label);
        Ok(())
    }

    fn unload(&self, path: &Path) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(format!("unload {}", path.display()));
        let label = label_of(path);
        s.loaded.retain(|l| *l != label);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ControlPlane
// ---------------------------------------------------------------------------

struct PlaneState {
    calls: Vec<String>,
    unreachable: bool,
    transmitting: bool,
    start_ignored: bool,
    fail_on: Vec<String>,
    scene: String,
    log: Option<EventLog>,
}

impl Default for PlaneState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            unreachable: false,
            transmitting: false,
            start_ignored: false,
            fail_on: Vec::new(),
            scene: "RADIO_TAISO_LOOP".into(),
            log: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeControlPlane(Rc<RefCell<PlaneState>>);

impl FakeControlPlane {
    pub fn unreachable(self) -> Self {
        self.0.borrow_mut().unreachable = true;
        self
    }

    pub fn transmitting(self) -> Self {
        self.0.borrow_mut().transmitting = true;
        self
    }

    pub fn start_is_ignored(self) -> Self {
        self.0.borrow_mut().start_ignored = true;
        self
    }

    pub fn fail_on(self, request: &str) -> Self {
        self.0.borrow_mut().fail_on.push(request.to_string());
        self
    }

    pub fn with_log(self, log: &EventLog) -> Self {
        self.0.borrow_mut().log = Some(log.clone());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|c| matches_call(c, name))
            .count()
    }

    pub fn is_transmitting(&self) -> bool {
        self.0.borrow().transmitting
    }

    fn record(&self, call: String) -> Result<()> {
        let mut s = self.0.borrow_mut();
        let name = call.split(' ').next().unwrap_or_default().to_string();
        if let Some(log) = &s.log {
            log.push(call.clone());
        }
        s.calls.push(call);
        if s.unreachable && name == "connect" {
            return Err(RctError::ControlUnreachable {
                endpoint: "ws://127.0.0.1:4455".into(),
                reason: "Connection refused (os error 61)".into(),
            });
        }
        if s.fail_on.contains(&name) {
            return Err(RctError::control(&name, "injected failure"));
        }
        Ok(())
    }
}

impl ControlPlane for FakeControlPlane {
    fn connect(&mut self, _endpoint: &ControlEndpoint) -> Result<()> {
        self.record("connect".into())
    }

    fn get_version(&mut self) -> Result<String> {
        self.record("get_version".into())?;
        Ok("5.4.2".into())
    }

    fn set_current_scene(&mut self, scene: &str) -> Result<()> {
        self.record(format!("set_current_scene {scene}"))?;
        self.0.borrow_mut().scene = scene.to_string();
        Ok(())
    }

    fn get_current_scene(&mut self) -> Result<String> {
        self.record("get_current_scene".into())?;
        Ok(self.0.borrow().scene.clone())
    }

    fn get_scene_item_id(&mut self, scene: &str, source: &str) -> Result<i64> {
        self.record(format!("get_scene_item_id {scene} {source}"))?;
        Ok(7)
    }

    fn set_scene_item_enabled(&mut self, _scene: &str, item_id: i64, enabled: bool) -> Result<()> {
        self.record(format!("set_scene_item_enabled {item_id} {enabled}"))
    }

    fn trigger_media_restart(&mut self, input: &str) -> Result<()> {
        self.record(format!("trigger_media_restart {input}"))
    }

    fn get_stream_status(&mut self) -> Result<bool> {
        self.record("get_stream_status".into())?;
        Ok(self.0.borrow().transmitting)
    }

    fn start_stream(&mut self) -> Result<()> {
        self.record("start_stream".into())?;
        let mut s = self.0.borrow_mut();
        if !s.start_ignored {
            s.transmitting = true;
        }
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.record("stop_stream".into())?;
        self.0.borrow_mut().transmitting = false;
        Ok(())
    }

    fn set_ingestion_target(&mut self, key: &str, server_url: &str) -> Result<()> {
        self.record(format!("set_ingestion_target {server_url} {key}"))
    }
}

// ---------------------------------------------------------------------------
// BroadcastPlatform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PlatformState {
    broadcasts: Vec<Broadcast>,
    bindings: Vec<(String, String)>,
    calls: Vec<String>,
    fail_on: Vec<String>,
    next_id: u32,
    log: Option<EventLog>,
}

impl PlatformState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

#[derive(Clone, Default)]
pub struct FakePlatform(Rc<RefCell<PlatformState>>);

impl FakePlatform {
    pub fn fail_on(self, call: &str) -> Self {
        self.0.borrow_mut().fail_on.push(call.to_string());
        self
    }

    pub fn with_log(self, log: &EventLog) -> Self {
        self.0.borrow_mut().log = Some(log.clone());
        self
    }

    /// Add an upcoming broadcast and return its id.
    pub fn seed(&self, title: &str) -> String {
        let mut s = self.0.borrow_mut();
        let id = s.next("b");
        s.broadcasts.push(Broadcast {
            id: id.clone(),
            title: title.to_string(),
            scheduled_start: None,
            privacy: Some(PrivacyStatus::Public),
            state: LifecycleState::Upcoming,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<Broadcast> {
        self.0.borrow().broadcasts.iter().find(|b| b.id == id).cloned()
    }

    pub fn upcoming_for(&self, date: NaiveDate) -> Vec<Broadcast> {
        self.0
            .borrow()
            .broadcasts
            .iter()
            .filter(|b| is_upcoming(b) && b.is_dated(date))
            .cloned()
            .collect()
    }

    pub fn bindings(&self) -> Vec<(String, String)> {
        self.0.borrow().bindings.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.borrow().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|c| matches_call(c, name))
            .count()
    }

    fn record(&self, call: String) -> Result<()> {
        let mut s = self.0.borrow_mut();
        let name = call.split(' ').next().unwrap_or_default().to_string();
        if let Some(log) = &s.log {
            log.push(call.clone());
        }
        s.calls.push(call);
        if s.fail_on.contains(&name) {
            return Err(RctError::RemoteApi {
                status: 403,
                message: "quotaExceeded".into(),
            });
        }
        Ok(())
    }
}

fn is_upcoming(b: &Broadcast) -> bool {
    matches!(b.state, LifecycleState::Upcoming | LifecycleState::Bound)
}

impl BroadcastPlatform for FakePlatform {
    fn list_upcoming(&self) -> Result<Vec<Broadcast>> {
        self.record("list_upcoming".into())?;
        Ok(self
            .0
            .borrow()
            .broadcasts
            .iter()
            .filter(|b| is_upcoming(b))
            .take(20)
            .cloned()
            .collect())
    }

    fn create_broadcast(
        &self,
        title: &str,
        _description: &str,
        start: DateTime<Utc>,
        privacy: PrivacyStatus,
    ) -> Result<Broadcast> {
        self.record(format!("create_broadcast {title}"))?;
        let mut s = self.0.borrow_mut();
        let b = Broadcast {
            id: s.next("b"),
            title: title.to_string(),
            scheduled_start: Some(start),
            privacy: Some(privacy),
            state: LifecycleState::Upcoming,
        };
        s.broadcasts.push(b.clone());
        Ok(b)
    }

    fn create_stream(&self, label: &str) -> Result<Stream> {
        self.record(format!("create_stream {label}"))?;
        let mut s = self.0.borrow_mut();
        let id = s.next("s");
        Ok(Stream {
            ingestion_key: format!("key-{id}"),
            ingestion_server_url: "rtmp://a.rtmp.youtube.com/live2".into(),
            id,
        })
    }

    fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<()> {
        self.record(format!("bind {broadcast_id} {stream_id}"))?;
        let mut s = self.0.borrow_mut();
        if let Some(b) = s.broadcasts.iter_mut().find(|b| b.id == broadcast_id) {
            b.state = LifecycleState::Bound;
        }
        s.bindings
            .push((broadcast_id.to_string(), stream_id.to_string()));
        Ok(())
    }

    fn update_broadcast(&self, id: &str, title: &str, start: DateTime<Utc>) -> Result<()> {
        self.record(format!("update_broadcast {id}"))?;
        let mut s = self.0.borrow_mut();
        let Some(b) = s.broadcasts.iter_mut().find(|b| b.id == id) else {
            return Err(RctError::RemoteApi {
                status: 404,
                message: "liveBroadcastNotFound".into(),
            });
        };
        b.title = title.to_string();
        b.scheduled_start = Some(start);
        Ok(())
    }

    fn delete_broadcast(&self, id: &str) -> Result<()> {
        self.record(format!("delete_broadcast {id}"))?;
        let mut s = self.0.borrow_mut();
        if let Some(b) = s.broadcasts.iter_mut().find(|b| b.id == id) {
            b.state = LifecycleState::Deleted;
        }
        Ok(())
    }
}
