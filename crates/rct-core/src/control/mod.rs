//! Local audio/video control plane.
//!
//! [`ControlPlane`] is the raw request surface of the capture application;
//! [`ControlClient`] layers the session rules on top of it: idempotent
//! connect/start/stop, a best-effort media refresh before going live, and a
//! `status()` that never fails.

mod obs;

pub use obs::ObsWebSocket;

use crate::clock::Clock;
use crate::config::ControlConfig;
use crate::error::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

const MEDIA_HIDE_PAUSE: Duration = Duration::from_millis(500);
const START_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ControlEndpoint {
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub timeout: Duration,
}

impl ControlEndpoint {
    pub fn display(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ControlConfig> for ControlEndpoint {
    fn from(c: &ControlConfig) -> Self {
        Self {
            host: c.host.clone(),
            port: c.port,
            secret: c.password.clone(),
            timeout: c.timeout,
        }
    }
}

pub trait ControlPlane {
    fn connect(&mut self, endpoint: &ControlEndpoint) -> Result<()>;
    fn get_version(&mut self) -> Result<String>;
    fn set_current_scene(&mut self, scene: &str) -> Result<()>;
    fn get_current_scene(&mut self) -> Result<String>;
    fn get_scene_item_id(&mut self, scene: &str, source: &str) -> Result<i64>;
    fn set_scene_item_enabled(&mut self, scene: &str, item_id: i64, enabled: bool) -> Result<()>;
    fn trigger_media_restart(&mut self, input: &str) -> Result<()>;
    /// True while the stream output is active.
    fn get_stream_status(&mut self) -> Result<bool>;
    fn start_stream(&mut self) -> Result<()>;
    fn stop_stream(&mut self) -> Result<()>;
    fn set_ingestion_target(&mut self, key: &str, server_url: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlStatus {
    pub reachable: bool,
    pub transmitting: bool,
    pub current_scene: String,
}

impl ControlStatus {
    fn unreachable() -> Self {
        Self {
            reachable: false,
            transmitting: false,
            current_scene: "unknown".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ControlClient
// ---------------------------------------------------------------------------

pub struct ControlClient<'a, P: ControlPlane> {
    plane: P,
    endpoint: ControlEndpoint,
    scene: String,
    media_source: Option<String>,
    clock: &'a dyn Clock,
    connected: bool,
}

impl<'a, P: ControlPlane> ControlClient<'a, P> {
    pub fn new(plane: P, config: &ControlConfig, clock: &'a dyn Clock) -> Self {
        Self {
            plane,
            endpoint: ControlEndpoint::from(config),
            scene: config.scene.clone(),
            media_source: config.media_source.clone(),
            clock,
            connected: false,
        }
    }

    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Connect once; later calls are no-ops while the session is up.
    pub fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let result = self
            .plane
            .connect(&self.endpoint)
            .and_then(|_| self.plane.get_version());
        match result {
            Ok(version) => {
                info!(endpoint = %self.endpoint.display(), %version, "connected to control plane");
                self.connected = true;
                true
            }
            Err(e) => {
                error!(endpoint = %self.endpoint.display(), "failed to connect to control plane: {e}");
                false
            }
        }
    }

    pub fn start_transmission(&mut self) -> bool {
        if !self.connect() {
            return false;
        }

        info!(scene = %self.scene, "preparing scene");
        let scene = self.scene.clone();
        if let Err(e) = self.plane.set_current_scene(&scene) {
            error!("start stream error: could not select scene '{scene}': {e}");
            return false;
        }

        self.refresh_media();

        match self.plane.get_stream_status() {
            Ok(true) => {
                info!("stream is already active");
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                error!("start stream error: status probe failed: {e}");
                return false;
            }
        }

        info!("starting stream output");
        if let Err(e) = self.plane.start_stream() {
            error!("start stream error: {e}");
            return false;
        }

        self.clock.sleep(START_SETTLE_DELAY);
        match self.plane.get_stream_status() {
            Ok(true) => {
                info!("stream output confirmed active");
                true
            }
            Ok(false) => {
                error!("stream output still inactive after start");
                false
            }
            Err(e) => {
                error!("could not confirm stream start: {e}");
                false
            }
        }
    }

    pub fn stop_transmission(&mut self) -> bool {
        if !self.connect() {
            return false;
        }
        match self.plane.get_stream_status() {
            Ok(false) => {
                info!("stream is already stopped");
                true
            }
            Ok(true) => {
                info!("stopping stream output");
                match self.plane.stop_stream() {
                    Ok(()) => true,
                    Err(e) => {
                        error!("stop stream error: {e}");
                        false
                    }
                }
            }
            Err(e) => {
                error!("stop stream error: status probe failed: {e}");
                false
            }
        }
    }

    pub fn set_scene(&mut self, name: &str) -> bool {
        if !self.connect() {
            return false;
        }
        match self.plane.set_current_scene(name) {
            Ok(()) => true,
            Err(e) => {
                error!("set scene error: {e}");
                false
            }
        }
    }

    pub fn set_media_visible(&mut self, scene: &str, source: &str, visible: bool) -> bool {
        if !self.connect() {
            return false;
        }
        match self.toggle_item(scene, source, visible) {
            Ok(()) => true,
            Err(e) => {
                error!("set media visibility error: {e}");
                false
            }
        }
    }

    fn toggle_item(&mut self, scene: &str, source: &str, visible: bool) -> Result<()> {
        let item_id = self.plane.get_scene_item_id(scene, source)?;
        self.plane.set_scene_item_enabled(scene, item_id, visible)
    }

    /// Point the stream output at a fresh ingestion endpoint. Failure is only
    /// a warning: the capture application keeps its persisted target.
    pub fn set_ingestion_target(&mut self, key: &str, server_url: &str) -> bool {
        if !self.connect() {
            return false;
        }
        match self.plane.set_ingestion_target(key, server_url) {
            Ok(()) => {
                info!(server = %server_url, "updated stream ingestion target");
                true
            }
            Err(e) => {
                warn!("could not update ingestion target, keeping persisted settings: {e}");
                false
            }
        }
    }

    pub fn status(&mut self) -> ControlStatus {
        if !self.connect() {
            return ControlStatus::unreachable();
        }
        let probe = self
            .plane
            .get_stream_status()
            .and_then(|active| Ok((active, self.plane.get_current_scene()?)));
        match probe {
            Ok((transmitting, current_scene)) => ControlStatus {
                reachable: true,
                transmitting,
                current_scene,
            },
            Err(e) => {
                warn!("status probe failed: {e}");
                ControlStatus::unreachable()
            }
        }
    }

    /// Hide, restart and re-show the media source so the stream does not
    /// begin on a stale frame. Each step is best-effort.
    fn refresh_media(&mut self) {
        let Some(source) = self.media_source.clone() else {
            info!("no media source configured for restart");
            return;
        };
        let scene = self.scene.clone();
        info!(source = %source, "force refreshing media source");

        if let Err(e) = self.toggle_item(&scene, &source, false) {
            warn!("media refresh: hide failed: {e}");
        }
        self.clock.sleep(MEDIA_HIDE_PAUSE);
        if let Err(e) = self.plane.trigger_media_restart(&source) {
            warn!("media refresh: restart failed: {e}");
        }
        if let Err(e) = self.toggle_item(&scene, &source, true) {
            warn!("media refresh: show failed: {e}");
        }
    }
}
