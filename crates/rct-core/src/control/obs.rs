//! OBS WebSocket v5 transport.
//!
//! Handshake: server `Hello` (op 0) → client `Identify` (op 1) → server
//! `Identified` (op 2). Requests are op 6 and answered by op 7 carrying the
//! same `requestId`. Events (op 5) are not subscribed to and are skipped if
//! they arrive anyway.

use super::{ControlEndpoint, ControlPlane};
use crate::error::{RctError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::net::{TcpStream, ToSocketAddrs};
use tracing::debug;
use tungstenite::{Message, WebSocket};

const RPC_VERSION: u64 = 1;
const OP_HELLO: u64 = 0;
const OP_IDENTIFY: u64 = 1;
const OP_IDENTIFIED: u64 = 2;
const OP_REQUEST: u64 = 6;
const OP_REQUEST_RESPONSE: u64 = 7;

const MEDIA_ACTION_RESTART: &str = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART";

#[derive(Default)]
pub struct ObsWebSocket {
    socket: Option<WebSocket<TcpStream>>,
}

impl ObsWebSocket {
    pub fn new() -> Self {
        Self::default()
    }

    fn request(&mut self, request_type: &str, data: Value) -> Result<Value> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| RctError::control(request_type, "not connected"))?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let mut d = json!({ "requestType": request_type, "requestId": request_id });
        if !data.is_null() {
            d["requestData"] = data;
        }
        send(socket, json!({ "op": OP_REQUEST, "d": d }))
            .map_err(|e| RctError::control(request_type, e))?;

        loop {
            let frame = read_frame(socket).map_err(|e| RctError::control(request_type, e))?;
            if frame["op"].as_u64() != Some(OP_REQUEST_RESPONSE)
                || frame["d"]["requestId"].as_str() != Some(request_id.as_str())
            {
                debug!(op = ?frame["op"].as_u64(), "skipping unrelated frame");
                continue;
            }
            let status = &frame["d"]["requestStatus"];
            if status["result"].as_bool() != Some(true) {
                let reason = status["comment"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("status code {}", status["code"]));
                return Err(RctError::control(request_type, reason));
            }
            return Ok(frame["d"]["responseData"].clone());
        }
    }

    fn request_field(&mut self, request_type: &str, data: Value, field: &str) -> Result<Value> {
        let response = self.request(request_type, data)?;
        match response.get(field) {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(RctError::control(
                request_type,
                format!("response missing {field}"),
            )),
        }
    }
}

impl ControlPlane for ObsWebSocket {
    fn connect(&mut self, endpoint: &ControlEndpoint) -> Result<()> {
        let unreachable = |reason: String| RctError::ControlUnreachable {
            endpoint: endpoint.display(),
            reason,
        };

        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| unreachable(e.to_string()))?
            .next()
            .ok_or_else(|| unreachable("host did not resolve".to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, endpoint.timeout)
            .map_err(|e| unreachable(e.to_string()))?;
        stream.set_read_timeout(Some(endpoint.timeout))?;
        stream.set_write_timeout(Some(endpoint.timeout))?;

        let url = format!("ws://{}:{}", endpoint.host, endpoint.port);
        let (mut socket, _) =
            tungstenite::client(url.as_str(), stream).map_err(|e| unreachable(e.to_string()))?;

        let hello = read_frame(&mut socket).map_err(unreachable)?;
        if hello["op"].as_u64() != Some(OP_HELLO) {
            return Err(unreachable(format!("expected Hello, got {}", hello["op"])));
        }

        let mut identify = json!({ "rpcVersion": RPC_VERSION, "eventSubscriptions": 0 });
        let auth = &hello["d"]["authentication"];
        if let (Some(challenge), Some(salt)) = (auth["challenge"].as_str(), auth["salt"].as_str()) {
            identify["authentication"] = json!(auth_response(&endpoint.secret, salt, challenge));
        }
        send(&mut socket, json!({ "op": OP_IDENTIFY, "d": identify })).map_err(unreachable)?;

        let identified = read_frame(&mut socket).map_err(unreachable)?;
        if identified["op"].as_u64() != Some(OP_IDENTIFIED) {
            return Err(unreachable("authentication rejected".to_string()));
        }

        self.socket = Some(socket);
        Ok(())
    }

    fn get_version(&mut self) -> Result<String> {
        let v = self.request_field("GetVersion", Value::Null, "obsVersion")?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    fn set_current_scene(&mut self, scene: &str) -> Result<()> {
        self.request("SetCurrentProgramScene", json!({ "sceneName": scene }))
            .map(|_| ())
    }

    fn get_current_scene(&mut self) -> Result<String> {
        let v = self.request_field("GetCurrentProgramScene", Value::Null, "currentProgramSceneName")?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    fn get_scene_item_id(&mut self, scene: &str, source: &str) -> Result<i64> {
        let v = self.request_field(
            "GetSceneItemId",
            json!({ "sceneName": scene, "sourceName": source }),
            "sceneItemId",
        )?;
        v.as_i64()
            .ok_or_else(|| RctError::control("GetSceneItemId", "sceneItemId is not an integer"))
    }

    fn set_scene_item_enabled(&mut self, scene: &str, item_id: i64, enabled: bool) -> Result<()> {
        self.request(
            "SetSceneItemEnabled",
            json!({ "sceneName": scene, "sceneItemId": item_id, "sceneItemEnabled": enabled }),
        )
        .map(|_| ())
    }

    fn trigger_media_restart(&mut self, input: &str) -> Result<()> {
        self.request(
            "TriggerMediaInputAction",
            json!({ "inputName": input, "mediaAction": MEDIA_ACTION_RESTART }),
        )
        .map(|_| ())
    }

    fn get_stream_status(&mut self) -> Result<bool> {
        let v = self.request_field("GetStreamStatus", Value::Null, "outputActive")?;
        Ok(v.as_bool().unwrap_or(false))
    }

    fn start_stream(&mut self) -> Result<()> {
        self.request("StartStream", Value::Null).map(|_| ())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.request("StopStream", Value::Null).map(|_| ())
    }

    fn set_ingestion_target(&mut self, key: &str, server_url: &str) -> Result<()> {
        self.request(
            "SetStreamServiceSettings",
            json!({
                "streamServiceType": "rtmp_custom",
                "streamServiceSettings": { "server": server_url, "key": key },
            }),
        )
        .map(|_| ())
    }
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub(crate) fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

fn send(socket: &mut WebSocket<TcpStream>, frame: Value) -> std::result::Result<(), String> {
    socket
        .send(Message::text(frame.to_string()))
        .map_err(|e| e.to_string())
}

fn read_frame(socket: &mut WebSocket<TcpStream>) -> std::result::Result<Value, String> {
    loop {
        let msg = socket.read().map_err(|e| e.to_string())?;
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                let text = msg.to_text().map_err(|e| e.to_string())?;
                return serde_json::from_str(text).map_err(|e| e.to_string());
            }
            Message::Close(_) => return Err("connection closed by server".to_string()),
            _ => continue,
        }
    }
}
