use super::{Broadcast, BroadcastPlatform, LifecycleState, Stream};
use crate::auth::{Authenticator, Credentials};
use crate::config::PrivacyStatus;
use crate::error::{RctError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const LIST_PAGE_SIZE: &str = "20";

/// YouTube Data API v3 client for live broadcasts and streams.
///
/// A `401` from the API triggers exactly one token refresh followed by one
/// retry of the same request.
pub struct YouTubeClient<'a> {
    base: String,
    http: Client,
    auth: Authenticator<'a>,
    creds: RefCell<Credentials>,
}

impl<'a> YouTubeClient<'a> {
    pub fn new(auth: Authenticator<'a>) -> Result<Self> {
        let creds = auth.obtain()?;
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            base: YOUTUBE_API_BASE.to_string(),
            http,
            auth,
            creds: RefCell::new(creds),
        })
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        let build = || -> RequestBuilder {
            let mut req = self
                .http
                .request(method.clone(), &url)
                .query(query)
                .bearer_auth(&self.creds.borrow().access_token);
            if let Some(body) = body {
                req = req.json(body);
            }
            req
        };

        debug!(%method, %path, "youtube request");
        let mut resp = build().send()?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(%path, "access token rejected, refreshing");
            let fresh = self.auth.refresh(&self.creds.borrow())?;
            *self.creds.borrow_mut() = fresh;
            resp = build().send()?;
        }

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn api_error(status: u16, body: &str) -> RctError {
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }
    #[derive(Deserialize)]
    struct Detail {
        #[serde(default)]
        message: String,
    }
    let message = serde_json::from_str::<Envelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    RctError::RemoteApi { status, message }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<BroadcastItem>,
}

#[derive(Deserialize)]
struct BroadcastItem {
    id: String,
    #[serde(default)]
    snippet: BroadcastSnippet,
    #[serde(default)]
    status: BroadcastStatus,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    scheduled_start_time: Option<DateTime<Utc>>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastStatus {
    #[serde(default)]
    privacy_status: Option<String>,
    #[serde(default)]
    life_cycle_status: Option<String>,
}

impl From<BroadcastItem> for Broadcast {
    fn from(item: BroadcastItem) -> Self {
        Broadcast {
            id: item.id,
            title: item.snippet.title,
            scheduled_start: item.snippet.scheduled_start_time,
            privacy: item
                .status
                .privacy_status
                .as_deref()
                .and_then(|p| p.parse().ok()),
            state: item
                .status
                .life_cycle_status
                .as_deref()
                .map(LifecycleState::from_remote)
                .unwrap_or(LifecycleState::Upcoming),
        }
    }
}

#[derive(Deserialize)]
struct StreamItem {
    id: String,
    cdn: StreamCdn,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamCdn {
    ingestion_info: IngestionInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionInfo {
    stream_name: String,
    ingestion_address: String,
}

fn decode<T: for<'de> Deserialize<'de>>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| RctError::MalformedResponse(format!("{what}: {e}")))
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// BroadcastPlatform
// ---------------------------------------------------------------------------

impl BroadcastPlatform for YouTubeClient<'_> {
    fn list_upcoming(&self) -> Result<Vec<Broadcast>> {
        let value = self.call(
            Method::GET,
            "/liveBroadcasts",
            &[
                ("part", "snippet,status"),
                ("broadcastStatus", "upcoming"),
                ("maxResults", LIST_PAGE_SIZE),
            ],
            None,
        )?;
        let list: ListResponse = decode("liveBroadcasts.list", value)?;
        Ok(list.items.into_iter().map(Broadcast::from).collect())
    }

    fn create_broadcast(
        &self,
        title: &str,
        description: &str,
        start: DateTime<Utc>,
        privacy: PrivacyStatus,
    ) -> Result<Broadcast> {
        info!(%title, start = %rfc3339(start), %privacy, "creating broadcast");
        let body = json!({
            "snippet": {
                "title": title,
                "description": description,
                "scheduledStartTime": rfc3339(start),
            },
            "status": {
                "privacyStatus": privacy.as_str(),
                "selfDeclaredMadeForKids": false,
            },
            "contentDetails": {
                "enableAutoStart": true,
                "enableAutoStop": true,
                "monitorStream": { "enableMonitorStream": false },
            },
        });
        let value = self.call(
            Method::POST,
            "/liveBroadcasts",
            &[("part", "snippet,status,contentDetails")],
            Some(&body),
        )?;
        let item: BroadcastItem = decode("liveBroadcasts.insert", value)?;
        Ok(item.into())
    }

    fn create_stream(&self, label: &str) -> Result<Stream> {
        info!(%label, "creating stream");
        let body = json!({
            "snippet": { "title": label },
            "cdn": {
                "frameRate": "30fps",
                "ingestionType": "rtmp",
                "resolution": "1080p",
            },
        });
        let value = self.call(
            Method::POST,
            "/liveStreams",
            &[("part", "snippet,cdn")],
            Some(&body),
        )?;
        let item: StreamItem = decode("liveStreams.insert", value)?;
        Ok(Stream {
            id: item.id,
            ingestion_key: item.cdn.ingestion_info.stream_name,
            ingestion_server_url: item.cdn.ingestion_info.ingestion_address,
        })
    }

    fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<()> {
        info!(broadcast = %broadcast_id, stream = %stream_id, "binding");
        self.call(
            Method::POST,
            "/liveBroadcasts/bind",
            &[
                ("id", broadcast_id),
                ("part", "id,contentDetails"),
                ("streamId", stream_id),
            ],
            None,
        )?;
        Ok(())
    }

    fn update_broadcast(&self, id: &str, title: &str, start: DateTime<Utc>) -> Result<()> {
        let body = json!({
            "id": id,
            "snippet": {
                "title": title,
                "scheduledStartTime": rfc3339(start),
            },
        });
        self.call(Method::PUT, "/liveBroadcasts", &[("part", "snippet")], Some(&body))?;
        Ok(())
    }

    fn delete_broadcast(&self, id: &str) -> Result<()> {
        info!(%id, "deleting broadcast");
        self.call(Method::DELETE, "/liveBroadcasts", &[("id", id)], None)?;
        Ok(())
    }
}
