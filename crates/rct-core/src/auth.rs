//! OAuth credentials for the remote platform.
//!
//! Credentials are an immutable value. [`Credentials::state`] classifies them
//! and a refresh produces a fresh value:
//!
//! ```text
//! Valid
//! ExpiredRefreshable --refresh ok--> Valid
//!                    --refresh fails--> NeedsInteractiveAuth
//! ```
//!
//! Reaching `NeedsInteractiveAuth` sends one specifically worded alert and
//! surfaces [`RctError::ReauthRequired`]; the interactive browser flow lives
//! outside this crate.

use crate::alert::{AlertMessage, Notifier};
use crate::clock::Clock;
use crate::error::{RctError, Result};
use crate::io;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const REAUTH_SUBJECT: &str = "token refresh failed — reauthentication required";

/// Tokens are treated as expired this long before their stated expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// ClientSecrets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Load a Google `client_secrets.json` (`installed` or `web` flavour).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RctError::MissingFile(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let file: SecretsFile = serde_json::from_str(&data)?;
        file.installed.or(file.web).ok_or_else(|| {
            RctError::InvalidConfig(format!(
                "{}: expected an \"installed\" or \"web\" client",
                path.display()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Valid,
    ExpiredRefreshable,
    NeedsInteractiveAuth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        let expired = match self.expires_at {
            Some(at) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= at,
            None => false,
        };
        if !expired && !self.access_token.is_empty() {
            CredentialState::Valid
        } else if self.refresh_token.is_some() {
            CredentialState::ExpiredRefreshable
        } else {
            CredentialState::NeedsInteractiveAuth
        }
    }

    /// Read the token cache. Absent file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        io::read_json_opt(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

pub struct Authenticator<'a> {
    secrets: ClientSecrets,
    token_path: PathBuf,
    http: reqwest::blocking::Client,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        secrets: ClientSecrets,
        token_path: PathBuf,
        clock: &'a dyn Clock,
        notifier: &'a dyn Notifier,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            secrets,
            token_path,
            http,
            clock,
            notifier,
        })
    }

    /// Load cached credentials and bring them to the `Valid` state.
    pub fn obtain(&self) -> Result<Credentials> {
        let Some(creds) = Credentials::load(&self.token_path)? else {
            return Err(self.reauth_required(&format!(
                "no cached token at {}",
                self.token_path.display()
            )));
        };
        match creds.state(self.clock.now()) {
            CredentialState::Valid => Ok(creds),
            CredentialState::ExpiredRefreshable => self.refresh(&creds),
            CredentialState::NeedsInteractiveAuth => {
                Err(self.reauth_required("cached token expired and has no refresh token"))
            }
        }
    }

    /// Exchange the refresh token for a new access token and persist it.
    pub fn refresh(&self, creds: &Credentials) -> Result<Credentials> {
        let Some(refresh_token) = creds.refresh_token.as_deref() else {
            return Err(self.reauth_required("no refresh token available"));
        };
        match self.exchange(refresh_token) {
            Ok(fresh) => {
                if let Err(e) = fresh.save(&self.token_path) {
                    warn!("could not persist refreshed token: {e}");
                }
                info!("access token refreshed");
                Ok(fresh)
            }
            Err(reason) => Err(self.reauth_required(&reason)),
        }
    }

    fn exchange(&self, refresh_token: &str) -> std::result::Result<Credentials, String> {
        let resp = self
            .http
            .post(&self.secrets.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .send()
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {}", body.trim()));
        }
        let token: TokenResponse = resp.json().map_err(|e| e.to_string())?;
        Ok(Credentials {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: token
                .expires_in
                .map(|secs| self.clock.now() + Duration::seconds(secs)),
        })
    }

    fn reauth_required(&self, reason: &str) -> RctError {
        error!("{REAUTH_SUBJECT}: {reason}");
        self.notifier.send(&AlertMessage::new(
            REAUTH_SUBJECT,
            format!(
                "The remote platform token could not be refreshed ({reason}).\n\
                 Run the authentication helper on the host to sign in again.\n\n\
                 Time: {}",
                self.clock.now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ));
        RctError::ReauthRequired(reason.to_string())
    }
}
