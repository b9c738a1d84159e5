pub mod broadcasts;
pub mod config;
pub mod health;
pub mod prepare;
pub mod schedule;
pub mod status;
pub mod stream;

use rct_core::alert::{EmailNotifier, Notifier};
use rct_core::auth::{Authenticator, ClientSecrets};
use rct_core::clock::Clock;
use rct_core::config::Config;
use rct_core::paths;
use rct_core::remote::YouTubeClient;

pub(crate) fn notifier(config: &Config) -> EmailNotifier {
    EmailNotifier::new(config.alert.clone())
}

/// Authenticate against the remote platform using the project's cached token.
pub(crate) fn youtube<'a>(
    config: &Config,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
) -> rct_core::Result<YouTubeClient<'a>> {
    let secrets = ClientSecrets::load(&paths::client_secrets_path(&config.root))?;
    let auth = Authenticator::new(secrets, paths::token_path(&config.root), clock, notifier)?;
    YouTubeClient::new(auth)
}
