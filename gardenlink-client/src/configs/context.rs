use std::time::Duration;

use gardenlink_api::{Channel, SharedSecret};
use reqwest::Url;

use crate::configs::settings::{BackoffKind, Settings, Views};
use crate::error::{ClientError, Result};
use crate::stream::ReconnectPolicy;

/// Base URLs of the backend, derived once from the configured host.
#[derive(Debug, Clone)]
pub struct Endpoints {
    http: Url,
    ws: Url,
}

impl Endpoints {
    pub fn new(host: &str, secure: bool) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() || host.contains("://") {
            return Err(ClientError::Config(format!(
                "api host must not be empty or carry a scheme: {host:?}"
            )));
        }

        let (http_scheme, ws_scheme) = if secure { ("https", "wss") } else { ("http", "ws") };

        Ok(Self {
            http: parse_url(&format!("{http_scheme}://{host}"))?,
            ws: parse_url(&format!("{ws_scheme}://{host}"))?,
        })
    }

    pub fn http(&self, path: &str) -> Result<Url> {
        self.http
            .join(path)
            .map_err(|e| ClientError::Config(format!("invalid request path {path:?}: {e}")))
    }

    /// Push endpoint for `channel`, authenticated with the `token` query parameter.
    pub fn channel(&self, channel: Channel, token: &str) -> Result<Url> {
        let mut url = self
            .ws
            .join(channel.path())
            .map_err(|e| ClientError::Config(format!("invalid channel path: {e}")))?;
        url.query_pairs_mut().append_pair("token", token);

        Ok(url)
    }
}

/// Read-only configuration shared by every component of the client.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub endpoints: Endpoints,
    pub secret: SharedSecret,
    pub reconnect: ReconnectPolicy,
    pub views: Views,
    pub guard_matcher: Vec<String>,
}

impl ClientContext {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let reconnect = match settings.stream.backoff {
            BackoffKind::Fixed => ReconnectPolicy::Fixed(Duration::from_millis(settings.stream.delay_ms)),
            BackoffKind::Exponential => ReconnectPolicy::Exponential {
                initial: Duration::from_millis(settings.stream.delay_ms),
                max: Duration::from_millis(settings.stream.max_delay_ms),
            },
        };

        Ok(Self {
            endpoints: Endpoints::new(&settings.api.host, settings.api.secure)?,
            secret: SharedSecret::new(settings.crypto.secret.clone())?,
            reconnect,
            views: settings.views.clone(),
            guard_matcher: settings.guard.matcher.clone(),
        })
    }
}

fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| ClientError::Config(format!("invalid api host {value:?}: {e}")))
}
