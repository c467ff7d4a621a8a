//! Fallback proxying to an upstream public registry.

use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ConfigError;
use crate::error::AppResult;

/// Status report served at `/-/upstreams`.
#[derive(Serialize, Debug)]
pub struct UpstreamStatus {
    pub url: String,
    pub status: &'static str,
}

/// An external registry consulted for packages not hosted locally.
///
/// The proxy performs no caching of its own; hosting a package locally by
/// cloning its repository into the storage dir is the caching layer, at a
/// different granularity.
pub struct Upstream {
    base: Url,
    client: Client,
}

impl Upstream {
    /// Parses the upstream base URL and builds the HTTP client. Failures
    /// here are configuration errors and fatal at startup.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, client })
    }

    /// Pass-through GET against the upstream.
    ///
    /// The incoming request path is joined onto the upstream base path;
    /// headers and body are forwarded verbatim, with the body streamed
    /// rather than buffered. Only headers and body are copied: the
    /// response status stays at the framework default, so a proxied
    /// response reads 200 whatever the upstream answered. Transport
    /// errors propagate to the error adapter as internal errors.
    pub async fn proxy(&self, path: &str) -> AppResult<Response> {
        let mut target = self.base.clone();
        let joined = format!(
            "{}/{}",
            self.base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        target.set_path(&joined);
        debug!(url = %target, "proxying request to upstream");

        let upstream_response = self.client.get(target).send().await?;

        let mut builder = Response::builder();
        if let Some(headers) = builder.headers_mut() {
            headers.extend(
                upstream_response
                    .headers()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        Ok(builder.body(Body::from_stream(upstream_response.bytes_stream()))?)
    }

    /// Probes the upstream base URL at the transport level.
    pub async fn ping(&self) -> Result<(), reqwest::Error> {
        self.client.get(self.base.clone()).send().await?;
        Ok(())
    }

    /// Reports `"up"` when the upstream answers the ping, `"down"`
    /// otherwise.
    pub async fn status(&self) -> UpstreamStatus {
        let status = match self.ping().await {
            Ok(()) => "up",
            Err(err) => {
                warn!(url = %self.base, error = %err, "upstream ping failed");
                "down"
            }
        };
        UpstreamStatus {
            url: self.base.to_string(),
            status,
        }
    }
}
