use crate::models::proxy::{Proxy, ProxyKind};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid proxy {name}: {reason}")]
    InvalidProxy { name: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Builds an HTTP client bound to an optional egress proxy. Both the feed
/// fetcher and the Telegram dispatcher go through here, so proxy policy
/// lives in exactly one place. A `None` proxy yields a direct client that
/// still honors `http_proxy`/`https_proxy` environment variables.
pub fn client_for(proxy: Option<&Proxy>) -> Result<reqwest::Client, TransportError> {
    // reqwest has no TLS-handshake-only timeout knob; connect_timeout bounds
    // the whole dial + TLS phase, so the handshake budget folds into it.
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .timeout(REQUEST_TIMEOUT);

    if let Some(p) = proxy {
        builder = builder.proxy(reqwest_proxy(p)?);
    }

    Ok(builder.build()?)
}

fn reqwest_proxy(p: &Proxy) -> Result<reqwest::Proxy, TransportError> {
    let mut url = Url::parse(&format!("{}://{}", p.kind, p.address)).map_err(|e| {
        TransportError::InvalidProxy {
            name: p.name.clone(),
            reason: format!("bad address '{}': {e}", p.address),
        }
    })?;

    match p.kind {
        ProxyKind::Http | ProxyKind::Https => {
            let mut proxy = reqwest::Proxy::all(url.as_str())?;
            if let Some(username) = p.username.as_deref() {
                proxy = proxy.basic_auth(username, p.password.as_deref().unwrap_or_default());
            }
            Ok(proxy)
        }
        ProxyKind::Socks5 => {
            // SOCKS credentials ride in the URL; reqwest hands them to the
            // SOCKS dialer rather than an HTTP Proxy-Authorization header.
            if let Some(username) = p.username.as_deref() {
                url.set_username(username)
                    .map_err(|_| TransportError::InvalidProxy {
                        name: p.name.clone(),
                        reason: "bad username".to_string(),
                    })?;
                url.set_password(p.password.as_deref())
                    .map_err(|_| TransportError::InvalidProxy {
                        name: p.name.clone(),
                        reason: "bad password".to_string(),
                    })?;
            }
            Ok(reqwest::Proxy::all(url.as_str())?)
        }
    }
}
