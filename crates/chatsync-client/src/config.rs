use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use chatsync_core::SyncConfig;
use chatsync_core::config::{DEFAULT_MIN_LOADING_DISPLAY, DEFAULT_PAGE_LIMIT, DEFAULT_PENDING_LIMIT};

const DEFAULT_API_URL: &str = "http://localhost:3000/v1";
const DEFAULT_WS_URL: &str = "ws://localhost:3000/v1/chat/ws";
const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Connection and sync settings, read from `CHATSYNC_*` environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub user_id: String,
    pub token: Option<String>,
    pub heartbeat: Duration,
    pub sync: SyncConfig,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let user_id = match lookup("CHATSYNC_USER_ID") {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => bail!("CHATSYNC_USER_ID is required"),
        };

        let api_url = lookup("CHATSYNC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let ws_url = lookup("CHATSYNC_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.into());
        let token = lookup("CHATSYNC_TOKEN").filter(|t| !t.is_empty());

        let page_limit = parsed(&lookup, "CHATSYNC_PAGE_LIMIT")?.unwrap_or(DEFAULT_PAGE_LIMIT);
        let min_loading = parsed(&lookup, "CHATSYNC_MIN_LOADING_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MIN_LOADING_DISPLAY);
        let pending_limit =
            parsed(&lookup, "CHATSYNC_PENDING_LIMIT")?.unwrap_or(DEFAULT_PENDING_LIMIT);
        let heartbeat_secs =
            parsed(&lookup, "CHATSYNC_HEARTBEAT_SECS")?.unwrap_or(DEFAULT_HEARTBEAT_SECS);

        if page_limit == 0 {
            bail!("CHATSYNC_PAGE_LIMIT must be at least 1");
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url,
            user_id,
            token,
            heartbeat: Duration::from_secs(heartbeat_secs.max(1)),
            sync: SyncConfig {
                page_limit,
                min_loading_display: min_loading,
                pending_limit,
            },
        })
    }

    /// Socket URL with the user id the server expects as a query parameter.
    pub fn socket_url(&self) -> String {
        let sep = if self.ws_url.contains('?') { '&' } else { '?' };
        format!("{}{}id={}", self.ws_url, sep, self.user_id)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("{name}={raw:?}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ClientConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("CHATSYNC_USER_ID", "u1")]).unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.socket_url(), "ws://localhost:3000/v1/chat/ws?id=u1");
        assert_eq!(cfg.heartbeat, Duration::from_secs(25));
        assert_eq!(cfg.sync.page_limit, 30);
        assert_eq!(cfg.sync.min_loading_display, Duration::from_millis(1000));
        assert!(cfg.token.is_none());
    }

    #[test]
    fn user_id_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("CHATSYNC_USER_ID", "  ")]).is_err());
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let cfg = config(&[
            ("CHATSYNC_USER_ID", "u1"),
            ("CHATSYNC_API_URL", "https://chat.example/v1/"),
            ("CHATSYNC_PAGE_LIMIT", "50"),
            ("CHATSYNC_MIN_LOADING_MS", "250"),
            ("CHATSYNC_TOKEN", "abc"),
        ])
        .unwrap();
        assert_eq!(cfg.api_url, "https://chat.example/v1");
        assert_eq!(cfg.sync.page_limit, 50);
        assert_eq!(cfg.sync.min_loading_display, Duration::from_millis(250));
        assert_eq!(cfg.token.as_deref(), Some("abc"));

        let err = config(&[("CHATSYNC_USER_ID", "u1"), ("CHATSYNC_PAGE_LIMIT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("CHATSYNC_PAGE_LIMIT"));
        assert!(config(&[("CHATSYNC_USER_ID", "u1"), ("CHATSYNC_PAGE_LIMIT", "0")]).is_err());
    }
}
