use std::path::Path;

use anyhow::{Context, ensure};
use serde::Deserialize;

use crate::http::parser::ParserLimits;
use crate::pool::PoolConfig;

/// Protocol behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Allow persistent connections.
    pub keepalive: bool,
    /// Batch responses to pipelined requests into one flush.
    pub pipelining: bool,
    /// Allow `upgrade_channel` for `Upgrade: websocket` requests.
    pub websocket_enabled: bool,
    /// Accepted for compatibility; `Proxy-Connection` is not interpreted.
    pub proxy_connection: bool,
    /// Scheme reported for every request, e.g. `https` behind a TLS terminator.
    pub uri_scheme: Option<String>,
    /// Size of each pooled read buffer.
    pub receive_buffer_size: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            keepalive: true,
            pipelining: false,
            websocket_enabled: true,
            proxy_connection: false,
            uri_scheme: None,
            receive_buffer_size: 8192,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Runtime worker threads; the tokio default when unset.
    pub worker_threads: Option<usize>,
    pub http: HttpOptions,
    pub limits: ParserLimits,
    pub buffer_pool: PoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            worker_threads: None,
            http: HttpOptions::default(),
            limits: ParserLimits::default(),
            buffer_pool: PoolConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with the YAML file named by `INLET_CONFIG` and
    /// then the `LISTEN` address.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("INLET_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.listen_addr = addr;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("parsing YAML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.listen_addr.is_empty(), "listen_addr must not be empty");
        ensure!(
            self.http.receive_buffer_size >= 64,
            "http.receive_buffer_size must be at least 64 bytes"
        );
        ensure!(
            self.limits.max_token_length > 0,
            "limits.max_token_length must be positive"
        );
        ensure!(self.limits.max_headers > 0, "limits.max_headers must be positive");
        if let Some(total) = self.buffer_pool.total_capacity {
            ensure!(
                total >= self.http.receive_buffer_size,
                "buffer_pool.total_capacity must hold at least one buffer"
            );
        }
        if let Some(threads) = self.worker_threads {
            ensure!(threads > 0, "worker_threads must be positive");
        }
        Ok(())
    }
}
