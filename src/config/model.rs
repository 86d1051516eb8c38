use crate::core::api::UpstreamMode;
use crate::core::doctor::OnlinePolicy;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failure read file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failure to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{key} is not a valid URL: {value}")]
    InvalidUrl { key: &'static str, value: String },
    #[error("server.addr is not a valid socket address: {0}")]
    InvalidAddr(String),
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Profiles {
    pub active: String,
}

// application.yml only names the active profile
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct EnvConfig {
    pub profiles: Profiles,
}

/// Process-wide settings, loaded once at start and shared read-only with every handler.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Bootstrap {
    pub server: Server,
    pub komari: Komari,
    /// Remote icon served through `/api/favicon`.
    pub favicon_url: Option<String>,
    /// Backend that already speaks the `{updated, servers}` contract.
    pub legacy_backend_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Server {
    pub addr: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            addr: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Komari {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub mode: UpstreamMode,
    pub online_policy: OnlinePolicy,
}

impl Bootstrap {
    /// Overlays environment variables on top of the file configuration.
    /// Blank values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("KOMARI_BASE_URL") {
            self.komari.base_url = Some(v);
        }
        if let Some(v) = get("KOMARI_API_KEY") {
            self.komari.api_key = Some(v);
        }
        if let Some(v) = get("FAVICON_URL") {
            self.favicon_url = Some(v);
        }
        if let Some(v) = get("BACKEND_API_URL") {
            self.legacy_backend_url = Some(v);
        }
        if let Some(v) = get("LISTEN_ADDR") {
            self.server.addr = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("komari.base_url", self.komari.base_url.as_deref())?;
        check_url("favicon_url", self.favicon_url.as_deref())?;
        check_url("legacy_backend_url", self.legacy_backend_url.as_deref())?;
        self.socket_addr().map(|_| ())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(self.server.addr.clone()))
    }
}

fn check_url(key: &'static str, value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some(v) => url::Url::parse(v)
            .map(|_| ())
            .map_err(|_| ConfigError::InvalidUrl {
                key,
                value: v.to_string(),
            }),
        None => Ok(()),
    }
}

// 加载指定配置文件，文件不存在时返回None
fn load_config<T>(path: &Path) -> Result<Option<T>, ConfigError>
where
    T: DeserializeOwned,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("config file {} not found", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_yaml::from_str::<T>(&content)
        .map(Some)
        .map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
}

/// Resolves `application.yml` -> `application-{active}.yml` inside `dir`, then applies
/// environment overrides read through `lookup`.
pub fn load_bootstrap_config_from<F>(dir: &Path, lookup: F) -> Result<Bootstrap, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let active = match lookup("APP_PROFILE").filter(|v| !v.is_empty()) {
        Some(profile) => Some(profile),
        None => load_config::<EnvConfig>(&dir.join("application.yml"))?
            .map(|env| env.profiles.active)
            .filter(|active| !active.is_empty()),
    };

    let mut bootstrap = match active {
        Some(active) => {
            info!("active profile: {}", active);
            load_config::<Bootstrap>(&dir.join(format!("application-{}.yml", active)))?
                .unwrap_or_default()
        }
        None => Bootstrap::default(),
    };
    bootstrap.apply_env(lookup);
    bootstrap.validate()?;
    Ok(bootstrap)
}

// 真正对外暴露的方法
pub fn load_bootstrap_config() -> Result<Bootstrap, ConfigError> {
    load_bootstrap_config_from(Path::new("."), |key| std::env::var(key).ok())
}
