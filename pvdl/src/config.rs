use crate::hooks::{FilterConfig, TransformConfig};
use crate::pool::DEFAULT_WORKERS;
use crate::retry::{Limit, RetryPolicy};
use anyhow::{Context, Result, bail};
use pixiv::WebConfig;
use serde::Deserialize;
use serde_json::from_str;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    cookie: Option<String>,
    user_agent: Option<String>,
    proxy: Option<String>,
    home: Option<PathBuf>,
    host: Option<String>,
    workers: Option<usize>,
    timeout_secs: Option<u64>,
    asset_timeout_secs: Option<u64>,
    attempts: Option<u32>,
    retry_pause_ms: Option<u64>,
    #[serde(default)]
    filter: FilterConfig,
    #[serde(default)]
    transform: TransformConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub root: PathBuf,
    pub workers: usize,
    /// Policy for a whole illustration and for each of its assets.
    pub retry: RetryPolicy,
    pub filter: FilterConfig,
    pub transform: TransformConfig,
}

impl Config {
    pub fn download_dir(&self) -> PathBuf {
        self.root.join("download")
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigFile::default().resolve()
    }
}

impl ConfigFile {
    fn resolve(self) -> Config {
        let defaults = WebConfig::default();
        let secs = |v: Option<u64>, d: Duration| v.map_or(d, Duration::from_secs);
        Config {
            web: WebConfig {
                host: self.host,
                cookie: self.cookie,
                user_agent: self.user_agent,
                proxy: self.proxy,
                timeout: secs(self.timeout_secs, defaults.timeout),
                asset_timeout: secs(self.asset_timeout_secs, defaults.asset_timeout),
            },
            root: self.home.unwrap_or_default(),
            workers: self.workers.unwrap_or(DEFAULT_WORKERS),
            retry: RetryPolicy::new(Limit::Attempts(self.attempts.unwrap_or(8)))
                .with_pause(Duration::from_millis(self.retry_pause_ms.unwrap_or(250))),
            filter: self.filter,
            transform: self.transform,
        }
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(meta) => {
            if !meta.is_dir() {
                bail!("{} is not a directory", dir.display());
            }
        }
        Err(_) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    };
    Ok(())
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub fn read_config(path: &Path) -> Result<Config> {
    let config: ConfigFile = match fs::read_to_string(path) {
        Ok(s) => from_str(&s).with_context(|| format!("parsing {}", path.display()))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("no config file at {}, using defaults", path.display());
            ConfigFile::default()
        }
        Err(e) => return Err(e.into()),
    };
    let config = config.resolve();
    if config.workers == 0 {
        bail!("workers must be positive");
    }
    if config.retry.limit == Limit::Attempts(0) {
        bail!("attempts must be positive");
    }
    if config.web.cookie.is_none() {
        warn!("no cookie configured, restricted works will be unavailable");
    }
    Ok(config)
}
