// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use pmsdesk_api::DEFAULT_CUSTOMER_LOOKUP_PATH;
use pmsdesk_app::{DEFAULT_QUIET_PERIOD, MAX_QUIET_PERIOD, MIN_QUIET_PERIOD};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
pub const CONFIG_PATH_ENV: &str = "PMSDESK_CONFIG_PATH";
const DEFAULT_TOKEN_ENV: &str = "PMSDESK_TOKEN";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            storage: Storage::default(),
            ui: Ui::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<String>,
    pub timeout: Option<String>,
    pub customer_lookup_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub debounce: Option<String>,
    pub download_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(pmsdesk_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and place values under [api], [storage], [ui], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url {
            let trimmed = base_url.trim();
            if trimmed.is_empty() {
                bail!("api.base_url in {} must not be empty", path.display());
            }
            if !trimmed.contains("://") {
                bail!(
                    "api.base_url in {} must be a full URL such as https://fm.example.com, got {trimmed:?}",
                    path.display()
                );
            }
        }

        if let Some(lookup_path) = &self.api.customer_lookup_path
            && !lookup_path.starts_with('/')
        {
            bail!(
                "api.customer_lookup_path in {} must start with `/`, got {lookup_path:?}",
                path.display()
            );
        }

        if let Some(db_path) = &self.storage.db_path {
            pmsdesk_db::validate_db_path(db_path)?;
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(debounce) = &self.ui.debounce {
            let parsed = parse_duration(debounce)?;
            if !(MIN_QUIET_PERIOD..=MAX_QUIET_PERIOD).contains(&parsed) {
                bail!(
                    "ui.debounce in {} must be between {}ms and {}ms, got {}",
                    path.display(),
                    MIN_QUIET_PERIOD.as_millis(),
                    MAX_QUIET_PERIOD.as_millis(),
                    debounce
                );
            }
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<&str> {
        self.api
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                anyhow!("api.base_url is not set; add it under [api] (see --print-example-config)")
            })
    }

    /// Inline token wins over the environment variable named by `token_env`.
    pub fn token(&self) -> Option<String> {
        if let Some(token) = self.api.token.as_deref().map(str::trim)
            && !token.is_empty()
        {
            return Some(token.to_owned());
        }
        let name = self.api.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
        env::var(name)
            .ok()
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty())
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn customer_lookup_path(&self) -> &str {
        self.api
            .customer_lookup_path
            .as_deref()
            .unwrap_or(DEFAULT_CUSTOMER_LOOKUP_PATH)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => pmsdesk_db::default_db_path(),
        }
    }

    pub fn debounce(&self) -> Result<Duration> {
        match &self.ui.debounce {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_QUIET_PERIOD),
        }
    }

    pub fn download_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.ui.download_dir {
            return Ok(PathBuf::from(dir));
        }
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| anyhow!("cannot resolve a download directory; set [ui].download_dir"))
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("cannot resolve data directory; set [log].file"))?;
        Ok(data_root
            .join(pmsdesk_db::APP_NAME)
            .join(format!("{}.log", pmsdesk_db::APP_NAME)))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# pmsdesk config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"https://fm.example.com\"\n# Bearer token, read from this environment variable (or set token = \"...\")\ntoken_env = \"{DEFAULT_TOKEN_ENV}\"\ntimeout = \"{DEFAULT_TIMEOUT}\"\ncustomer_lookup_path = \"{DEFAULT_CUSTOMER_LOOKUP_PATH}\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/pmsdesk/pmsdesk.db)\n# db_path = \"/absolute/path/to/pmsdesk.db\"\n\n[ui]\n# Quiet period before customer autofill, {}ms..={}ms\ndebounce = \"{}ms\"\n# download_dir = \"/home/me/Downloads\"\n\n[log]\n# RUST_LOG overrides this when set\nlevel = \"{DEFAULT_LOG_LEVEL}\"\n# file = \"/tmp/pmsdesk.log\"\n",
            path.display(),
            MIN_QUIET_PERIOD.as_millis(),
            MAX_QUIET_PERIOD.as_millis(),
            DEFAULT_QUIET_PERIOD.as_millis(),
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 400ms or 10s)")
}
