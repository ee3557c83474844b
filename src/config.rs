// src/config.rs

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::table::LoadOptions;

/// Overrides `data_path`.
pub const ENV_DATA: &str = "EMISSIONS_DATA";
/// Overrides `countries_only` (`true` / `false` / `1` / `0`).
pub const ENV_COUNTRIES_ONLY: &str = "EMISSIONS_COUNTRIES_ONLY";

/// Runtime settings, read from YAML and then overridden by the environment.
///
/// ```yaml
/// data_path: data/owid-co2-data.csv
/// countries_only: true
/// excluded_countries: [World]
/// exclude_zero: false
/// default_groups: 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_path: Option<PathBuf>,
    pub countries_only: bool,
    pub excluded_countries: Vec<String>,
    pub exclude_zero: bool,
    pub default_groups: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: None,
            countries_only: true,
            excluded_countries: Vec::new(),
            exclude_zero: false,
            default_groups: 4,
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("parsing YAML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path` (if any), then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {:?}", p))?;
                debug!(path = %p.display(), "loaded config file");
                Self::from_yaml_str(&text)?
            }
            None => Self::default(),
        };
        cfg.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATA).filter(|p| !p.trim().is_empty()) {
            self.data_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_COUNTRIES_ONLY) {
            self.countries_only = parse_bool(&raw)
                .ok_or_else(|| anyhow!("{} must be a boolean, got {:?}", ENV_COUNTRIES_ONLY, raw))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            countries_only: self.countries_only,
            excluded_countries: self.excluded_countries.clone(),
            ..LoadOptions::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.default_groups == 0 {
            return Err(anyhow!("default_groups must be at least 1"));
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
