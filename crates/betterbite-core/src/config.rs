use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::imaging::DEFAULT_JPEG_QUALITY;
use crate::mode::ScanMode;
use crate::tier::Tier;

const APP_DIR: &str = "betterbite";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub default_mode: Option<ScanMode>,
    pub jpeg_quality: Option<u8>,
    /// Upload the images of each successful scan to the `scans` bucket
    pub archive_scans: bool,
    /// Folder the terminal camera reads its newest frame from
    pub capture_dir: Option<PathBuf>,
    pub essential_payment_link: Option<String>,
    pub premium_payment_link: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Invalid config {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Fill in credentials from the environment; env values win over the file
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = ["GEMINI_API_KEY", "VITE_API_KEY", "API_KEY"]
            .iter()
            .find_map(|name| non_empty(name))
        {
            self.gemini_api_key = Some(key);
        }
        if let Some(url) = non_empty("SUPABASE_URL") {
            self.supabase_url = Some(url);
        }
        if let Some(key) = non_empty("SUPABASE_ANON_KEY") {
            self.supabase_anon_key = Some(key);
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
            .filter(|q| (1..=100).contains(q))
            .unwrap_or(DEFAULT_JPEG_QUALITY)
    }

    pub fn default_mode(&self) -> ScanMode {
        self.default_mode.unwrap_or_default()
    }

    /// Checkout link for a paid tier; the free tier has none
    pub fn payment_link(&self, tier: Tier) -> Option<&str> {
        let configured = match tier {
            Tier::Free => None,
            Tier::Essential => self.essential_payment_link.as_deref(),
            Tier::Premium => self.premium_payment_link.as_deref(),
        };
        configured.or(tier.config().payment_link)
    }

    pub fn capture_dir(&self) -> Result<PathBuf> {
        match &self.capture_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::config_dir()?.join("inbox")),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn session_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("session.json"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("betterbite.log"))
    }
}
