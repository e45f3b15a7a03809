use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://eye-dentify.onrender.com";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub url: String,
  pub version: String,
  /// Transport timeout; the server may cold-start slowly
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      version: "v1".to_string(),
      timeout_secs: 90,
    }
  }
}

impl ApiConfig {
  /// `{url}/api/{version}`, with any trailing slash on `url` ignored.
  pub fn base_url(&self) -> Result<Url> {
    let raw = format!(
      "{}/api/{}",
      self.url.trim_end_matches('/'),
      self.version.trim_matches('/')
    );
    Url::parse(&raw).map_err(|e| eyre!("Invalid API url {}: {}", self.url, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  /// Host part of the API url, for display.
  pub fn host(&self) -> &str {
    self
      .url
      .strip_prefix("https://")
      .or_else(|| self.url.strip_prefix("http://"))
      .unwrap_or(&self.url)
      .split('/')
      .next()
      .unwrap_or(&self.url)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_secs: u64,
  /// Periodically refetch the sketch list while it is on screen
  pub auto_refresh: bool,
  pub refresh_interval_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: 60,
      auto_refresh: false,
      refresh_interval_secs: 30,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }

  pub fn refresh_interval(&self) -> Duration {
    Duration::from_secs(self.refresh_interval_secs.max(1))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sketchdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sketchdesk/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sketchdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sketchdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    config.api.base_url()?;
    Ok(config)
  }

  /// Header title: the configured one, or the API host.
  pub fn display_title(&self) -> &str {
    self.title.as_deref().unwrap_or_else(|| self.api.host())
  }

  /// Get the API token from environment variables, if any.
  ///
  /// Checks SKETCHDESK_API_TOKEN first, then SKETCH_API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SKETCHDESK_API_TOKEN")
      .or_else(|_| std::env::var("SKETCH_API_TOKEN"))
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
