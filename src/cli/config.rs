use std::fs;
use std::path::PathBuf;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Complete engine configuration, loadable from YAML profiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub privacy: PrivacySettings,
}

/// Timing and retry knobs of the fetch engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Overall script budget per navigation, seconds
    pub script_timeout_secs: u64,
    /// Budget for a single script evaluation, seconds
    pub eval_timeout_secs: u64,
    pub scroll_down_count: u32,
    /// Master switch for injected page interaction (scrolling)
    pub js_invading_enabled: bool,
    pub max_retries: u32,
    pub poll_interval_ms: u64,
    /// Minimum spacing between navigations of one profile, seconds
    pub nav_throttle_secs: u64,
    pub page_load_timeout_secs: u64,
    /// Concurrent fetches in batch mode
    pub workers: usize,
    /// Pause between scheduler rounds in batch mode, milliseconds
    pub politeness_delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            script_timeout_secs: 60,
            eval_timeout_secs: 10,
            scroll_down_count: 5,
            js_invading_enabled: true,
            max_retries: 3,
            poll_interval_ms: 500,
            nav_throttle_secs: 5,
            page_load_timeout_secs: 30,
            workers: 4,
            politeness_delay_ms: 1000,
        }
    }
}

/// Which automation backend to talk to and how
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// "webdriver" for a local WebDriver endpoint, "remote" for the
    /// browser-service protocol
    pub backend: String,
    pub webdriver_url: String,
    pub remote_url: String,
    pub headless: bool,
    pub fingerprints: Vec<BrowserFingerprint>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            backend: "webdriver".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            remote_url: "http://localhost:3000".to_string(),
            headless: true,
            fingerprints: default_fingerprints(),
        }
    }
}

/// One named browser disguise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserFingerprint {
    pub name: String,
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
}

fn default_fingerprints() -> Vec<BrowserFingerprint> {
    vec![
        BrowserFingerprint {
            name: "linux_chrome".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            platform: "Linux x86_64".to_string(),
        },
        BrowserFingerprint {
            name: "windows_chrome".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "en-US,en;q=0.8".to_string(),
            platform: "Win32".to_string(),
        },
        BrowserFingerprint {
            name: "mac_chrome".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            platform: "MacIntel".to_string(),
        },
    ]
}

/// Identity rotation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacySettings {
    /// Hard cap on concurrently tracked browser identities
    pub max_identities: usize,
    /// Where per-identity profile directories are created
    pub data_dir: String,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            max_identities: 8,
            data_dir: "/tmp/rendercrawl/profiles".to_string(),
        }
    }
}

fn config_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "rendercrawl", "rendercrawl")
        .context("could not determine a configuration directory")?;
    Ok(dirs.config_dir().to_path_buf())
}

impl EngineConfig {
    /// Load the default configuration file, writing the built-in defaults
    /// on first use so the file is there to edit.
    pub fn load_default() -> Result<Self> {
        let path = config_dir()?.join("config.yaml");
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            debug!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            if let Err(e) = config.save_as_default() {
                debug!("Could not write default config: {}", e);
            }
            Ok(config)
        }
    }

    /// Load a named profile from the profiles directory
    pub fn load_profile(name: &str) -> Result<Self> {
        let path = config_dir()?.join("profiles").join(format!("{name}.yaml"));
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read config {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("could not parse config {}", path.display()))
    }

    /// Persist this configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        self.save_to_file(&dir.join("config.yaml"))
    }

    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let raw = serde_yaml::to_string(self).context("could not serialize config")?;
        fs::write(path, raw)
            .with_context(|| format!("could not write config {}", path.display()))?;
        Ok(())
    }

    /// Names of the available configuration profiles
    pub fn list_profiles() -> Result<Vec<String>> {
        let dir = config_dir()?.join("profiles");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("could not read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().map(|e| e == "yaml").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.fetch.script_timeout_secs, 60);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.browser.backend, "webdriver");
        assert_eq!(config.privacy.max_identities, 8);
        assert!(!config.browser.fingerprints.is_empty());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let raw = "fetch:\n  max_retries: 7\nbrowser:\n  backend: remote\n";
        let config: EngineConfig = serde_yaml::from_str(raw).expect("parse");
        assert_eq!(config.fetch.max_retries, 7);
        assert_eq!(config.fetch.script_timeout_secs, 60);
        assert_eq!(config.browser.backend, "remote");
        assert_eq!(config.privacy.max_identities, 8);
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = EngineConfig::default();
        let raw = serde_yaml::to_string(&config).expect("serialize");
        let back: EngineConfig = serde_yaml::from_str(&raw).expect("parse");
        assert_eq!(back.fetch.workers, config.fetch.workers);
        assert_eq!(back.browser.webdriver_url, config.browser.webdriver_url);
    }
}
