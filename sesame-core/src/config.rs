use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// D-Bus address to connect to instead of the session bus.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// How long to wait for a prompt's `Completed` signal. `0` waits forever.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fixed window id handed to `Prompt()`, skipping `window_id_command`.
    #[serde(default)]
    pub window_id: Option<String>,
    #[serde(default = "default_window_id_command")]
    pub window_id_command: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            window_id: None,
            window_id_command: default_window_id_command(),
        }
    }
}

impl PromptConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

pub fn default_config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("sesame").join("config.toml")
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_window_id_command() -> Vec<String> {
    // `32x` and ` $0` make xprop print "<atom> 0x<id>", which is easy to split.
    ["xprop", "-root", "32x", " $0", "_NET_ACTIVE_WINDOW"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_log_filter() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.bus.address.is_none());
        assert_eq!(cfg.prompt.timeout_secs, 300);
        assert_eq!(cfg.prompt.timeout(), Some(Duration::from_secs(300)));
        assert!(cfg.prompt.window_id.is_none());
        assert_eq!(cfg.prompt.window_id_command[0], "xprop");
        assert_eq!(cfg.prompt.window_id_command.len(), 5);
        assert_eq!(cfg.log.filter, "warn");
    }

    #[test]
    fn parse_prompt_section() {
        let toml_str = r#"
            [prompt]
            timeout_secs = 0
            window_id = ""
            window_id_command = ["my-window-id"]
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.prompt.timeout(), None);
        assert_eq!(cfg.prompt.window_id.as_deref(), Some(""));
        assert_eq!(cfg.prompt.window_id_command, vec!["my-window-id".to_string()]);
    }

    #[test]
    fn parse_bus_and_log_sections() {
        let toml_str = r#"
            [bus]
            address = "unix:path=/run/user/1000/bus"

            [log]
            filter = "sesame_client=debug"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.bus.address.as_deref(), Some("unix:path=/run/user/1000/bus"));
        assert_eq!(cfg.log.filter, "sesame_client=debug");
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.prompt.timeout_secs, 300);
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[prompt]\ntimeout_secs = \"soon\"\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[prompt]\ntimeout_secs = 5\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.prompt.timeout(), Some(Duration::from_secs(5)));
    }
}
