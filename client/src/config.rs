use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Directory the config was loaded from
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_faucet_cooldown_secs")]
    pub faucet_cooldown_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_api_endpoint() -> String {
    "http://localhost:5000".to_string()
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("PostCoin")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_faucet_cooldown_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_endpoint: default_api_endpoint(),
            data_dir: default_data_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            faucet_cooldown_secs: default_faucet_cooldown_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Config {
    /// Load from the default data directory
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&default_data_dir())
    }

    /// Load `config.json` from `dir`, writing defaults there on first run
    pub fn load_from(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::config_path(dir);

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            let mut config: Config = serde_json::from_str(&contents)?;
            config.data_dir = dir.to_path_buf();
            Ok(config)
        } else {
            let config = Config {
                data_dir: dir.to_path_buf(),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::config_path(&self.data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    pub fn config_path(dir: &Path) -> PathBuf {
        dir.join("config.json")
    }

    /// sled directory holding device id and wallet address
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("identity")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn faucet_cooldown(&self) -> Duration {
        Duration::from_secs(self.faucet_cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
