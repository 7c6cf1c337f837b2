use anyhow::{Result, bail};
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "kobodeck")]
#[command(about = "Serves the Kobo reading-list protocol on top of a Readeck server", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kobodeck")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u32 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for App {
    fn default() -> Self {
        App {
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl App {
    pub fn get_port(&self) -> u32 {
        self.port
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Readeck {
    pub host: String,
    #[serde(default = "default_readeck_timeout")]
    pub timeout_seconds: u64,
}

fn default_readeck_timeout() -> u64 {
    10
}

impl Readeck {
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.host)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("readeck.host must be an http or https URL, got {}", self.host);
        }
        if url.cannot_be_a_base() {
            bail!("readeck.host is not a base URL: {}", self.host);
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Images {
    #[serde(default = "default_image_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_image_max_bytes")]
    pub max_bytes: usize,
}

fn default_image_timeout() -> u64 {
    5
}

fn default_image_max_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for Images {
    fn default() -> Self {
        Images {
            timeout_seconds: default_image_timeout(),
            max_bytes: default_image_max_bytes(),
        }
    }
}

impl Images {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// A Kobo device allowed to use the service, and the Readeck credential its
/// requests are made with.
#[derive(Debug, Deserialize, Clone)]
pub struct User {
    #[serde(default)]
    pub name: Option<String>,
    pub token: String,
    pub readeck_access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub readeck: Readeck,
    #[serde(default)]
    pub images: Images,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        config.validate()?;
        Ok(config)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        let yaml_with_env = Config::substitute_env_vars(&yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.port == 0 || self.app.port > 65535 {
            bail!("app.port must be between 1 and 65535, got {}", self.app.port);
        }
        self.readeck.base_url()?;
        if self.readeck.timeout_seconds == 0 {
            bail!("readeck.timeout_seconds must be greater than zero");
        }
        if self.images.timeout_seconds == 0 {
            bail!("images.timeout_seconds must be greater than zero");
        }
        if self.users.is_empty() {
            bail!("at least one entry under users is required");
        }

        let mut seen = HashSet::new();
        for (i, user) in self.users.iter().enumerate() {
            if user.token.trim().is_empty() {
                bail!("users[{}].token must not be empty", i);
            }
            if user.readeck_access_token.trim().is_empty() {
                bail!("users[{}].readeck_access_token must not be empty", i);
            }
            if !seen.insert(user.token.as_str()) {
                bail!("users[{}].token is used by more than one user", i);
            }
        }

        Ok(())
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(variable = %var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
